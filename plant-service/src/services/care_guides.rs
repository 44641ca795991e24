//! Static care-guide table keyed by normalized label.
//!
//! Loaded once at startup and read-only afterwards.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Key of the optional catch-all entry.
const DEFAULT_KEY: &str = "default";
const HEALTHY_LABEL: &str = "healthy";

const HEALTHY_NAME: &str = "정상";
const HEALTHY_DESCRIPTION: &str = "겉보기 이상 없음";
const HEALTHY_SOLUTION: &str = "물·광량·통풍을 주기적으로 점검하세요.";
const INSPECTION_SOLUTION: &str =
    "증상이 있는 잎을 분리하고 통풍을 개선한 뒤 며칠간 상태를 관찰하세요.";

#[derive(Error, Debug)]
pub enum GuideError {
    #[error("care guide file not found: {0}")]
    NotFound(String),

    #[error("failed to read care guide file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid care guide JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CareGuideEntry {
    /// Canonical label; `healthy` marks a healthy class stored under another key.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub name_ko: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Fully resolved guidance; every text field is populated.
#[derive(Debug, Clone, PartialEq)]
pub struct Guidance {
    pub name_ko: String,
    pub description: String,
    pub solution: String,
    pub references: Vec<String>,
    pub is_healthy: bool,
    /// False when the text was synthesized rather than read from the table.
    pub from_table: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CareGuides {
    entries: HashMap<String, CareGuideEntry>,
}

/// Lowercases and maps spaces and hyphens to underscores.
pub fn normalize_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

impl CareGuides {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GuideError> {
        let path = path.as_ref();
        let display_path = path.display().to_string();

        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GuideError::NotFound(display_path.clone())
            } else {
                GuideError::Io {
                    path: display_path.clone(),
                    source: e,
                }
            }
        })?;

        let guides = Self::from_json_str(&raw)?;
        tracing::info!(path = %display_path, entries = guides.len(), "Loaded care guides");
        Ok(guides)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, GuideError> {
        let parsed: HashMap<String, CareGuideEntry> = serde_json::from_str(raw)?;
        Ok(Self::from_entries(parsed))
    }

    pub fn from_entries(entries: HashMap<String, CareGuideEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(key, entry)| (normalize_label(&key), entry))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact entry for a label, after normalization. Never returns the
    /// `default` entry unless asked for it by name.
    pub fn lookup(&self, label: &str) -> Option<&CareGuideEntry> {
        self.entries
            .get(&label.trim().to_lowercase())
            .or_else(|| self.entries.get(&normalize_label(label)))
    }

    /// Guidance for a label, falling back to the `default` entry and then to
    /// synthesized text so no field is ever empty.
    pub fn guidance_for(&self, label: &str) -> Guidance {
        let exact = self.lookup(label);
        let is_healthy = normalize_label(label) == HEALTHY_LABEL
            || exact
                .and_then(|e| e.label.as_deref())
                .is_some_and(|l| normalize_label(l) == HEALTHY_LABEL);

        let (fallback_name, fallback_description, fallback_solution) = if is_healthy {
            (
                HEALTHY_NAME.to_string(),
                HEALTHY_DESCRIPTION.to_string(),
                HEALTHY_SOLUTION.to_string(),
            )
        } else {
            (
                label.to_string(),
                format!(
                    "'{}'에 대한 관리 가이드가 등록되어 있지 않습니다. 전문가의 추가 진단이 필요합니다.",
                    label
                ),
                INSPECTION_SOLUTION.to_string(),
            )
        };

        let entry = exact.or_else(|| {
            if is_healthy {
                None
            } else {
                self.entries.get(DEFAULT_KEY)
            }
        });

        let pick = |value: Option<&String>, fallback: String| {
            value
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .unwrap_or(fallback)
        };

        Guidance {
            name_ko: pick(entry.and_then(|e| e.name_ko.as_ref()), fallback_name),
            description: pick(
                entry.and_then(|e| e.description.as_ref()),
                fallback_description,
            ),
            solution: pick(entry.and_then(|e| e.solution.as_ref()), fallback_solution),
            references: entry.map(|e| e.references.clone()).unwrap_or_default(),
            is_healthy,
            from_table: exact.is_some(),
        }
    }
}
