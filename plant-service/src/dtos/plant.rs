use serde::{Deserialize, Serialize};

/// Outcome of one image analysis, as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    /// Classifier category, e.g. `healthy` or `powdery_mildew`.
    pub label: String,
    /// Always within 0.0..=1.0, rounded to 4 decimals.
    pub confidence: f64,
    /// Plant name estimated by the vision LLM backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant: Option<String>,
    pub name_ko: Option<String>,
    pub description: Option<String>,
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    /// Supplementary tips from the LLM, present only when enrichment succeeded.
    pub extra_tips: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalyzeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalyzeResponse {
    pub fn success(result: AnalyzeResult) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }
}
