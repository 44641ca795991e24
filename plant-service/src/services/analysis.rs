//! Image analysis pipeline: diagnose, look up guidance, optionally enrich.

use crate::dtos::AnalyzeResult;
use crate::services::care_guides::{CareGuides, Guidance};
use crate::services::diagnosis::{PlantDiagnoser, UNKNOWN_LABEL};
use crate::services::providers::{ChatMessage, ChatProvider, GenerationParams};
use crate::services::readiness::Readiness;
use metrics::counter;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, warn};

const ENRICHMENT_MAX_TOKENS: u32 = 180;
const ENRICHMENT_TEMPERATURE: f32 = 0.4;

pub struct AnalysisService {
    diagnoser: Readiness<Arc<dyn PlantDiagnoser>>,
    guides: Readiness<Arc<CareGuides>>,
    advisor: Option<Arc<dyn ChatProvider>>,
    enrichment_model: Option<String>,
}

impl AnalysisService {
    pub fn new(
        diagnoser: Readiness<Arc<dyn PlantDiagnoser>>,
        guides: Readiness<Arc<CareGuides>>,
    ) -> Self {
        Self {
            diagnoser,
            guides,
            advisor: None,
            enrichment_model: None,
        }
    }

    /// Enables LLM enrichment with the given provider and model.
    pub fn with_advisor(mut self, advisor: Arc<dyn ChatProvider>, model: Option<String>) -> Self {
        self.advisor = Some(advisor);
        self.enrichment_model = model;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.diagnoser.is_ready() && self.guides.is_ready()
    }

    pub fn diagnoser_ready(&self) -> bool {
        self.diagnoser.is_ready()
    }

    pub fn guides_ready(&self) -> bool {
        self.guides.is_ready()
    }

    /// Reasons for every dependency that failed to load.
    pub fn not_ready_reasons(&self) -> Vec<String> {
        [self.diagnoser.reason(), self.guides.reason()]
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect()
    }

    pub async fn analyze(&self, bytes: Vec<u8>) -> Result<AnalyzeResult, AppError> {
        let diagnoser = self.diagnoser.get()?;
        let guides = self.guides.get()?;
        let backend = diagnoser.backend_name();

        let diagnosis = match diagnoser.diagnose(bytes).await {
            Ok(diagnosis) => diagnosis,
            Err(e) => {
                counter!(
                    "plant_analyses_total",
                    "backend" => backend,
                    "outcome" => "error"
                )
                .increment(1);
                return Err(e);
            }
        };

        let guidance = guides.guidance_for(&diagnosis.label);
        let extra_tips = self.enrich(&diagnosis.label, &guidance).await;

        info!(
            backend,
            label = %diagnosis.label,
            confidence = diagnosis.confidence,
            guide_hit = guidance.from_table,
            enriched = extra_tips.is_some(),
            "Image analyzed"
        );
        counter!(
            "plant_analyses_total",
            "backend" => backend,
            "outcome" => "ok"
        )
        .increment(1);

        Ok(AnalyzeResult {
            label: diagnosis.label,
            confidence: round4(diagnosis.confidence),
            plant: diagnosis.plant,
            name_ko: Some(guidance.name_ko),
            description: Some(guidance.description),
            solution: Some(guidance.solution),
            references: guidance.references,
            extra_tips,
        })
    }

    /// One short LLM call for extra tips. Every failure is logged and dropped.
    async fn enrich(&self, label: &str, guidance: &Guidance) -> Option<String> {
        let advisor = self.advisor.as_ref()?;
        if label == UNKNOWN_LABEL {
            return None;
        }

        let messages = [ChatMessage::user(enrichment_prompt(label, guidance))];
        let params = GenerationParams {
            model: self.enrichment_model.clone(),
            temperature: Some(ENRICHMENT_TEMPERATURE),
            max_tokens: Some(ENRICHMENT_MAX_TOKENS),
            json_output: false,
        };

        match advisor.complete(&messages, &params).await {
            Ok(response) => match response.reply() {
                Some(reply) => Some(reply),
                None => {
                    warn!(label, "Enrichment returned an empty reply");
                    counter!("plant_enrichment_failures_total").increment(1);
                    None
                }
            },
            Err(e) => {
                warn!(label, error = %e, "Enrichment failed");
                counter!("plant_enrichment_failures_total").increment(1);
                None
            }
        }
    }
}

fn enrichment_prompt(label: &str, guidance: &Guidance) -> String {
    if guidance.is_healthy {
        format!(
            "식물 잎 상태는 정상({})으로 판정. 초보자용 한국어 관리 팁 3가지만 간단히.",
            label
        )
    } else {
        let name = if guidance.from_table {
            guidance.name_ko.as_str()
        } else {
            label
        };
        format!(
            "식물 질병 '{}'에 대해, 기존 요약을 반복하지 말고 실전 팁 2가지만 한국어로 간단히.",
            name
        )
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
