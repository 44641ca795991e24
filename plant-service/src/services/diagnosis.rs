//! Diagnosis backends: local classifier or vision LLM.
//!
//! Both turn raw image bytes into a label and a confidence. Guide lookup
//! and enrichment happen afterwards in the analysis service.

use crate::services::classifier::{clamp_confidence, top_prediction, ImageClassifier};
use crate::services::preprocess::{self, PreprocessError};
use crate::services::providers::{
    ChatMessage, ChatProvider, ContentPart, GenerationParams, ProviderError,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::Value;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const UNKNOWN_LABEL: &str = "unknown";

const VISION_SYSTEM_PROMPT: &str = "당신은 식물 질병 진단 보조모델입니다.\n\
이미지에서 작물명(추정), 의심 병명, 신뢰도(0~1)를 JSON으로만 답하세요:\n\
{\"plant\": \"...\", \"disease\": \"...\", \"confidence\": 0.0}\n\
모르면 {\"plant\":\"unknown\",\"disease\":\"unknown\",\"confidence\":0.0}로.";
const VISION_USER_PROMPT: &str = "이 사진을 분석해 주세요.";

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub label: String,
    /// Clamped to 0.0..=1.0, not yet rounded.
    pub confidence: f64,
    pub plant: Option<String>,
}

#[async_trait]
pub trait PlantDiagnoser: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn backend_name(&self) -> &'static str;

    async fn diagnose(&self, bytes: Vec<u8>) -> Result<Diagnosis, AppError>;
}

fn invalid_image(err: PreprocessError) -> AppError {
    AppError::BadRequest(anyhow::anyhow!("Invalid image: {}", err))
}

/// Runs the local model on the blocking pool.
pub struct ClassifierDiagnoser {
    classifier: Arc<dyn ImageClassifier>,
    class_names: Arc<[String]>,
}

impl ClassifierDiagnoser {
    pub fn new(classifier: Arc<dyn ImageClassifier>, class_names: Vec<String>) -> Self {
        Self {
            classifier,
            class_names: class_names.into(),
        }
    }
}

#[async_trait]
impl PlantDiagnoser for ClassifierDiagnoser {
    fn backend_name(&self) -> &'static str {
        "classifier"
    }

    async fn diagnose(&self, bytes: Vec<u8>) -> Result<Diagnosis, AppError> {
        let classifier = Arc::clone(&self.classifier);
        let class_names = Arc::clone(&self.class_names);

        let outcome = tokio::task::spawn_blocking(move || {
            let tensor = preprocess::image_to_tensor(&bytes, classifier.input_size())
                .map_err(invalid_image)?;
            let probs = classifier.predict(tensor).map_err(AppError::InternalError)?;
            top_prediction(&probs, &class_names).ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("Classifier returned no scores"))
            })
        })
        .await??;

        debug!(label = %outcome.label, confidence = outcome.confidence, "Classifier prediction");

        Ok(Diagnosis {
            label: outcome.label,
            confidence: outcome.confidence,
            plant: None,
        })
    }
}

/// Asks a vision-capable chat model for a JSON verdict.
pub struct VisionLlmDiagnoser {
    provider: Arc<dyn ChatProvider>,
    model: String,
    retry: RetryConfig,
}

impl VisionLlmDiagnoser {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        model: impl Into<String>,
        max_attempts: u32,
        retry_base: Duration,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            retry: RetryConfig::linear(max_attempts, retry_base),
        }
    }
}

#[async_trait]
impl PlantDiagnoser for VisionLlmDiagnoser {
    fn backend_name(&self) -> &'static str {
        "llm"
    }

    async fn diagnose(&self, bytes: Vec<u8>) -> Result<Diagnosis, AppError> {
        let (bytes, mime) = tokio::task::spawn_blocking(move || {
            preprocess::validate_image(&bytes)
                .map(|format| (bytes, format.to_mime_type()))
                .map_err(invalid_image)
        })
        .await??;

        let data_url = format!("data:{};base64,{}", mime, STANDARD.encode(&bytes));
        let messages = vec![
            ChatMessage::system(VISION_SYSTEM_PROMPT),
            ChatMessage::user_parts(vec![
                ContentPart::Text(VISION_USER_PROMPT.to_string()),
                ContentPart::ImageUrl(data_url),
            ]),
        ];
        let params = GenerationParams {
            model: Some(self.model.clone()),
            temperature: Some(0.2),
            max_tokens: None,
            json_output: true,
        };

        let provider = &self.provider;
        let (messages, params) = (&messages, &params);
        let response = retry_with_backoff(
            &self.retry,
            "vision_diagnosis",
            ProviderError::is_rate_limited,
            move || provider.complete(messages, params),
        )
        .await
        .map_err(|e| match e {
            ProviderError::RateLimited => AppError::ServiceUnavailable(
                "Vision provider rate limit exceeded, try again later".to_string(),
            ),
            other => AppError::BadGateway(format!("Vision provider error: {}", other)),
        })?;

        Ok(parse_verdict(response.text.as_deref().unwrap_or_default()))
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    plant: Option<Value>,
    #[serde(default)]
    disease: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
}

fn unknown_verdict() -> Diagnosis {
    Diagnosis {
        label: UNKNOWN_LABEL.to_string(),
        confidence: 0.0,
        plant: Some(UNKNOWN_LABEL.to_string()),
    }
}

/// Drops a surrounding Markdown code fence, with or without a language tag.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}

/// First balanced `{...}` span, ignoring braces inside string literals.
fn first_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn text_field(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => UNKNOWN_LABEL.to_string(),
    }
}

fn confidence_field(value: Option<Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    clamp_confidence(parsed.unwrap_or(0.0))
}

/// Tolerant parse of the model's JSON verdict. Never fails; anything
/// unusable becomes the `unknown` verdict.
pub fn parse_verdict(raw: &str) -> Diagnosis {
    let Some(object) = first_json_object(strip_code_fence(raw)) else {
        warn!(output = %raw, "Vision model returned no JSON object");
        return unknown_verdict();
    };

    match serde_json::from_str::<RawVerdict>(object) {
        Ok(verdict) => Diagnosis {
            label: text_field(verdict.disease),
            confidence: confidence_field(verdict.confidence),
            plant: Some(text_field(verdict.plant)),
        },
        Err(e) => {
            warn!(error = %e, output = %raw, "Vision model returned malformed JSON");
            unknown_verdict()
        }
    }
}
