#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plant_service::config::{
    AppInfoConfig, AuthConfig, AzureConfig, ChatConfig, ClassifierConfig, DatabaseConfig,
    GuideConfig, ObservabilityConfig, OpenAiConfig, PlantConfig, VisionBackend, VisionConfig,
};
use plant_service::services::classifier::FixedClassifier;
use plant_service::services::providers::ChatProvider;
use plant_service::services::{
    AnalysisService, CareGuides, ChatService, ClassifierDiagnoser, PlantDiagnoser, Readiness,
};
use plant_service::startup::{AppState, Application};
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "plant-test-boundary";

pub const GUIDES_JSON: &str = r#"{
    "healthy": { "nameKo": "정상", "description": "건강한 잎", "solution": "현재 관리 유지" },
    "powdery_mildew": {
        "nameKo": "흰가루병",
        "description": "잎 표면에 흰 가루",
        "solution": "감염 잎 제거",
        "references": ["https://example.org/powdery"]
    }
}"#;

pub fn class_names() -> Vec<String> {
    ["healthy", "powdery_mildew", "mosaic_virus"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Configuration with no external dependencies and a random port.
pub fn test_config() -> PlantConfig {
    PlantConfig {
        common: CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        app: AppInfoConfig {
            env: "test".to_string(),
            debug: false,
        },
        openai: OpenAiConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            timeout_secs: 5,
        },
        classifier: ClassifierConfig {
            model_path: "models/missing.onnx".to_string(),
            class_names: class_names(),
            input_size: 32,
        },
        guides: GuideConfig {
            path: "data/care_guides.json".to_string(),
        },
        vision: VisionConfig {
            backend: VisionBackend::Classifier,
            max_attempts: 3,
            retry_base_ms: 1,
            max_upload_bytes: 1024 * 1024,
        },
        chat: ChatConfig { history_limit: 8 },
        cors_origins: vec!["http://localhost:3000".to_string()],
        database: DatabaseConfig {
            url: "sqlite:///./plantbutler.db".to_string(),
        },
        azure: AzureConfig {
            openai_endpoint: None,
        },
        auth: AuthConfig {
            jwt_secret: Secret::new("change_me".to_string()),
            jwt_algorithm: "HS256".to_string(),
            jwt_expire_minutes: 120,
        },
        observability: ObservabilityConfig {
            log_level: "info".to_string(),
            otlp_endpoint: None,
        },
    }
}

pub fn guides() -> Readiness<Arc<CareGuides>> {
    Readiness::Ready(Arc::new(
        CareGuides::from_json_str(GUIDES_JSON).expect("valid guide JSON"),
    ))
}

pub fn classifier(probabilities: Vec<f32>) -> Readiness<Arc<dyn PlantDiagnoser>> {
    let diagnoser: Arc<dyn PlantDiagnoser> = Arc::new(ClassifierDiagnoser::new(
        Arc::new(FixedClassifier::new(probabilities)),
        class_names(),
    ));
    Readiness::Ready(diagnoser)
}

/// State built from parts, bypassing model and guide loading.
pub fn state_with(
    config: PlantConfig,
    diagnoser: Readiness<Arc<dyn PlantDiagnoser>>,
    provider: Option<Arc<dyn ChatProvider>>,
) -> AppState {
    let mut analysis = AnalysisService::new(diagnoser, guides());
    if let Some(provider) = &provider {
        analysis = analysis.with_advisor(Arc::clone(provider), None);
    }
    let chat = ChatService::new(provider, config.chat.history_limit);

    AppState {
        config,
        analysis: Arc::new(analysis),
        chat: Arc::new(chat),
    }
}

pub fn png_bytes(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb(pixel));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Single-part multipart body with the given field name and content type.
pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Writes the guide table to a temporary directory. Keep the `TempDir`
/// alive for as long as the path is used.
pub fn write_guides(contents: &str) -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("care_guides.json");
    std::fs::write(&path, contents).expect("write guides");
    let path = path.to_string_lossy().into_owned();
    (dir, path)
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
}

impl TestApp {
    pub async fn spawn(state: AppState) -> Self {
        let app = Application::build_with_state(state)
            .await
            .expect("Failed to build test application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let address = format!("http://127.0.0.1:{}", port);

        // Wait for the server by polling the health endpoint
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client.get(format!("{}/health", address)).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        TestApp { address, port }
    }
}
