use crate::config::{PlantConfig, VisionBackend};
use crate::handlers;
use crate::services::classifier::{ImageClassifier, OnnxClassifier};
use crate::services::providers::{ChatProvider, OpenAiChatProvider, OpenAiProviderConfig};
use crate::services::{
    AnalysisService, CareGuides, ChatService, ClassifierDiagnoser, PlantDiagnoser, Readiness,
    VisionLlmDiagnoser,
};
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use secrecy::Secret;
use service_core::error::AppError;
use service_core::middleware::{
    make_request_span, metrics_middleware, request_id_middleware, security_headers_middleware,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Room for multipart boundaries and headers on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: PlantConfig,
    pub analysis: Arc<AnalysisService>,
    pub chat: Arc<ChatService>,
}

impl AppState {
    /// Loads the guide table and the diagnosis backend and wires up the LLM
    /// provider. Missing artifacts leave the service up but not ready.
    pub async fn from_config(config: PlantConfig) -> Result<Self, AppError> {
        let guides = Readiness::from_result(
            CareGuides::load(&config.guides.path)
                .await
                .map(Arc::new)
                .inspect_err(|e| tracing::error!(error = %e, "Failed to load care guides")),
        );

        let provider = build_provider(&config)?;
        if provider.is_none() {
            tracing::warn!("OPENAI_API_KEY not set; chat uses keyword replies and enrichment is off");
        }

        let diagnoser = match config.vision.backend {
            VisionBackend::Classifier => load_classifier(&config).await,
            VisionBackend::Llm => match &provider {
                Some(provider) => Readiness::Ready(Arc::new(VisionLlmDiagnoser::new(
                    Arc::clone(provider),
                    config.openai.vision_model.clone(),
                    config.vision.max_attempts,
                    Duration::from_millis(config.vision.retry_base_ms),
                )) as Arc<dyn PlantDiagnoser>),
                None => {
                    tracing::error!("VISION_BACKEND=llm requires OPENAI_API_KEY");
                    Readiness::NotReady("vision backend 'llm' has no API key".to_string())
                }
            },
        };

        if config.auth.is_configured() {
            tracing::warn!("JWT settings are configured but no route enforces authentication");
        }

        tracing::info!(
            backend = config.vision.backend.as_str(),
            diagnoser_ready = diagnoser.is_ready(),
            guides_ready = guides.is_ready(),
            llm_enabled = provider.is_some(),
            "Application state initialized"
        );

        let mut analysis = AnalysisService::new(diagnoser, guides);
        if let Some(provider) = &provider {
            analysis = analysis.with_advisor(Arc::clone(provider), Some(config.openai.model.clone()));
        }

        let chat = ChatService::new(provider, config.chat.history_limit)
            .with_model(config.openai.model.clone());

        Ok(Self {
            config,
            analysis: Arc::new(analysis),
            chat: Arc::new(chat),
        })
    }
}

fn build_provider(config: &PlantConfig) -> Result<Option<Arc<dyn ChatProvider>>, AppError> {
    let Some(api_key) = config
        .openai
        .api_key
        .as_ref()
        .filter(|_| config.openai.has_credential())
    else {
        return Ok(None);
    };

    let provider = OpenAiChatProvider::new(OpenAiProviderConfig {
        api_key: Secret::clone(api_key),
        base_url: config.openai.base_url.clone(),
        model: config.openai.model.clone(),
        timeout: Duration::from_secs(config.openai.timeout_secs),
    })
    .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to create OpenAI client: {}", e)))?;

    tracing::info!(
        model = %config.openai.model,
        vision_model = %config.openai.vision_model,
        "Initialized OpenAI chat provider"
    );

    Ok(Some(Arc::new(provider)))
}

async fn load_classifier(config: &PlantConfig) -> Readiness<Arc<dyn PlantDiagnoser>> {
    let model_path = PathBuf::from(&config.classifier.model_path);
    let input_size = config.classifier.input_size;

    let loaded = tokio::task::spawn_blocking(move || OnnxClassifier::load(&model_path, input_size))
        .await
        .map_err(|e| anyhow::anyhow!("Model loading task failed: {}", e))
        .and_then(|result| result);

    match loaded {
        Ok(classifier) => {
            let classifier: Arc<dyn ImageClassifier> = Arc::new(classifier);
            let diagnoser: Arc<dyn PlantDiagnoser> = Arc::new(ClassifierDiagnoser::new(
                classifier,
                config.classifier.class_names.clone(),
            ));
            Readiness::Ready(diagnoser)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load classifier model");
            Readiness::NotReady(e.to_string())
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-request-id"),
        ]);

    // Credentials cannot be combined with a wildcard origin.
    if origins.iter().any(|origin| origin.trim() == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .vision
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/env", get(handlers::env_info))
        .route("/metrics", get(handlers::metrics))
        .route("/plant/analyze", post(handlers::analyze_image))
        .route("/chat/text", post(handlers::chat_text))
        // MatchedPath is only visible to route layers
        .route_layer(from_fn(metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: PlantConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(config).await?;
        Self::build_with_state(state).await
    }

    /// Binds the listener for an already assembled state. Tests use this to
    /// inject mock providers and classifiers.
    pub async fn build_with_state(state: AppState) -> Result<Self, AppError> {
        let host = state.config.common.host.clone();
        let port = state.config.common.port;
        let app = build_router(state);

        let listener = TcpListener::bind((host.as_str(), port)).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}:{}: {}", host, port, e);
            AppError::from(e)
        })?;
        let addr: SocketAddr = listener.local_addr()?;

        tracing::info!(address = %addr, "Listening");

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port: addr.port(),
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
