use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config::{self as core_config, parse_list};
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

const DEFAULT_CLASS_NAMES: &str = "healthy,late_blight,powdery_mildew,leaf_spot";
const DEFAULT_JWT_SECRET: &str = "change_me";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct PlantConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub app: AppInfoConfig,
    pub openai: OpenAiConfig,
    pub classifier: ClassifierConfig,
    pub guides: GuideConfig,
    pub vision: VisionConfig,
    pub chat: ChatConfig,
    pub cors_origins: Vec<String>,
    pub database: DatabaseConfig,
    pub azure: AzureConfig,
    pub auth: AuthConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppInfoConfig {
    pub env: String,
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    /// Absent or blank disables every LLM path.
    pub api_key: Option<Secret<String>>,
    pub base_url: String,
    pub model: String,
    pub vision_model: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn has_credential(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub model_path: String,
    /// Label for each output index, in training order.
    pub class_names: Vec<String>,
    pub input_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuideConfig {
    pub path: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VisionBackend {
    Classifier,
    Llm,
}

impl FromStr for VisionBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classifier" | "keras" | "onnx" => Ok(VisionBackend::Classifier),
            "llm" | "openai" => Ok(VisionBackend::Llm),
            _ => Err(format!("Invalid vision backend: {}", s)),
        }
    }
}

impl VisionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisionBackend::Classifier => "classifier",
            VisionBackend::Llm => "llm",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub backend: VisionBackend,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

impl DatabaseConfig {
    /// Scheme part of the URL (`sqlite`, `postgres`, ...), safe to expose.
    pub fn scheme(&self) -> Option<&str> {
        self.url
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .filter(|scheme| !scheme.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    pub openai_endpoint: Option<String>,
}

/// Token settings. Loaded with the rest of the configuration, but no route
/// enforces authentication yet.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
    pub jwt_algorithm: String,
    pub jwt_expire_minutes: i64,
}

impl AuthConfig {
    /// True when a real secret was supplied instead of the placeholder.
    pub fn is_configured(&self) -> bool {
        let secret = self.jwt_secret.expose_secret().trim();
        !secret.is_empty() && secret != DEFAULT_JWT_SECRET
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl PlantConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(PlantConfig {
            common: common_config,
            app: AppInfoConfig {
                env: get_env("APP_ENV", Some("dev"), is_prod)?,
                debug: parse_env("DEBUG", "true", is_prod)?,
            },
            openai: OpenAiConfig {
                api_key: optional_env("OPENAI_API_KEY").map(Secret::new),
                base_url: get_env("OPENAI_BASE_URL", Some("https://api.openai.com/v1"), is_prod)?,
                model: get_env("OPENAI_MODEL", Some("gpt-4o-mini"), is_prod)?,
                vision_model: get_env("OPENAI_VISION_MODEL", Some("gpt-4o"), is_prod)?,
                timeout_secs: parse_env("OPENAI_TIMEOUT_SECS", "60", is_prod)?,
            },
            classifier: ClassifierConfig {
                model_path: get_env(
                    "MODEL_PATH",
                    Some("models/plant_disease_model.onnx"),
                    is_prod,
                )?,
                class_names: parse_list(&get_env(
                    "CLASS_NAMES",
                    Some(DEFAULT_CLASS_NAMES),
                    is_prod,
                )?),
                input_size: parse_env("MODEL_INPUT_SIZE", "224", is_prod)?,
            },
            guides: GuideConfig {
                path: get_env("CARE_GUIDES_PATH", Some("data/care_guides.json"), is_prod)?,
            },
            vision: VisionConfig {
                backend: parse_env("VISION_BACKEND", "classifier", is_prod)?,
                max_attempts: parse_env("VISION_MAX_ATTEMPTS", "3", is_prod)?,
                retry_base_ms: parse_env("VISION_RETRY_BASE_MS", "1000", is_prod)?,
                max_upload_bytes: parse_env(
                    "MAX_UPLOAD_BYTES",
                    &DEFAULT_MAX_UPLOAD_BYTES.to_string(),
                    is_prod,
                )?,
            },
            chat: ChatConfig {
                history_limit: parse_env("CHAT_HISTORY_LIMIT", "8", is_prod)?,
            },
            cors_origins: parse_list(&get_env(
                "CORS_ORIGINS",
                Some("http://localhost:3000,http://127.0.0.1:3000"),
                is_prod,
            )?),
            database: DatabaseConfig {
                url: get_env("DB_URL", Some("sqlite:///./plantbutler.db"), is_prod)?,
            },
            azure: AzureConfig {
                openai_endpoint: optional_env("AZURE_OPENAI_ENDPOINT"),
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(get_env("JWT_SECRET", Some(DEFAULT_JWT_SECRET), is_prod)?),
                jwt_algorithm: get_env("JWT_ALGORITHM", Some("HS256"), is_prod)?,
                jwt_expire_minutes: parse_env("JWT_EXPIRE_MINUTES", "120", is_prod)?,
            },
            observability: ObservabilityConfig {
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
                otlp_endpoint: optional_env("OTLP_ENDPOINT"),
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
    })
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vision_backend_parses_aliases() {
        assert_eq!("LLM".parse::<VisionBackend>(), Ok(VisionBackend::Llm));
        assert_eq!(
            "keras".parse::<VisionBackend>(),
            Ok(VisionBackend::Classifier)
        );
        assert!("tesseract".parse::<VisionBackend>().is_err());
    }

    #[test]
    fn db_scheme_is_extracted() {
        let db = DatabaseConfig {
            url: "postgres://user:pw@host/db".to_string(),
        };
        assert_eq!(db.scheme(), Some("postgres"));

        let bare = DatabaseConfig {
            url: "plantbutler.db".to_string(),
        };
        assert_eq!(bare.scheme(), None);
    }

    #[test]
    fn blank_api_key_is_not_a_credential() {
        let config = OpenAiConfig {
            api_key: Some(Secret::new("   ".to_string())),
            base_url: "http://localhost".to_string(),
            model: "m".to_string(),
            vision_model: "v".to_string(),
            timeout_secs: 1,
        };
        assert!(!config.has_credential());
    }

    #[test]
    fn placeholder_jwt_secret_is_not_configured() {
        let mut auth = AuthConfig {
            jwt_secret: Secret::new(DEFAULT_JWT_SECRET.to_string()),
            jwt_algorithm: "HS256".to_string(),
            jwt_expire_minutes: 120,
        };
        assert!(!auth.is_configured());

        auth.jwt_secret = Secret::new("s3cret".to_string());
        assert!(auth.is_configured());
    }
}
