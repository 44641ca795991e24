pub mod chat;
pub mod health;
pub mod plant;

pub use chat::chat_text;
pub use health::{env_info, health_check, metrics, readiness_check, root};
pub use plant::analyze_image;
