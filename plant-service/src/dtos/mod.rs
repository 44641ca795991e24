pub mod chat;
pub mod plant;

pub use chat::{ChatRequest, ChatResponse};
pub use plant::{AnalyzeResponse, AnalyzeResult};
