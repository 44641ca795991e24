use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(length(max = 4000, message = "text must be at most 4000 characters"))]
    pub text: String,
    /// Opaque client conversation id; scopes the in-memory history.
    #[validate(length(max = 128, message = "room_id must be at most 128 characters"))]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub reply: String,
}
