//! Plant-care chat: LLM replies with a keyword-based fallback.

use crate::services::chat_history::ChatHistoryStore;
use crate::services::providers::{ChatMessage, ChatProvider, GenerationParams};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "당신은 식물 관리 도우미입니다. 사용자가 식물 관련 질문을 하면 \
핵심만 간결하게 한국어로 답하고, 필요시 간단한 체크리스트/주의사항을 2~3개 제시하세요. \
불확실하면 모르는 부분을 분명히 밝히고, 안전이슈(독성식물/살충제 등)는 주의 문구를 포함하세요.";

const CHAT_MAX_TOKENS: u32 = 350;
const CHAT_TEMPERATURE: f32 = 0.4;

const WATERING_KEYWORDS: &[&str] = &["물", "water", "급수", "watering"];
const LIGHT_KEYWORDS: &[&str] = &["빛", "sun", "light", "광량"];
const FERTILIZER_KEYWORDS: &[&str] = &["비료", "영양", "fertilizer"];

pub const WATERING_REPLY: &str =
    "급수 팁: 흙 상단 2~3cm가 마르면 충분히 물을 주세요. 배수구가 막히지 않았는지도 확인하세요.";
pub const LIGHT_REPLY: &str =
    "광량 팁: 대부분의 실내 식물은 밝은 간접광을 선호해요. 직사광선은 잎을 태울 수 있어요.";
pub const FERTILIZER_REPLY: &str =
    "비료 팁: 생장기(봄~여름)엔 4~6주 간격의 희석 비료가 좋아요. 겨울엔 빈도를 줄이세요.";
pub const GENERIC_REPLY: &str = "식물 관리와 관련된 질문을 하시면 더 구체적으로 도와드릴게요 🌿\n\
예) '몬스테라 물 주기', '빛이 부족할 때 증상', '분갈이 시기'";

pub struct ChatService {
    provider: Option<Arc<dyn ChatProvider>>,
    model: Option<String>,
    history: ChatHistoryStore,
}

impl ChatService {
    pub fn new(provider: Option<Arc<dyn ChatProvider>>, history_limit: usize) -> Self {
        Self {
            provider,
            model: None,
            history: ChatHistoryStore::new(history_limit),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn history(&self) -> &ChatHistoryStore {
        &self.history
    }

    /// Answers `text`, which must already be trimmed and non-empty.
    /// Never fails; LLM problems fall through to the canned replies.
    pub async fn reply(&self, text: &str, room_id: Option<&str>) -> String {
        let room_id = room_id.map(str::trim).filter(|r| !r.is_empty());

        if let Some(provider) = &self.provider {
            match self.llm_reply(provider.as_ref(), text, room_id).await {
                Some(reply) => {
                    counter!("chat_replies_total", "source" => "llm").increment(1);
                    return reply;
                }
                None => debug!("Falling back to keyword replies"),
            }
        }

        counter!("chat_replies_total", "source" => "fallback").increment(1);
        fallback_reply(text).to_string()
    }

    async fn llm_reply(
        &self,
        provider: &dyn ChatProvider,
        text: &str,
        room_id: Option<&str>,
    ) -> Option<String> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        if let Some(room) = room_id {
            messages.extend(self.history.snapshot(room));
        }
        messages.push(ChatMessage::user(text));

        let params = GenerationParams {
            model: self.model.clone(),
            temperature: Some(CHAT_TEMPERATURE),
            max_tokens: Some(CHAT_MAX_TOKENS),
            json_output: false,
        };

        let reply = match provider.complete(&messages, &params).await {
            Ok(response) => response.reply(),
            Err(e) => {
                warn!(error = %e, "Chat completion failed");
                return None;
            }
        };

        let Some(reply) = reply else {
            warn!("Chat completion returned an empty reply");
            return None;
        };

        if let Some(room) = room_id {
            self.history.append_exchange(
                room,
                ChatMessage::user(text),
                ChatMessage::assistant(reply.clone()),
            );
        }

        Some(reply)
    }
}

/// Canned reply chosen by the first matching keyword group.
pub fn fallback_reply(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));

    if matches(WATERING_KEYWORDS) {
        WATERING_REPLY
    } else if matches(LIGHT_KEYWORDS) {
        LIGHT_REPLY
    } else if matches(FERTILIZER_KEYWORDS) {
        FERTILIZER_REPLY
    } else {
        GENERIC_REPLY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{ChatRole, MockChatProvider};

    #[test]
    fn keyword_groups_are_checked_in_order() {
        assert_eq!(fallback_reply("How often should I WATER?"), WATERING_REPLY);
        assert_eq!(fallback_reply("빛이 부족해요"), LIGHT_REPLY);
        assert_eq!(fallback_reply("비료는 언제?"), FERTILIZER_REPLY);
        assert_eq!(fallback_reply("물과 빛"), WATERING_REPLY);
        assert_eq!(fallback_reply("분갈이 시기"), GENERIC_REPLY);
    }

    #[tokio::test]
    async fn without_provider_uses_fallback() {
        let service = ChatService::new(None, 8);
        assert_eq!(service.reply("sunlight?", Some("r1")).await, LIGHT_REPLY);
        assert!(service.history().snapshot("r1").is_empty());
    }

    #[tokio::test]
    async fn provider_failure_uses_fallback_and_skips_history() {
        let provider: Arc<dyn ChatProvider> = Arc::new(MockChatProvider::failing("500"));
        let service = ChatService::new(Some(provider), 8);
        assert_eq!(service.reply("fertilizer", Some("r1")).await, FERTILIZER_REPLY);
        assert!(service.history().snapshot("r1").is_empty());
    }

    #[tokio::test]
    async fn empty_llm_reply_uses_fallback() {
        let provider: Arc<dyn ChatProvider> = Arc::new(MockChatProvider::replying("   "));
        let service = ChatService::new(Some(provider), 8);
        assert_eq!(service.reply("hello", None).await, GENERIC_REPLY);
    }

    #[tokio::test]
    async fn llm_reply_is_recorded_and_replayed() {
        let provider = Arc::new(MockChatProvider::replying(" 이틀에 한 번 "));
        let service = ChatService::new(Some(provider.clone() as Arc<dyn ChatProvider>), 8);

        let reply = service.reply("몬스테라 물 주기", Some("room-1")).await;
        assert_eq!(reply, "이틀에 한 번");

        service.reply("겨울에는?", Some("room-1")).await;
        let sent = provider.last_messages();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].role, ChatRole::System);
        assert_eq!(sent[1], ChatMessage::user("몬스테라 물 주기"));
        assert_eq!(sent[2], ChatMessage::assistant("이틀에 한 번"));
        assert_eq!(sent[3], ChatMessage::user("겨울에는?"));
    }

    #[tokio::test]
    async fn blank_room_id_has_no_history() {
        let provider = Arc::new(MockChatProvider::replying("ok"));
        let service = ChatService::new(Some(provider.clone() as Arc<dyn ChatProvider>), 8);

        service.reply("a", Some("  ")).await;
        service.reply("b", Some("")).await;
        assert_eq!(provider.last_messages().len(), 2);
        assert_eq!(service.history().room_count(), 0);
    }
}
