//! Scriptable chat provider for tests and local runs without credentials.

use super::{
    ChatMessage, ChatProvider, FinishReason, GenerationParams, ProviderError, ProviderResponse,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum MockBehavior {
    Reply(String),
    Fail(String),
    RateLimited,
}

/// Mock chat provider.
///
/// Queued outcomes are consumed first; once the queue is empty every call
/// gets the fallback behavior.
pub struct MockChatProvider {
    fallback: MockBehavior,
    queued: Mutex<VecDeque<MockBehavior>>,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockChatProvider {
    fn with_behavior(fallback: MockBehavior) -> Self {
        Self {
            fallback,
            queued: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Reply(text.into()))
    }

    /// Always fails with an API error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_behavior(MockBehavior::Fail(message.into()))
    }

    /// Always reports a rate limit.
    pub fn rate_limited() -> Self {
        Self::with_behavior(MockBehavior::RateLimited)
    }

    /// Queues a rate-limit failure ahead of the fallback behavior.
    pub fn then_rate_limited(self) -> Self {
        self.push(MockBehavior::RateLimited)
    }

    fn push(self, behavior: MockBehavior) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(behavior);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages sent on the most recent call.
    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_messages.lock() {
            *last = messages.to_vec();
        }

        let behavior = self
            .queued
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        match behavior {
            MockBehavior::Reply(text) => Ok(ProviderResponse {
                input_tokens: messages.iter().map(|m| m.text().len() as u32 / 4).sum(),
                output_tokens: text.len() as u32 / 4,
                text: Some(text),
                finish_reason: FinishReason::Complete,
            }),
            MockBehavior::Fail(message) => Err(ProviderError::ApiError(message)),
            MockBehavior::RateLimited => Err(ProviderError::RateLimited),
        }
    }
}
