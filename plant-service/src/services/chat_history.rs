//! In-memory, per-room chat history.

use crate::services::providers::ChatMessage;
use dashmap::DashMap;
use std::collections::VecDeque;

/// Bounded history per room. Rooms are created on first write and live for
/// the lifetime of the process.
pub struct ChatHistoryStore {
    rooms: DashMap<String, VecDeque<ChatMessage>>,
    capacity: usize,
}

impl ChatHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity,
        }
    }

    /// Copy of the room's turns, oldest first. Empty for unknown rooms.
    pub fn snapshot(&self, room_id: &str) -> Vec<ChatMessage> {
        self.rooms
            .get(room_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Appends a user turn and its reply under a single entry lock, then
    /// evicts the oldest exchanges beyond capacity. History always starts
    /// with a user turn, so an odd capacity holds one turn less.
    pub fn append_exchange(&self, room_id: &str, user: ChatMessage, assistant: ChatMessage) {
        if self.capacity == 0 {
            return;
        }

        let mut turns = self.rooms.entry(room_id.to_string()).or_default();
        turns.push_back(user);
        turns.push_back(assistant);
        while turns.len() > self.capacity {
            let excess = turns.len().min(2);
            turns.drain(..excess);
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
