//! Chat message persistence
//!
//! Chat documents live in an external collection; messages are persisted
//! through this interface before they are broadcast so every client renders
//! from a single authoritative echo.

use crate::error::{Result, SyncError};
use crate::types::ChatMessage;
use async_trait::async_trait;
use std::sync::Mutex;

/// Persistence interface for chat messages
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn save_message(&self, message: ChatMessage) -> Result<()>;
}

/// In-memory chat store
#[derive(Debug, Default)]
pub struct InMemoryChatStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn save_message(&self, message: ChatMessage) -> Result<()> {
        let mut messages = self.messages.lock().map_err(|_| SyncError::Internal {
            message: "Failed to acquire chat lock".to_string(),
        })?;
        messages.push(message);
        Ok(())
    }
}
