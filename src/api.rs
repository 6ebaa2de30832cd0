//! Chat backend REST client
//!
//! Conversation and message persistence live behind the backend's fixed
//! REST contract. The store talks to it through `ChatBackend` so tests can
//! substitute an in-memory mock.

mod client;
mod error;
mod types;

pub use client::HttpBackend;
pub use error::{ApiError, ApiErrorKind};
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Conversation and message operations of the backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<CreatedConversation, ApiError>;

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ApiError>;

    /// One page of history, oldest first within the page
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        page: MessagePage,
    ) -> Result<Vec<Message>, ApiError>;

    async fn append_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ApiError>;

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ApiError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;
}

/// Logging wrapper for backends
pub struct LoggingBackend {
    inner: Arc<dyn ChatBackend>,
}

impl LoggingBackend {
    pub fn new(inner: Arc<dyn ChatBackend>) -> Self {
        Self { inner }
    }

    fn log<T>(operation: &'static str, start: std::time::Instant, result: &Result<T, ApiError>) {
        let duration = start.elapsed();
        match result {
            Ok(_) => {
                tracing::debug!(
                    operation,
                    duration_ms = %duration.as_millis(),
                    "Backend request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    operation,
                    duration_ms = %duration.as_millis(),
                    status = ?e.status,
                    kind = ?e.kind,
                    error = %e.message,
                    "Backend request failed"
                );
            }
        }
    }
}

#[async_trait]
impl ChatBackend for LoggingBackend {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<CreatedConversation, ApiError> {
        let start = std::time::Instant::now();
        let result = self.inner.create_conversation(user_id, title).await;
        Self::log("create_conversation", start, &result);
        result
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ApiError> {
        let start = std::time::Instant::now();
        let result = self.inner.list_conversations(user_id).await;
        Self::log("list_conversations", start, &result);
        result
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        page: MessagePage,
    ) -> Result<Vec<Message>, ApiError> {
        let start = std::time::Instant::now();
        let result = self.inner.fetch_messages(conversation_id, page).await;
        Self::log("fetch_messages", start, &result);
        result
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ApiError> {
        let start = std::time::Instant::now();
        let result = self
            .inner
            .append_message(conversation_id, user_id, role, content)
            .await;
        Self::log("append_message", start, &result);
        result
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ApiError> {
        let start = std::time::Instant::now();
        let result = self.inner.rename_conversation(conversation_id, title).await;
        Self::log("rename_conversation", start, &result);
        result
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let start = std::time::Instant::now();
        let result = self.inner.delete_conversation(conversation_id).await;
        Self::log("delete_conversation", start, &result);
        result
    }
}
