//! HTTP implementation of the chat backend

use super::error::ApiError;
use super::types::{
    Conversation, CreateConversationRequest, CreatedConversation, Message, MessagePage,
    RenameRequest, Role, SaveMessageRequest,
};
use super::ChatBackend;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// REST client for the conversation endpoints
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                ApiError::network(format!("Connection failed: {e}"))
            } else {
                ApiError::network(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_response(status.as_u16(), &body))
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        let body = Self::send(request)
            .await?
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::decode(format!("Failed to parse response: {e} - body: {body}")))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<CreatedConversation, ApiError> {
        let request = self
            .client
            .post(self.url("/conversation/new"))
            .json(&CreateConversationRequest { user_id, title });
        Self::send_json(request).await
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ApiError> {
        let request = self.client.get(self.url(&format!("/conversations/{user_id}")));
        Self::send_json(request).await
    }

    async fn fetch_messages(
        &self,
        conversation_id: &str,
        page: MessagePage,
    ) -> Result<Vec<Message>, ApiError> {
        let request = self
            .client
            .get(self.url(&format!("/conversation/{conversation_id}")))
            .query(&[("offset", page.offset), ("limit", page.limit)]);
        Self::send_json(request).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ApiError> {
        let request = self.client.post(self.url("/message")).json(&SaveMessageRequest {
            conversation_id,
            user_id,
            role,
            content,
        });
        Self::send(request).await.map(drop)
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .patch(self.url(&format!("/conversation/{conversation_id}")))
            .json(&RenameRequest { title });
        Self::send(request).await.map(drop)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url(&format!("/conversation/{conversation_id}")));
        Self::send(request).await.map(drop)
    }
}
