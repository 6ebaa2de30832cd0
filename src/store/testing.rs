//! In-memory backend for store tests

use crate::api::{
    ApiError, ChatBackend, Conversation, CreatedConversation, Message, MessagePage, Role,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Persisted message as the backend received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendCall {
    pub conversation_id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
}

/// Backend holding conversations and messages in memory
#[allow(dead_code)]
pub struct MockBackend {
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    /// Record of every append, in arrival order
    pub appends: Mutex<Vec<AppendCall>>,
    /// Make every call fail with this message
    failure: Mutex<Option<String>>,
    /// Return the whole log for every page request
    ignore_paging: bool,
    next_id: Mutex<u32>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(Vec::new()),
            messages: Mutex::new(HashMap::new()),
            appends: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            ignore_paging: false,
            next_id: Mutex::new(1),
        }
    }

    /// Answer every history request with the full log, oldest first
    pub fn ignoring_paging(mut self) -> Self {
        self.ignore_paging = true;
        self
    }

    /// Seed a conversation with existing history
    pub fn with_conversation(self, id: &str, title: &str, history: Vec<Message>) -> Self {
        self.conversations.lock().unwrap().push(Conversation {
            id: id.to_string(),
            title: Some(title.to_string()),
            created_at: None,
        });
        self.messages.lock().unwrap().insert(id.to_string(), history);
        self
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn recorded_appends(&self) -> Vec<AppendCall> {
        self.appends.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<Option<String>> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.title.clone())
            .collect()
    }

    fn check(&self) -> Result<(), ApiError> {
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(ApiError::status(500, message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn create_conversation(
        &self,
        _user_id: &str,
        title: Option<&str>,
    ) -> Result<CreatedConversation, ApiError> {
        self.check()?;
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = format!("new-{next}");
            *next += 1;
            id
        };
        self.conversations.lock().unwrap().insert(
            0,
            Conversation {
                id: id.clone(),
                title: title.map(str::to_string),
                created_at: None,
            },
        );
        self.messages.lock().unwrap().insert(id.clone(), Vec::new());
        Ok(CreatedConversation {
            conversation_id: id,
            title: title.map(str::to_string),
        })
    }

    async fn list_conversations(&self, _user_id: &str) -> Result<Vec<Conversation>, ApiError> {
        self.check()?;
        Ok(self.conversations.lock().unwrap().clone())
    }

    /// Offset counts back from the newest message unless paging is ignored
    async fn fetch_messages(
        &self,
        conversation_id: &str,
        page: MessagePage,
    ) -> Result<Vec<Message>, ApiError> {
        self.check()?;
        let messages = self.messages.lock().unwrap();
        let all = messages
            .get(conversation_id)
            .ok_or_else(|| ApiError::status(404, "Conversation not found"))?;
        if self.ignore_paging {
            return Ok(all.clone());
        }
        let end = all.len().saturating_sub(page.offset);
        let start = end.saturating_sub(page.limit);
        Ok(all[start..end].to_vec())
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), ApiError> {
        self.appends.lock().unwrap().push(AppendCall {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
        });
        self.check()?;
        self.messages
            .lock()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default()
            .push(Message {
                role,
                content: content.to_string(),
                created_at: None,
            });
        Ok(())
    }

    async fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ApiError> {
        self.check()?;
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| ApiError::status(404, "Conversation not found"))?;
        conversation.title = Some(title.to_string());
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.check()?;
        self.conversations
            .lock()
            .unwrap()
            .retain(|c| c.id != conversation_id);
        self.messages.lock().unwrap().remove(conversation_id);
        Ok(())
    }
}
