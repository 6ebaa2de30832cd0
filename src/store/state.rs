//! Store state

use crate::api::{Conversation, Message};
use crate::stream::Source;
use std::collections::HashMap;
use std::fmt;

/// Identifies one stream session for the staleness guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ephemeral transcript of the answer being streamed.
/// Never merged into the message list before finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingBuffer {
    pub session: SessionId,
    pub conversation_id: String,
    pub prep: Option<String>,
    pub sources: Vec<Source>,
    pub text: String,
}

impl StreamingBuffer {
    pub fn new(session: SessionId, conversation_id: impl Into<String>) -> Self {
        Self {
            session,
            conversation_id: conversation_id.into(),
            prep: None,
            sources: Vec::new(),
            text: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    pub conversations: Vec<Conversation>,
    pub active_conversation: Option<String>,
    /// Persisted transcript of the active conversation, oldest first
    pub messages: Vec<Message>,
    /// Last history page was full, so older messages may exist
    pub has_more_history: bool,
    /// Uncommitted input per conversation id
    pub drafts: HashMap<String, String>,
    pub streaming: Option<StreamingBuffer>,
    pub is_loading: bool,
    /// Inline status message
    pub error: Option<String>,
    pub page_size: usize,
    next_session: u64,
}

impl ChatState {
    pub fn new(page_size: usize) -> Self {
        Self {
            conversations: Vec::new(),
            active_conversation: None,
            messages: Vec::new(),
            has_more_history: false,
            drafts: HashMap::new(),
            streaming: None,
            is_loading: false,
            error: None,
            page_size,
            next_session: 1,
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active_conversation.as_deref()
    }

    pub fn draft(&self, conversation_id: &str) -> &str {
        self.drafts.get(conversation_id).map_or("", String::as_str)
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    /// Staleness guard: only the session owning the buffer may mutate state
    pub fn is_current_session(&self, session: SessionId) -> bool {
        self.streaming.as_ref().is_some_and(|b| b.session == session)
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.streaming.as_ref().map(|b| b.session)
    }

    pub(crate) fn allocate_session(&mut self) -> SessionId {
        let id = SessionId(self.next_session);
        self.next_session += 1;
        id
    }
}
