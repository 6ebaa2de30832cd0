//! Events that drive the store

use super::state::SessionId;
use crate::api::{Conversation, Message};
use crate::stream::{DoneMeta, Source};

/// Events that trigger store transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User events
    SelectConversation {
        conversation_id: String,
    },
    SetDraft {
        text: String,
    },
    Submit,
    CancelStream,
    LoadOlderMessages,

    // Timer events
    StreamTimedOut {
        session: SessionId,
    },

    // Backend results
    ConversationsLoaded {
        conversations: Vec<Conversation>,
    },
    ConversationCreated {
        conversation: Conversation,
    },
    ConversationRenamed {
        conversation_id: String,
        title: String,
    },
    ConversationDeleted {
        conversation_id: String,
    },
    MessagesLoaded {
        conversation_id: String,
        offset: usize,
        messages: Vec<Message>,
    },
    RequestFailed {
        message: String,
    },

    // Stream session callbacks, tagged with the session that produced them
    Stream {
        session: SessionId,
        event: SessionEvent,
    },

    Teardown,
}

/// Handler callback of a stream session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Prep(String),
    Sources(Vec<Source>),
    Chunk(String),
    Done(DoneMeta),
    Error(String),
}
