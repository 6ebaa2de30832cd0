//! Effects produced by store transitions

use super::state::SessionId;
use crate::api::{Conversation, Message, MessagePage};
use crate::stream::{FinishReason, Source};

/// Effects to be executed after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Queue a message for the persistence writer
    PersistMessage {
        conversation_id: String,
        message: Message,
    },

    /// Open an ask stream session
    OpenStream {
        session: SessionId,
        conversation_id: String,
        question: String,
    },

    /// Abort a session; a no-op if it already finished
    AbortStream { session: SessionId },

    /// Fetch a page of history
    LoadMessages {
        conversation_id: String,
        page: MessagePage,
    },

    /// Publish to subscribers
    Notify(StoreUpdate),
}

/// Change notifications for the front end
#[derive(Debug, Clone, PartialEq)]
pub enum StoreUpdate {
    ConversationsChanged(Vec<Conversation>),
    /// Active conversation changed; `None` when the view was cleared
    Selected {
        conversation_id: Option<String>,
    },
    HistoryLoaded {
        conversation_id: String,
        messages: Vec<Message>,
        /// Page was prepended rather than replacing the transcript
        older: bool,
    },
    MessageAppended(Message),
    Prep(String),
    Sources(Vec<Source>),
    Delta(String),
    AnswerFinalized {
        message: Message,
        sources: Vec<Source>,
    },
    AnswerDiscarded {
        reason: DiscardReason,
    },
    Error(String),
    Loading(bool),
    /// A user action was refused
    Rejected(String),
}

/// Why a streamed answer was dropped without being persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Session ended without a server `done`
    Incomplete(FinishReason),
    Cancelled,
    TimedOut,
    /// `done` arrived but no text was streamed
    Empty,
}
