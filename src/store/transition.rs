//! Store transition function
//!
//! Applies one event to the state and returns the effects the runtime must
//! execute. No I/O happens here. Every rejection is decided before the
//! state is touched, so an `Err` leaves the state unchanged.

use super::effect::{DiscardReason, Effect, StoreUpdate};
use super::event::{Event, SessionEvent};
use super::state::{ChatState, SessionId, StreamingBuffer};
use crate::api::{Message, MessagePage};
use thiserror::Error;

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("No conversation selected")]
    NoConversation,
    #[error("Nothing to send")]
    EmptyDraft,
    #[error("An answer is still streaming (cancel it first)")]
    StreamInFlight,
    #[error("Event from stale session {0}")]
    StaleSession(SessionId),
    #[error("History page for inactive conversation {0}")]
    StalePage(String),
    #[error("Unknown conversation: {0}")]
    UnknownConversation(String),
}

impl TransitionError {
    /// Late arrivals that are dropped silently rather than reported
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleSession(_) | Self::StalePage(_))
    }
}

pub fn transition(state: &mut ChatState, event: Event) -> Result<Vec<Effect>, TransitionError> {
    match event {
        // ============================================================
        // User events
        // ============================================================
        Event::SelectConversation { conversation_id } => {
            if state.conversation(&conversation_id).is_none() {
                return Err(TransitionError::UnknownConversation(conversation_id));
            }
            let mut effects = abort_session(state, None);
            effects.extend(activate(state, conversation_id.clone()));
            effects.push(Effect::LoadMessages {
                conversation_id,
                page: MessagePage {
                    offset: 0,
                    limit: state.page_size,
                },
            });
            Ok(effects)
        }

        Event::SetDraft { text } => {
            // Without a conversation there is nowhere to keep the draft;
            // the following submit reports it
            let Some(active) = state.active_conversation.clone() else {
                return Ok(vec![]);
            };
            if text.is_empty() {
                state.drafts.remove(&active);
            } else {
                state.drafts.insert(active, text);
            }
            Ok(vec![])
        }

        Event::Submit => submit(state),

        Event::CancelStream => Ok(abort_session(state, Some(DiscardReason::Cancelled))),

        Event::LoadOlderMessages => {
            let active = state.active().ok_or(TransitionError::NoConversation)?;
            if !state.has_more_history {
                return Ok(vec![]);
            }
            Ok(vec![Effect::LoadMessages {
                conversation_id: active.to_string(),
                page: MessagePage {
                    offset: state.messages.len(),
                    limit: state.page_size,
                },
            }])
        }

        Event::StreamTimedOut { session } => {
            if !state.is_current_session(session) {
                return Err(TransitionError::StaleSession(session));
            }
            let message = "The answer took too long and was cancelled".to_string();
            let mut effects = abort_session(state, Some(DiscardReason::TimedOut));
            state.error = Some(message.clone());
            effects.push(Effect::Notify(StoreUpdate::Error(message)));
            Ok(effects)
        }

        // ============================================================
        // Backend results
        // ============================================================
        Event::ConversationsLoaded { conversations } => {
            state.conversations = conversations;
            Ok(vec![Effect::Notify(StoreUpdate::ConversationsChanged(
                state.conversations.clone(),
            ))])
        }

        Event::ConversationCreated { conversation } => {
            let conversation_id = conversation.id.clone();
            state.conversations.retain(|c| c.id != conversation_id);
            state.conversations.insert(0, conversation);

            // A new conversation starts with an empty transcript; nothing to load
            let mut effects = abort_session(state, None);
            effects.push(Effect::Notify(StoreUpdate::ConversationsChanged(
                state.conversations.clone(),
            )));
            effects.extend(activate(state, conversation_id));
            Ok(effects)
        }

        Event::ConversationRenamed {
            conversation_id,
            title,
        } => {
            let conversation = state
                .conversations
                .iter_mut()
                .find(|c| c.id == conversation_id)
                .ok_or(TransitionError::UnknownConversation(conversation_id))?;
            conversation.title = Some(title);
            Ok(vec![Effect::Notify(StoreUpdate::ConversationsChanged(
                state.conversations.clone(),
            ))])
        }

        Event::ConversationDeleted { conversation_id } => {
            let mut effects = Vec::new();
            if state.active() == Some(conversation_id.as_str()) {
                effects.extend(abort_session(state, None));
                state.active_conversation = None;
                state.messages.clear();
                state.has_more_history = false;
                effects.push(Effect::Notify(StoreUpdate::Selected {
                    conversation_id: None,
                }));
            }
            state.drafts.remove(&conversation_id);
            state.conversations.retain(|c| c.id != conversation_id);
            effects.push(Effect::Notify(StoreUpdate::ConversationsChanged(
                state.conversations.clone(),
            )));
            Ok(effects)
        }

        Event::MessagesLoaded {
            conversation_id,
            offset,
            mut messages,
        } => {
            if state.active() != Some(conversation_id.as_str()) {
                return Err(TransitionError::StalePage(conversation_id));
            }
            let page_len = messages.len();
            let repeated = overlap(&messages, &state.messages);
            messages.truncate(page_len - repeated);
            // A backend that ignores paging returns more than a page (the
            // whole log); a page with nothing new means history is exhausted
            state.has_more_history = page_len == state.page_size && !messages.is_empty();
            let newer = std::mem::replace(&mut state.messages, messages.clone());
            state.messages.extend(newer);
            Ok(vec![Effect::Notify(StoreUpdate::HistoryLoaded {
                conversation_id,
                messages,
                older: offset > 0,
            })])
        }

        Event::RequestFailed { message } => {
            state.error = Some(message.clone());
            Ok(vec![Effect::Notify(StoreUpdate::Error(message))])
        }

        // ============================================================
        // Stream session callbacks
        // ============================================================
        Event::Stream { session, event } => stream_event(state, session, event),

        Event::Teardown => {
            let effects = state
                .current_session()
                .map(|session| Effect::AbortStream { session })
                .into_iter()
                .collect();
            state.streaming = None;
            state.is_loading = false;
            Ok(effects)
        }
    }
}

fn submit(state: &mut ChatState) -> Result<Vec<Effect>, TransitionError> {
    let active = state
        .active_conversation
        .clone()
        .ok_or(TransitionError::NoConversation)?;
    if state.streaming.is_some() {
        return Err(TransitionError::StreamInFlight);
    }
    let question = state.draft(&active).trim().to_string();
    if question.is_empty() {
        return Err(TransitionError::EmptyDraft);
    }

    state.drafts.remove(&active);
    let message = Message::user(question.clone());
    state.messages.push(message.clone());
    let session = state.allocate_session();
    state.streaming = Some(StreamingBuffer::new(session, active.clone()));
    state.is_loading = true;
    state.error = None;

    // The persist effect precedes the stream so the user message reaches
    // the writer queue before any assistant message can
    Ok(vec![
        Effect::Notify(StoreUpdate::MessageAppended(message.clone())),
        Effect::PersistMessage {
            conversation_id: active.clone(),
            message,
        },
        Effect::OpenStream {
            session,
            conversation_id: active,
            question,
        },
        Effect::Notify(StoreUpdate::Loading(true)),
    ])
}

fn stream_event(
    state: &mut ChatState,
    session: SessionId,
    event: SessionEvent,
) -> Result<Vec<Effect>, TransitionError> {
    let Some(buffer) = state.streaming.as_mut().filter(|b| b.session == session) else {
        return Err(TransitionError::StaleSession(session));
    };

    match event {
        SessionEvent::Prep(text) => {
            buffer.prep = Some(text.clone());
            Ok(vec![Effect::Notify(StoreUpdate::Prep(text))])
        }
        SessionEvent::Sources(sources) => {
            buffer.sources.clone_from(&sources);
            Ok(vec![Effect::Notify(StoreUpdate::Sources(sources))])
        }
        SessionEvent::Chunk(delta) => {
            buffer.text.push_str(&delta);
            Ok(vec![Effect::Notify(StoreUpdate::Delta(delta))])
        }
        SessionEvent::Error(message) => {
            // The paired degraded done performs the discard
            state.error = Some(message.clone());
            Ok(vec![Effect::Notify(StoreUpdate::Error(message))])
        }
        SessionEvent::Done(meta) => {
            let Some(buffer) = state.streaming.take() else {
                return Err(TransitionError::StaleSession(session));
            };
            state.is_loading = false;

            let mut effects = Vec::new();
            if meta.is_partial() {
                effects.push(Effect::Notify(StoreUpdate::AnswerDiscarded {
                    reason: DiscardReason::Incomplete(meta.finish_reason),
                }));
            } else if buffer.text.trim().is_empty() {
                effects.push(Effect::Notify(StoreUpdate::AnswerDiscarded {
                    reason: DiscardReason::Empty,
                }));
            } else {
                let message = Message::assistant(buffer.text);
                state.messages.push(message.clone());
                effects.push(Effect::PersistMessage {
                    conversation_id: buffer.conversation_id,
                    message: message.clone(),
                });
                effects.push(Effect::Notify(StoreUpdate::AnswerFinalized {
                    message,
                    sources: buffer.sources,
                }));
            }
            effects.push(Effect::Notify(StoreUpdate::Loading(false)));
            Ok(effects)
        }
    }
}

/// Drop the streaming buffer and abort its session. With a reason, the
/// discard is announced; otherwise it is silent.
fn abort_session(state: &mut ChatState, reason: Option<DiscardReason>) -> Vec<Effect> {
    let Some(buffer) = state.streaming.take() else {
        return vec![];
    };
    state.is_loading = false;

    let mut effects = vec![Effect::AbortStream {
        session: buffer.session,
    }];
    if let Some(reason) = reason {
        effects.push(Effect::Notify(StoreUpdate::AnswerDiscarded { reason }));
    }
    effects.push(Effect::Notify(StoreUpdate::Loading(false)));
    effects
}

/// Length of the longest tail of `page` that repeats the head of `shown`.
///
/// A page can end with messages already on screen: a question persisted
/// before the first page was fetched, or a full log from a backend that
/// ignores `offset`. Timestamps are not compared since optimistic messages
/// have none.
fn overlap(page: &[Message], shown: &[Message]) -> usize {
    (1..=page.len().min(shown.len()))
        .rev()
        .find(|&len| {
            page[page.len() - len..]
                .iter()
                .zip(&shown[..len])
                .all(|(a, b)| a.role == b.role && a.content == b.content)
        })
        .unwrap_or(0)
}

/// Make a conversation active with an empty view; its draft is kept
fn activate(state: &mut ChatState, conversation_id: String) -> Vec<Effect> {
    state.active_conversation = Some(conversation_id.clone());
    state.messages.clear();
    state.has_more_history = false;
    state.error = None;
    vec![Effect::Notify(StoreUpdate::Selected {
        conversation_id: Some(conversation_id),
    })]
}
