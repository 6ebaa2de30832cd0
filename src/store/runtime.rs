//! Store runtime
//!
//! Owns the `ChatState` and is the only place it is mutated. Commands,
//! backend results and stream callbacks all arrive on one channel and are
//! applied in order, so no locks are needed. Effects are executed without
//! blocking the loop: network work runs on spawned tasks that report back
//! as events.

use super::effect::{Effect, StoreUpdate};
use super::event::{Event, SessionEvent};
use super::state::{ChatState, SessionId};
use super::transition::{transition, TransitionError};
use crate::api::{ApiError, ChatBackend, Conversation, Message, Role, ASSISTANT_USER_ID};
use crate::config::ClientConfig;
use crate::stream::{AskStreamClient, AskTransport, DoneMeta, SessionHandle, Source, StreamHandler};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

const UPDATE_CAPACITY: usize = 256;

/// Requests accepted by the runtime loop
#[derive(Debug)]
enum Command {
    Event(Event),
    RefreshConversations,
    CreateConversation { title: Option<String> },
    /// `None` targets the active conversation
    RenameConversation {
        conversation_id: Option<String>,
        title: String,
    },
    DeleteConversation { conversation_id: Option<String> },
    Snapshot(oneshot::Sender<ChatState>),
}

/// Message waiting for the persistence writer
#[derive(Debug)]
struct PersistJob {
    conversation_id: String,
    message: Message,
}

/// The open answer stream and its timeout timer
struct LiveSession {
    id: SessionId,
    handle: SessionHandle,
    timer: Option<JoinHandle<()>>,
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
    }
}

#[derive(Debug, Error)]
#[error("store runtime has stopped")]
pub struct StoreClosed;

// ============================================================================
// Runtime
// ============================================================================

pub struct ChatRuntime<B: ChatBackend + ?Sized + 'static, T: AskTransport + ?Sized> {
    state: ChatState,
    user_id: String,
    answer_timeout: Option<Duration>,
    backend: Arc<B>,
    stream_client: AskStreamClient<T>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
    updates_tx: broadcast::Sender<StoreUpdate>,
    persist_tx: Option<mpsc::UnboundedSender<PersistJob>>,
    /// Session matching `state.streaming`, if one is open
    session: Option<LiveSession>,
}

impl<B, T> ChatRuntime<B, T>
where
    B: ChatBackend + ?Sized + 'static,
    T: AskTransport + ?Sized,
{
    pub fn new(backend: Arc<B>, transport: Arc<T>, config: &ClientConfig) -> (Self, ChatHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (updates_tx, _) = broadcast::channel(UPDATE_CAPACITY);
        let handle = ChatHandle {
            commands: command_tx.clone(),
            updates: updates_tx.clone(),
        };
        let runtime = Self {
            state: ChatState::new(config.page_size),
            user_id: config.user_id.clone(),
            answer_timeout: config.answer_timeout,
            backend,
            stream_client: AskStreamClient::new(transport),
            command_rx,
            command_tx,
            updates_tx,
            persist_tx: None,
            session: None,
        };
        (runtime, handle)
    }

    pub async fn run(mut self) {
        tracing::info!(user_id = %self.user_id, "Starting chat runtime");

        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        self.persist_tx = Some(persist_tx);
        let writer = tokio::spawn(run_writer(
            Arc::clone(&self.backend),
            self.user_id.clone(),
            persist_rx,
            self.command_tx.clone(),
        ));

        // The runtime holds a sender itself, so the loop only ends on teardown
        while let Some(command) = self.command_rx.recv().await {
            if !self.handle_command(command) {
                break;
            }
        }

        // Closing the queue lets the writer drain what is already queued
        self.persist_tx = None;
        if let Err(e) = writer.await {
            tracing::error!(error = %e, "Persistence writer panicked");
        }
        tracing::info!("Chat runtime stopped");
    }

    /// Returns false once the runtime should stop
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Event(event) => {
                let teardown = matches!(event, Event::Teardown);
                self.process_event(event);
                return !teardown;
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.state.clone());
            }
            Command::RefreshConversations => {
                let backend = Arc::clone(&self.backend);
                let user_id = self.user_id.clone();
                self.spawn_request("Failed to load conversations", async move {
                    let conversations = backend.list_conversations(&user_id).await?;
                    Ok(Event::ConversationsLoaded { conversations })
                });
            }
            Command::CreateConversation { title } => {
                let backend = Arc::clone(&self.backend);
                let user_id = self.user_id.clone();
                self.spawn_request("Failed to create conversation", async move {
                    let created = backend.create_conversation(&user_id, title.as_deref()).await?;
                    Ok(Event::ConversationCreated {
                        conversation: Conversation {
                            id: created.conversation_id,
                            title: created.title.or(title),
                            created_at: None,
                        },
                    })
                });
            }
            Command::RenameConversation {
                conversation_id,
                title,
            } => {
                let Some(conversation_id) = self.target(conversation_id) else {
                    return true;
                };
                let backend = Arc::clone(&self.backend);
                self.spawn_request("Failed to rename conversation", async move {
                    backend.rename_conversation(&conversation_id, &title).await?;
                    Ok(Event::ConversationRenamed {
                        conversation_id,
                        title,
                    })
                });
            }
            Command::DeleteConversation { conversation_id } => {
                let Some(conversation_id) = self.target(conversation_id) else {
                    return true;
                };
                let backend = Arc::clone(&self.backend);
                self.spawn_request("Failed to delete conversation", async move {
                    backend.delete_conversation(&conversation_id).await?;
                    Ok(Event::ConversationDeleted { conversation_id })
                });
            }
        }
        true
    }

    fn process_event(&mut self, event: Event) {
        match transition(&mut self.state, event) {
            Ok(effects) => {
                for effect in effects {
                    self.execute_effect(effect);
                }
            }
            Err(e) if e.is_stale() => {
                tracing::debug!(error = %e, "Ignoring stale event");
            }
            Err(e) => {
                tracing::info!(error = %e, "Event rejected");
                let _ = self.updates_tx.send(StoreUpdate::Rejected(e.to_string()));
            }
        }

        // A finished session's handle and timer are no longer needed
        if self
            .session
            .as_ref()
            .is_some_and(|live| !self.state.is_current_session(live.id))
        {
            self.session = None;
        }
    }

    fn execute_effect(&mut self, effect: Effect) {
        match effect {
            Effect::PersistMessage {
                conversation_id,
                message,
            } => {
                let job = PersistJob {
                    conversation_id,
                    message,
                };
                let sent = self.persist_tx.as_ref().is_some_and(|tx| tx.send(job).is_ok());
                if !sent {
                    tracing::error!("Persistence queue closed, message not saved");
                }
            }

            Effect::OpenStream {
                session,
                conversation_id,
                question,
            } => {
                tracing::info!(conv_id = %conversation_id, session = %session, "Opening answer stream");
                let handler = ChannelHandler {
                    session,
                    events: self.command_tx.clone(),
                };
                let handle = self.stream_client.open(conversation_id, question, handler);
                let timer = self.answer_timeout.map(|timeout| {
                    let events = self.command_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(timeout).await;
                        let _ = events.send(Command::Event(Event::StreamTimedOut { session }));
                    })
                });
                self.session = Some(LiveSession {
                    id: session,
                    handle,
                    timer,
                });
            }

            Effect::AbortStream { session } => {
                if let Some(live) = self.session.take_if(|live| live.id == session) {
                    tracing::info!(session = %session, "Aborting answer stream");
                    live.handle.abort();
                }
            }

            Effect::LoadMessages {
                conversation_id,
                page,
            } => {
                let backend = Arc::clone(&self.backend);
                self.spawn_request("Failed to load messages", async move {
                    let messages = backend.fetch_messages(&conversation_id, page).await?;
                    Ok(Event::MessagesLoaded {
                        conversation_id,
                        offset: page.offset,
                        messages,
                    })
                });
            }

            Effect::Notify(update) => {
                // No subscribers is fine
                let _ = self.updates_tx.send(update);
            }
        }
    }

    /// Resolve an explicit or active conversation id, rejecting when neither exists
    fn target(&self, conversation_id: Option<String>) -> Option<String> {
        let target = conversation_id.or_else(|| self.state.active_conversation.clone());
        if target.is_none() {
            let _ = self
                .updates_tx
                .send(StoreUpdate::Rejected(TransitionError::NoConversation.to_string()));
        }
        target
    }

    /// Run a backend call off the loop and feed its outcome back as an event
    fn spawn_request<F>(&self, context: &'static str, request: F)
    where
        F: Future<Output = Result<Event, ApiError>> + Send + 'static,
    {
        let events = self.command_tx.clone();
        tokio::spawn(async move {
            let event = request.await.unwrap_or_else(|e| Event::RequestFailed {
                message: format!("{context}: {e}"),
            });
            let _ = events.send(Command::Event(event));
        });
    }
}

/// Writes queued messages one at a time, in queue order
async fn run_writer<B: ChatBackend + ?Sized>(
    backend: Arc<B>,
    user_id: String,
    mut jobs: mpsc::UnboundedReceiver<PersistJob>,
    events: mpsc::UnboundedSender<Command>,
) {
    while let Some(job) = jobs.recv().await {
        let author = match job.message.role {
            Role::User => user_id.as_str(),
            Role::Assistant => ASSISTANT_USER_ID,
        };
        let result = backend
            .append_message(&job.conversation_id, author, job.message.role, &job.message.content)
            .await;
        if let Err(e) = result {
            tracing::warn!(
                conv_id = %job.conversation_id,
                role = job.message.role.as_str(),
                error = %e,
                "Failed to persist message"
            );
            let _ = events.send(Command::Event(Event::RequestFailed {
                message: format!("Failed to save message: {e}"),
            }));
        }
    }
}

/// Forwards session callbacks into the runtime, tagged with the session id
struct ChannelHandler {
    session: SessionId,
    events: mpsc::UnboundedSender<Command>,
}

impl ChannelHandler {
    fn forward(&self, event: SessionEvent) {
        let _ = self.events.send(Command::Event(Event::Stream {
            session: self.session,
            event,
        }));
    }
}

impl StreamHandler for ChannelHandler {
    fn on_prep(&mut self, text: String) {
        self.forward(SessionEvent::Prep(text));
    }

    fn on_sources(&mut self, sources: Vec<Source>) {
        self.forward(SessionEvent::Sources(sources));
    }

    fn on_chunk(&mut self, delta: String) {
        self.forward(SessionEvent::Chunk(delta));
    }

    fn on_done(&mut self, meta: DoneMeta) {
        self.forward(SessionEvent::Done(meta));
    }

    fn on_error(&mut self, message: String) {
        self.forward(SessionEvent::Error(message));
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable front door to a running store
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl ChatHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> Result<ChatState, StoreClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| StoreClosed)
    }

    pub fn select(&self, conversation_id: impl Into<String>) -> Result<(), StoreClosed> {
        self.event(Event::SelectConversation {
            conversation_id: conversation_id.into(),
        })
    }

    pub fn set_draft(&self, text: impl Into<String>) -> Result<(), StoreClosed> {
        self.event(Event::SetDraft { text: text.into() })
    }

    pub fn submit(&self) -> Result<(), StoreClosed> {
        self.event(Event::Submit)
    }

    pub fn cancel(&self) -> Result<(), StoreClosed> {
        self.event(Event::CancelStream)
    }

    pub fn load_older(&self) -> Result<(), StoreClosed> {
        self.event(Event::LoadOlderMessages)
    }

    pub fn refresh_conversations(&self) -> Result<(), StoreClosed> {
        self.send(Command::RefreshConversations)
    }

    pub fn create_conversation(&self, title: Option<String>) -> Result<(), StoreClosed> {
        self.send(Command::CreateConversation { title })
    }

    /// Rename a conversation; `None` renames the active one
    pub fn rename(&self, conversation_id: Option<String>, title: impl Into<String>) -> Result<(), StoreClosed> {
        self.send(Command::RenameConversation {
            conversation_id,
            title: title.into(),
        })
    }

    /// Delete a conversation; `None` deletes the active one
    pub fn delete(&self, conversation_id: Option<String>) -> Result<(), StoreClosed> {
        self.send(Command::DeleteConversation { conversation_id })
    }

    /// Abort any open session and stop the runtime after queued writes finish
    pub fn shutdown(&self) -> Result<(), StoreClosed> {
        self.event(Event::Teardown)
    }

    fn event(&self, event: Event) -> Result<(), StoreClosed> {
        self.send(Command::Event(event))
    }

    fn send(&self, command: Command) -> Result<(), StoreClosed> {
        self.commands.send(command).map_err(|_| StoreClosed)
    }
}
