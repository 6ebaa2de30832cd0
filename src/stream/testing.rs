//! Scripted transport and recording handler for stream tests

use super::event::{DoneMeta, Source, StreamHandler};
use super::transport::{AskTransport, TransportError, TransportResponse};
use crate::api::AskRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// Scripted Transport
// ============================================================================

/// One scripted response
#[derive(Debug, Clone)]
pub struct Script {
    status: u16,
    body: Option<Vec<Result<Bytes, String>>>,
    hold_open: bool,
    connect_error: Option<String>,
}

#[allow(dead_code)]
impl Script {
    /// 200 with an empty body so far
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: Some(Vec::new()),
            hold_open: false,
            connect_error: None,
        }
    }

    /// Status without a body
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: None,
            hold_open: false,
            connect_error: None,
        }
    }

    /// Request never gets a response
    pub fn connect_error(message: impl Into<String>) -> Self {
        Self {
            connect_error: Some(message.into()),
            ..Self::status(0)
        }
    }

    pub fn chunk(self, text: &str) -> Self {
        self.chunk_bytes(text.as_bytes())
    }

    pub fn chunk_bytes(mut self, bytes: &[u8]) -> Self {
        self.body
            .get_or_insert_with(Vec::new)
            .push(Ok(Bytes::copy_from_slice(bytes)));
        self
    }

    /// Read error after the chunks queued so far
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.body.get_or_insert_with(Vec::new).push(Err(message.into()));
        self
    }

    /// Keep the body open after the scripted chunks
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }
}

/// Transport that replays queued scripts in order
#[allow(dead_code)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<AskRequest>>,
    request_started: Arc<Notify>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn recorded_requests(&self) -> Vec<AskRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Signalled every time `open` is called
    pub fn request_started(&self) -> Arc<Notify> {
        Arc::clone(&self.request_started)
    }
}

#[async_trait]
impl AskTransport for ScriptedTransport {
    async fn open(&self, request: &AskRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.request_started.notify_one();

        let Some(script) = self.scripts.lock().unwrap().pop_front() else {
            return Err(TransportError::connect("No scripted response queued"));
        };
        if let Some(message) = script.connect_error {
            return Err(TransportError::connect(message));
        }

        let body = script.body.map(|items| {
            let chunks = futures::stream::iter(
                items
                    .into_iter()
                    .map(|item| item.map_err(TransportError::body)),
            );
            if script.hold_open {
                chunks.chain(futures::stream::pending()).boxed()
            } else {
                chunks.boxed()
            }
        });

        Ok(TransportResponse {
            status: script.status,
            body,
        })
    }
}

// ============================================================================
// Recording Handler
// ============================================================================

/// Handler callback as observed by a test
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Prep(String),
    Sources(Vec<Source>),
    Chunk(String),
    Done(DoneMeta),
    Error(String),
}

/// Handler that appends every callback to a shared log
pub struct RecordingHandler {
    log: Arc<Mutex<Vec<Recorded>>>,
    called: Arc<Notify>,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            called: Arc::new(Notify::new()),
        }
    }

    pub fn log(&self) -> Arc<Mutex<Vec<Recorded>>> {
        Arc::clone(&self.log)
    }

    /// Resolves once at least one callback has run
    pub fn first_call(&self) -> Arc<Notify> {
        Arc::clone(&self.called)
    }

    fn record(&self, call: Recorded) {
        self.log.lock().unwrap().push(call);
        self.called.notify_one();
    }
}

impl StreamHandler for RecordingHandler {
    fn on_prep(&mut self, text: String) {
        self.record(Recorded::Prep(text));
    }

    fn on_sources(&mut self, sources: Vec<Source>) {
        self.record(Recorded::Sources(sources));
    }

    fn on_chunk(&mut self, delta: String) {
        self.record(Recorded::Chunk(delta));
    }

    fn on_done(&mut self, meta: DoneMeta) {
        self.record(Recorded::Done(meta));
    }

    fn on_error(&mut self, message: String) {
        self.record(Recorded::Error(message));
    }
}
