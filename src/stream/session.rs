//! Stream session controller
//!
//! One session answers one question: it opens the request, feeds the body
//! through the decoder and dispatcher, and guarantees that the handler sees
//! exactly one `on_done` unless the caller cancelled first.

use super::decoder::FrameDecoder;
use super::event::{dispatch, DoneMeta, StreamEvent, StreamHandler};
use super::transport::AskTransport;
use crate::api::AskRequest;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Opens stream sessions over a transport
pub struct AskStreamClient<T: AskTransport + ?Sized> {
    transport: Arc<T>,
}

impl<T: AskTransport + ?Sized> Clone for AskStreamClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: AskTransport + ?Sized> AskStreamClient<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Start a session on its own task. Returns immediately.
    pub fn open<H: StreamHandler>(
        &self,
        conversation_id: impl Into<String>,
        question: impl Into<String>,
        handler: H,
    ) -> SessionHandle {
        let request = AskRequest {
            conversation_id: conversation_id.into(),
            question: question.into(),
        };
        let cancel = CancellationToken::new();
        let driver = SessionDriver {
            handler,
            cancel: cancel.clone(),
            finalized: false,
        };
        let task = tokio::spawn(run_session(Arc::clone(&self.transport), request, driver));
        SessionHandle { cancel, task }
    }
}

/// Control surface of an open session
#[derive(Debug)]
pub struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Request cancellation. Idempotent, and a no-op once the session has
    /// finished. No handler is invoked after this returns, apart from one
    /// that was already running.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    #[allow(dead_code)] // Used by tests
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task to exit
    #[allow(dead_code)] // Used by tests
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Stream session task panicked");
        }
    }
}

/// Handler plus the per-session finalization flag
struct SessionDriver<H> {
    handler: H,
    cancel: CancellationToken,
    finalized: bool,
}

impl<H: StreamHandler> SessionDriver<H> {
    fn is_live(&self) -> bool {
        !self.finalized && !self.cancel.is_cancelled()
    }

    fn emit(&mut self, event: StreamEvent) {
        if self.is_live() {
            dispatch(&mut self.handler, event);
        }
    }

    fn finish(&mut self, meta: DoneMeta) {
        if !self.is_live() {
            return;
        }
        self.finalized = true;
        tracing::debug!(finish_reason = meta.finish_reason.as_str(), "Stream session finalized");
        self.handler.on_done(meta);
    }

    /// Report a failure and close the session with a partial terminal state
    fn fail(&mut self, message: String) {
        if !self.is_live() {
            return;
        }
        tracing::warn!(error = %message, "Stream session failed");
        self.handler.on_error(message);
        self.finish(DoneMeta::exception());
    }
}

async fn run_session<T, H>(transport: Arc<T>, request: AskRequest, mut driver: SessionDriver<H>)
where
    T: AskTransport + ?Sized,
    H: StreamHandler,
{
    let conv_id = request.conversation_id.clone();

    let opened = tokio::select! {
        biased;
        () = driver.cancel.cancelled() => {
            tracing::debug!(conv_id = %conv_id, "Session cancelled before response");
            return;
        }
        result = transport.open(&request) => result,
    };

    let response = match opened {
        Ok(response) => response,
        Err(e) => {
            driver.fail(e.to_string());
            return;
        }
    };

    let status = response.status;
    let success = response.is_success();
    let mut body = match response.body {
        Some(body) if success => body,
        _ => {
            driver.fail(format!("HTTP {status}"));
            return;
        }
    };

    let mut decoder = FrameDecoder::new();
    let mut frame_count = 0usize;

    loop {
        // The only suspension point of the session
        let next = tokio::select! {
            biased;
            () = driver.cancel.cancelled() => {
                tracing::debug!(conv_id = %conv_id, frames = frame_count, "Session cancelled");
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for frame in decoder.push_bytes(&bytes) {
                    frame_count += 1;
                    match StreamEvent::from_frame(&frame) {
                        Some(StreamEvent::Done(server)) => {
                            driver.finish(DoneMeta::stop(server));
                            tracing::info!(conv_id = %conv_id, frames = frame_count, "Answer stream completed");
                            return;
                        }
                        Some(event) => driver.emit(event),
                        None => {}
                    }
                    if driver.cancel.is_cancelled() {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                driver.fail(e.to_string());
                return;
            }
            None => {
                if decoder.buffered_len() > 0 {
                    tracing::debug!(
                        conv_id = %conv_id,
                        leftover = decoder.buffered_len(),
                        "Dropping unterminated trailing block"
                    );
                }
                tracing::warn!(conv_id = %conv_id, frames = frame_count, "Stream ended without done");
                driver.finish(DoneMeta::stream_ended());
                return;
            }
        }
    }
}
