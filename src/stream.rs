//! Ask stream client
//!
//! Turns the incremental body of `POST /ask` into handler callbacks:
//! bytes are split into frames, frames become typed events, and a session
//! controller owns the lifecycle of one request.

mod decoder;
mod event;
mod session;
mod transport;

#[cfg(test)]
pub mod testing;

#[cfg(test)]
mod proptests;

#[allow(unused_imports)] // Public API re-exports
pub use decoder::{Frame, FrameDecoder, DEFAULT_EVENT_TYPE};
#[allow(unused_imports)]
pub use event::{dispatch, DoneMeta, FinishReason, Source, StreamEvent, StreamHandler};
#[allow(unused_imports)]
pub use session::{AskStreamClient, SessionHandle};
#[allow(unused_imports)]
pub use transport::{
    AskTransport, ByteStream, HttpTransport, TransportError, TransportErrorKind, TransportResponse,
};
