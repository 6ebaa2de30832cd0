//! Conversation state store
//!
//! Elm-style split: `transition` is a pure function from (state, event) to
//! effects, and `ChatRuntime` is the single owner that executes them.

mod effect;
mod event;
mod runtime;
mod state;
mod transition;

#[cfg(test)]
pub mod testing;

#[allow(unused_imports)] // Public API re-exports
pub use effect::{DiscardReason, Effect, StoreUpdate};
#[allow(unused_imports)]
pub use event::{Event, SessionEvent};
#[allow(unused_imports)]
pub use runtime::{ChatHandle, ChatRuntime, StoreClosed};
#[allow(unused_imports)]
pub use state::{ChatState, SessionId, StreamingBuffer};
#[allow(unused_imports)]
pub use transition::{transition, TransitionError};
