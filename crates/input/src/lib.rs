//! Input events and callback bindings.
//!
//! # Invariants
//! - At most one callback per event; binding again replaces it.
//! - Callbacks run synchronously on the event-loop thread, between frames.
//! - Only the translation module knows about winit.

mod bindings;
mod event;
pub mod translate;

pub use bindings::InputBindings;
pub use event::{InputEvent, InputPayload, Key, Modifiers, MouseButton};
pub use translate::InputState;
