//! Shared identifiers and value types.
//!
//! Every arena in the engine is keyed by one of the UUID newtypes defined
//! here, so ids from different arenas cannot be mixed up.

mod polar;
mod types;

pub use polar::Polar;
pub use types::{CameraId, Color, LightId, ModelId, ObjectId};
