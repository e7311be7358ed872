//! Renderer core: everything about a frame that does not need a GPU.
//!
//! # Invariants
//! - Planning reads the scene and never mutates it.
//! - Only registered objects and lights are planned; scene membership alone
//!   renders nothing.
//! - Shadow casters are selected by the light's view, never the camera's.
//!
//! A backend executes the resulting [`FramePlan`] through the
//! [`RenderBackend`] trait; the wgpu backend lives in its own crate.

mod backend;
mod clock;
mod error;
mod plan;
mod registry;
mod settings;
mod shadow_targets;
pub mod tessellate;
pub mod wireframe;

pub use backend::{DebugTextBackend, RenderBackend};
pub use clock::{FrameClock, fps_from_dt};
pub use error::RenderError;
pub use plan::{
    DrawItem, DrawPath, FramePlan, FramePlanner, FrameStats, LightSet, MAX_DIRECTIONAL_LIGHTS,
    MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS, MainPass, PlannedLight, ShadowPass, ShadowSampling,
};
pub use registry::Registry;
pub use settings::{MAX_SEGMENTS, MAX_TESSELLATION_LEVEL, MIN_TESSELLATION_LEVEL, RenderSettings};
pub use shadow_targets::{GpuResource, ShadowTargets};
pub use tessellate::{MeshGeometry, SubMesh, build_geometry};
