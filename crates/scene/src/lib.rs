//! Scene graph: the single owner of every object, light and camera.
//!
//! # Invariants
//! - Parent links never form a cycle; `Scene::add_child` rejects them.
//! - World transforms are derived from the parent chain on every query, so
//!   moving a parent is immediately visible through its inheriting children.
//! - Models are shared immutably via `Arc`; the scene never mutates one.

pub mod camera;
pub mod frustum;
pub mod graph;
pub mod light;
pub mod object;
pub mod transform;

use scenegraph_common::{CameraId, LightId, ObjectId};

pub use camera::{Camera, Projection, pitch_step_allowed};
pub use frustum::{Frustum, Plane};
pub use graph::{ChildPolicy, Despawned, Scene};
pub use light::{Light, LightKind, ShadowSettings, ShadowView, cube_face_view_projections};
pub use object::{ParentLink, RenderFlags, SceneObject};
pub use transform::{TransformNode, WORLD_UP};

/// Errors from scene graph operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SceneError {
    #[error("object {0} not found")]
    ObjectNotFound(ObjectId),
    #[error("light {0} not found")]
    LightNotFound(LightId),
    #[error("camera {0} not found")]
    CameraNotFound(CameraId),
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle { parent: ObjectId, child: ObjectId },
    #[error("object {0} cannot be its own parent")]
    SelfParent(ObjectId),
    #[error("ambient lights cannot cast shadows")]
    ShadowUnsupported,
}
