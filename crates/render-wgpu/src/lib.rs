//! wgpu backend: executes frame plans on the GPU.
//!
//! # Invariants
//! - The backend never reads the scene; everything it draws comes from a
//!   [`scenegraph_render::FramePlan`].
//! - Framebuffer validity is decided once, at creation.
//! - GPU objects are released explicitly through `release_all` while the
//!   device is alive; dropping a live framebuffer only logs a warning.

mod backend;
mod context;
mod framebuffer;
mod mesh;
mod pipelines;
mod shaders;
mod texture;
mod uniforms;

pub use backend::{ShadowMap, Target, WgpuBackend};
pub use context::GpuContext;
pub use framebuffer::{
    Attachment, COLOR_FORMAT, DEPTH_FORMAT, FrameBuffer, FrameBufferCube, FrameBufferOptions,
};
pub use mesh::{GpuMesh, GpuSubMesh, MeshCache};
pub use pipelines::{Layouts, Pipelines};
pub use texture::{GpuTexture, TextureCache};
