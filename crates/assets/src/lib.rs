//! Asset data: models, meshes, materials, texture references and images.
//!
//! Everything here is immutable once loaded. The renderer consumes models
//! through `Arc<Model>` and uploads their textures lazily, keyed by source
//! path.
//!
//! # Failure model
//! A failed load returns an error and touches nothing that was loaded
//! before. There is no retry.

mod image_data;
mod material;
mod model;
mod obj;
pub mod primitives;

use std::path::PathBuf;

pub use image_data::{CubeFaces, ImageData};
pub use material::{Material, TextureHandle, TextureRef};
pub use model::{Bounds, Mesh, Model, Triangle, Vertex};
pub use obj::load_obj;

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to load OBJ {}: {source}", .path.display())]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("failed to decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("mesh {mesh} references vertex {index} but the model has {vertex_count}")]
    InvalidIndex {
        mesh: String,
        index: u32,
        vertex_count: u32,
    },
    #[error("skybox face {face} is {width}x{height}, expected {expected}x{expected}")]
    SkyboxFaceMismatch {
        face: usize,
        expected: u32,
        width: u32,
        height: u32,
    },
    #[error("model has no vertices")]
    Empty,
}
