use scenegraph_assets::AssetError;
use scenegraph_scene::SceneError;

/// Errors surfaced by the renderer and its backends.
///
/// Window, surface and device failures during initialisation are fatal; the
/// application runner turns them into a non-zero exit.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no main camera set")]
    NoMainCamera,
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("window creation failed: {0}")]
    Window(String),
    #[error("surface error: {0}")]
    Surface(String),
    #[error("no suitable GPU adapter found")]
    AdapterNotFound,
    #[error("device error: {0}")]
    Device(String),
    #[error("framebuffer {label} is incomplete")]
    InvalidFrameBuffer { label: String },
    #[error("render programs are not initialised")]
    ProgramsNotInitialized,
    #[error("renderer has been terminated")]
    Terminated,
}
