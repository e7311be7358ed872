//! The engine applications build on.
//!
//! [`Renderer`] is the public rendering contract: register objects and
//! lights, pick a camera, render frames. [`run`] drives an [`App`] inside a
//! winit event loop, dispatching input to its bindings and rendering on
//! every redraw.
//!
//! # Lifecycle
//! 1. `Renderer::init_window` opens the window and the GPU device.
//! 2. `Renderer::init_programs` builds every pipeline.
//! 3. `App::setup` fills the scene and binds inputs.
//! 4. Each redraw: `App::update`, `Renderer::render_frame`,
//!    `App::frame_rendered`.
//! 5. `Renderer::destroy_window` releases GPU resources and ends the loop.

mod app;
mod config;
pub mod controls;
mod renderer;

pub use app::{App, Bindings, Engine, run};
pub use config::{ConfigError, EngineConfig};
pub use renderer::Renderer;

pub use scenegraph_common as common;
pub use scenegraph_input as input;
pub use scenegraph_render as render;
pub use scenegraph_scene as scene;
pub use scenegraph_assets as assets;
