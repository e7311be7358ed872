use crate::config::EngineConfig;
use crate::renderer::Renderer;
use anyhow::Context as _;
use scenegraph_input::{InputBindings, InputEvent, InputState};
use scenegraph_scene::Scene;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

/// Everything input callbacks and updates may touch besides the app's own
/// state.
#[derive(Debug)]
pub struct Engine {
    pub renderer: Renderer,
    pub scene: Scene,
}

/// Input bindings of an application `A`.
pub type Bindings<A> = InputBindings<A, Engine>;

/// An application driven by [`run`].
pub trait App: Sized + 'static {
    /// Build the scene, register it with the renderer and bind inputs.
    /// Runs once, after the window and render programs exist.
    fn setup(&mut self, engine: &mut Engine, bindings: &mut Bindings<Self>) -> anyhow::Result<()>;

    /// Advance the app by `dt` seconds before a frame is drawn.
    fn update(&mut self, _engine: &mut Engine, _dt: f32) {}

    /// Called after each drawn frame with its instantaneous frame rate.
    fn frame_rendered(&mut self, _engine: &mut Engine, _fps: u32) {}
}

struct Runner<A: App> {
    app: A,
    config: EngineConfig,
    engine: Option<Engine>,
    bindings: Bindings<A>,
    input: InputState,
    last_update: Instant,
    error: Option<anyhow::Error>,
}

impl<A: App> Runner<A> {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let mut renderer =
            Renderer::init_window_with(event_loop, &self.config).context("failed to open the window")?;
        renderer.init_programs().context("failed to build the render programs")?;
        let mut engine = Engine {
            renderer,
            scene: Scene::new(),
        };
        self.app
            .setup(&mut engine, &mut self.bindings)
            .context("application setup failed")?;
        tracing::info!(bindings = self.bindings.len(), "application ready");
        self.engine = Some(engine);
        self.last_update = Instant::now();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{error:#}");
        if let Some(engine) = self.engine.as_mut() {
            engine.renderer.destroy_window();
        }
        self.error = Some(error);
        event_loop.exit();
    }

    fn redraw(&mut self) -> anyhow::Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        if engine.renderer.terminated() {
            return Ok(());
        }
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        self.app.update(engine, dt);
        if engine.renderer.terminated() {
            return Ok(());
        }
        let fps = engine.renderer.render_frame(&mut engine.scene)?;
        self.app.frame_rendered(engine, fps);
        Ok(())
    }
}

impl<A: App> ApplicationHandler for Runner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() || self.error.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        if let Some((input, payload)) = self.input.translate(&event) {
            if input == InputEvent::WindowResize {
                if let Some((width, height)) = payload.size() {
                    engine.renderer.set_resolution(width, height);
                }
            }
            self.bindings.dispatch(input, &mut self.app, engine, &payload);
        }

        match event {
            WindowEvent::CloseRequested => engine.renderer.destroy_window(),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                    return;
                }
            }
            _ => {}
        }

        if self.engine.as_ref().is_some_and(|e| e.renderer.terminated()) {
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.engine.as_ref().and_then(|e| e.renderer.window()) {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = self.engine.as_mut() {
            engine.renderer.destroy_window();
        }
    }
}

/// Open a window for `app` and drive it until the window is destroyed.
///
/// Returns the first fatal error, so callers can exit non-zero.
pub fn run<A: App>(app: A, config: EngineConfig) -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("failed to create the event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut runner = Runner {
        app,
        config,
        engine: None,
        bindings: InputBindings::new(),
        input: InputState::new(),
        last_update: Instant::now(),
        error: None,
    };
    event_loop.run_app(&mut runner).context("event loop failed")?;
    match runner.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
