mod board;
mod lamps;

use anyhow::{Context, Result};
use board::Board;
use clap::Parser;
use glam::Vec3;
use lamps::ZSide;
use scenegraph_assets::{Material, primitives};
use scenegraph_common::{CameraId, LightId, ObjectId};
use scenegraph_engine::controls::{self, DragState};
use scenegraph_engine::{App, Bindings, Engine, EngineConfig};
use scenegraph_input::{InputEvent, Key, MouseButton};
use scenegraph_scene::{Camera, Light, Projection, SceneObject};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SKYBOX_FACES: [&str; 6] = ["posx", "negx", "posy", "negy", "posz", "negz"];

#[derive(Parser, Debug)]
#[command(name = "twinstick", about = "Top-down map with street lamps and a skybox")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Engine config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Edge length of the spotlight shadow map
    #[arg(long)]
    shadow_resolution: Option<u32>,

    /// Resource directory holding models/, light/ and skybox/
    #[arg(long, default_value = "res")]
    assets: PathBuf,

    /// Seed for tree placement
    #[arg(long, default_value = "7")]
    seed: u64,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                EngineConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?
            }
            None => EngineConfig {
                title: "TwinStick".into(),
                width: 1080,
                height: 720,
                ambient: 0.5,
                shadow_resolution: 2048,
                ..EngineConfig::default()
            },
        };
        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if let Some(resolution) = self.shadow_resolution {
            config.shadow_resolution = resolution;
        }
        Ok(config)
    }

    fn skybox(&self) -> [PathBuf; 6] {
        SKYBOX_FACES.map(|face| self.assets.join("skybox").join(format!("{face}.png")))
    }
}

#[derive(Debug, Clone, Copy)]
struct Handles {
    camera: CameraId,
    lamp: ObjectId,
    spot: LightId,
}

struct TwinStick {
    cli: Cli,
    shadow_resolution: u32,
    drag: DragState,
    handles: Option<Handles>,
    board: Option<Board>,
    camera_side: ZSide,
    show_triangulation: bool,
}

impl TwinStick {
    fn new(cli: Cli, config: &EngineConfig) -> Self {
        Self {
            cli,
            shadow_resolution: config.shadow_resolution,
            drag: DragState::new(config.width, config.height),
            handles: None,
            board: None,
            camera_side: ZSide::default(),
            show_triangulation: false,
        }
    }

    fn drag_to(&mut self, engine: &mut Engine, x: f64, y: f64) -> Result<()> {
        let (dx, dy) = self.drag.moved_to(x, y);
        let Some(handles) = self.handles else {
            return Ok(());
        };
        let scene = &mut engine.scene;
        if self.drag.control {
            if self.drag.left {
                controls::orbit(scene, handles.lamp, Vec3::ZERO, dx, -dy)?;
            }
            if self.drag.right {
                controls::dolly(scene, handles.lamp, Vec3::ZERO, dy)?;
            }
            if self.drag.is_dragging() {
                let spot_node = scene.light_node(handles.spot)?;
                scene.look_at_global(spot_node, Vec3::ZERO)?;
            }
        } else {
            let node = scene.camera_node(handles.camera)?;
            if self.drag.left {
                controls::orbit(scene, node, Vec3::ZERO, -dx, dy)?;
            }
            if self.drag.right {
                controls::dolly(scene, node, Vec3::ZERO, dy)?;
            }
        }
        Ok(())
    }

    fn bind_inputs(bindings: &mut Bindings<Self>) {
        bindings.bind(InputEvent::KeyDown(Key::Escape), |_, engine, _| {
            engine.renderer.destroy_window();
        });
        bindings.bind(InputEvent::KeyDown(Key::Space), |app, engine, _| {
            app.show_triangulation = !app.show_triangulation;
            engine.renderer.set_show_triangulation(app.show_triangulation);
        });
        bindings.bind(InputEvent::KeyDown(Key::L), |app, engine, _| {
            if let Some(board) = app.board.as_mut() {
                board.lamps.swap_lights(&mut engine.renderer);
            }
        });
        for button in [MouseButton::Left, MouseButton::Right] {
            bindings.bind(InputEvent::MouseDown(button), move |app, _, payload| {
                app.drag.press(button, payload);
            });
            bindings.bind(InputEvent::MouseUp(button), move |app, _, _| {
                app.drag.release(button);
            });
        }
        bindings.bind(InputEvent::MouseMove, |app, engine, payload| {
            let Some((x, y)) = payload.cursor() else {
                return;
            };
            if let Err(e) = app.drag_to(engine, x, y) {
                tracing::warn!("drag ignored: {e:#}");
            }
        });
        bindings.bind(InputEvent::WindowResize, |app, _, payload| {
            if let Some((width, height)) = payload.size() {
                app.drag.resize(width, height);
            }
        });
    }
}

impl App for TwinStick {
    fn setup(&mut self, engine: &mut Engine, bindings: &mut Bindings<Self>) -> Result<()> {
        let mut lamp = SceneObject::new("light");
        if lamp.load_model(self.cli.assets.join("light").join("light.obj")).is_err() {
            let bulb = Material::colored("bulb", [1.0; 3], [0.0; 3], 1.0, 1.0).with_emission([1.0, 0.9, 0.6]);
            lamp.set_model(Arc::new(primitives::cuboid(Vec3::splat(1.5), bulb)?));
        }
        let lamp = engine.scene.spawn(lamp);
        engine.scene.set_global_position(lamp, Vec3::new(0.0, 30.0, 60.0))?;

        let (width, height) = engine.renderer.size().unwrap_or((1, 1));
        let camera = engine
            .scene
            .spawn_camera(Camera::perspective(1.5, width as f32 / height.max(1) as f32, 0.05, 3000.0));
        let camera_node = engine.scene.camera_node(camera)?;
        engine.scene.set_global_position(camera_node, Vec3::new(0.0, 30.0, 55.0))?;
        engine.scene.look_at_global(camera_node, Vec3::ZERO)?;

        let spot = engine.scene.spawn_light(Light::spot(Projection::Perspective {
            fov_y: 1.0,
            aspect: 1.0,
            near: 1.0,
            far: 1000.0,
        }));
        let spot_node = engine.scene.light_node(spot)?;
        engine.scene.add_child(lamp, spot_node, true)?;
        engine.scene.look_at_global(spot_node, Vec3::ZERO)?;

        let board = Board::spawn(&mut engine.scene, &self.cli.assets, self.cli.seed)?;

        let renderer = &mut engine.renderer;
        renderer.add_object(lamp);
        renderer.set_main_camera(camera);
        renderer.set_spot_light(spot);
        board.register(&mut engine.scene, renderer);
        renderer
            .setup_shadows(&mut engine.scene, spot, self.shadow_resolution, self.shadow_resolution)
            .context("spotlight shadow map")?;
        // Logged by the renderer; the scene then renders over the clear color.
        let _ = renderer.set_skybox(self.cli.skybox());

        self.camera_side.crossed(55.0);
        self.handles = Some(Handles { camera, lamp, spot });
        self.board = Some(board);
        Self::bind_inputs(bindings);
        Ok(())
    }

    fn update(&mut self, engine: &mut Engine, _dt: f32) {
        let (Some(handles), Some(board)) = (self.handles, self.board.as_mut()) else {
            return;
        };
        let Ok(eye) = engine.scene.camera_transform(handles.camera) else {
            return;
        };
        if self.camera_side.crossed(eye.position().z) {
            board.lamps.swap_lights(&mut engine.renderer);
        }
    }

    fn frame_rendered(&mut self, engine: &mut Engine, fps: u32) {
        if let Some(window) = engine.renderer.window() {
            window.set_title(&window_title(fps));
        }
    }
}

fn window_title(fps: u32) -> String {
    format!("TwinStick [{fps} FPS]")
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.engine_config()?;
    let app = TwinStick::new(cli, &config);
    scenegraph_engine::run(app, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_shows_frame_rate() {
        assert_eq!(window_title(60), "TwinStick [60 FPS]");
    }

    #[test]
    fn skybox_faces_in_cube_order() {
        let cli = Cli::parse_from(["twinstick", "--assets", "data"]);
        let faces = cli.skybox();
        assert_eq!(faces[0], PathBuf::from("data/skybox/posx.png"));
        assert_eq!(faces[5], PathBuf::from("data/skybox/negz.png"));
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["twinstick", "--width", "800", "--shadow-resolution", "1024"]);
        let config = cli.engine_config().unwrap();
        assert_eq!(config.title, "TwinStick");
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 720);
        assert_eq!(config.shadow_resolution, 1024);
        assert_eq!(config.ambient, 0.5);
    }
}
