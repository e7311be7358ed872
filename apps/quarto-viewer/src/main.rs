use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use scenegraph_assets::{Material, primitives};
use scenegraph_common::{CameraId, LightId, ObjectId, Polar};
use scenegraph_engine::controls::{self, DragState};
use scenegraph_engine::{App, Bindings, Engine, EngineConfig};
use scenegraph_input::{InputEvent, InputPayload, Key, MouseButton};
use scenegraph_scene::{Camera, Light, Projection, RenderFlags, SceneObject};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quarto-viewer", about = "View a displacement-mapped plane under a movable spotlight")]
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

    /// Normal map of the plane
    #[arg(long, default_value = "res/teapot/teapot_normal.png")]
    normal: PathBuf,

    /// Height map displacing the plane
    #[arg(long, default_value = "res/teapot/teapot_disp.png")]
    displacement: PathBuf,

    /// Model drawn where the spotlight sits
    #[arg(long, default_value = "res/light/light.obj")]
    light_model: PathBuf,
}

impl Cli {
    /// Defaults, then the config file, then flags.
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                EngineConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?
            }
            None => EngineConfig {
                title: "Quarto".into(),
                width: 1080,
                height: 720,
                ambient: 0.2,
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
}

#[derive(Debug, Clone, Copy)]
struct Handles {
    camera: CameraId,
    lamp: ObjectId,
    spot: LightId,
}

struct Quarto {
    cli: Cli,
    shadow_resolution: u32,
    drag: DragState,
    /// Lamp placement around the origin.
    lamp_orbit: Polar,
    handles: Option<Handles>,
    show_triangulation: bool,
}

impl Quarto {
    fn new(cli: Cli, config: &EngineConfig) -> Self {
        let start = Vec3::new(0.0, 30.0, 60.0);
        Self {
            cli,
            shadow_resolution: config.shadow_resolution,
            drag: DragState::new(config.width, config.height),
            lamp_orbit: Polar::new(0.0, (start.y / start.z).atan(), start.length()),
            handles: None,
            show_triangulation: false,
        }
    }

    fn place_lamp(&self, engine: &mut Engine, handles: Handles) -> Result<()> {
        let scene = &mut engine.scene;
        scene.set_global_position(handles.lamp, self.lamp_orbit.coordinates())?;
        let spot_node = scene.light_node(handles.spot)?;
        scene.look_at_global(spot_node, Vec3::ZERO)?;
        Ok(())
    }

    fn drag_to(&mut self, engine: &mut Engine, x: f64, y: f64) -> Result<()> {
        let (dx, dy) = self.drag.moved_to(x, y);
        let Some(handles) = self.handles else {
            return Ok(());
        };
        if self.drag.control {
            if self.drag.left {
                self.lamp_orbit.rotate(dx, -dy);
            }
            if self.drag.right {
                self.lamp_orbit.distance = (self.lamp_orbit.distance * (1.0 + dy)).max(1.0);
            }
            if self.drag.is_dragging() {
                self.place_lamp(engine, handles)?;
            }
        } else {
            let node = engine.scene.camera_node(handles.camera)?;
            if self.drag.left {
                controls::orbit(&mut engine.scene, node, Vec3::ZERO, -dx, dy)?;
            }
            if self.drag.right {
                controls::dolly(&mut engine.scene, node, Vec3::ZERO, dy)?;
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
        bindings.bind(InputEvent::KeyDown(Key::Right), |_, engine, _| {
            let level = engine.renderer.increase_tessellation_level();
            tracing::info!(level, "tessellation level");
        });
        bindings.bind(InputEvent::KeyDown(Key::Left), |_, engine, _| {
            let level = engine.renderer.decrease_tessellation_level();
            tracing::info!(level, "tessellation level");
        });
        for button in [MouseButton::Left, MouseButton::Right] {
            bindings.bind(InputEvent::MouseDown(button), move |app, _, payload| {
                app.drag.press(button, payload);
            });
            bindings.bind(InputEvent::MouseUp(button), move |app, _, _| {
                app.drag.release(button);
            });
        }
        bindings.bind(InputEvent::MouseMove, |app, engine, payload: &InputPayload| {
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

impl App for Quarto {
    fn setup(&mut self, engine: &mut Engine, bindings: &mut Bindings<Self>) -> Result<()> {
        let plane_material = Material::colored("plane", [0.4; 3], [0.6; 3], 20.0, 1.0);
        let mut plane = SceneObject::new("plane")
            .with_model(Arc::new(primitives::plane(50.0, plane_material)?))
            .with_flags(RenderFlags::solid());
        plane.set_patches(4);
        let plane = engine.scene.spawn(plane);

        let mut lamp = SceneObject::new("lamp");
        if lamp.load_model(&self.cli.light_model).is_err() {
            let bulb = Material::colored("bulb", [1.0; 3], [0.0; 3], 1.0, 1.0).with_emission([1.0, 0.9, 0.6]);
            lamp.set_model(Arc::new(primitives::cuboid(Vec3::splat(1.5), bulb)?));
        }
        let lamp = engine.scene.spawn(lamp);

        let (width, height) = engine.renderer.size().unwrap_or((1, 1));
        let camera = engine.scene.spawn_camera(Camera::perspective(
            1.2,
            width as f32 / height.max(1) as f32,
            0.5,
            50_000.0,
        ));
        let camera_node = engine.scene.camera_node(camera)?;
        engine
            .scene
            .object_mut(camera_node)?
            .transform
            .set_position(Vec3::new(0.0, 30.0, 55.0));
        engine.scene.look_at_global(camera_node, Vec3::ZERO)?;

        let spot = engine.scene.spawn_light(Light::spot(Projection::Perspective {
            fov_y: 1.0,
            aspect: 1.0,
            near: 1.0,
            far: 1000.0,
        }));
        // The spotlight rides on the lamp model.
        let spot_node = engine.scene.light_node(spot)?;
        engine.scene.add_child(lamp, spot_node, true)?;

        let handles = Handles { camera, lamp, spot };
        self.place_lamp(engine, handles)?;
        self.handles = Some(handles);

        let renderer = &mut engine.renderer;
        renderer.add_object(plane);
        renderer.add_object(lamp);
        renderer.set_main_camera(camera);
        renderer.set_spot_light(spot);
        // Missing textures are logged by the renderer; the plane then renders
        // flat.
        let _ = renderer.set_normal_texture(&self.cli.normal);
        let _ = renderer.set_displacement_texture(&self.cli.displacement);
        renderer
            .setup_shadows(&mut engine.scene, spot, self.shadow_resolution, self.shadow_resolution)
            .context("spotlight shadow map")?;

        Self::bind_inputs(bindings);
        Ok(())
    }
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
    let app = Quarto::new(cli, &config);
    scenegraph_engine::run(app, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "width": 640, "height": 480, "shadow_resolution": 512 }"#).unwrap();

        let cli = Cli::parse_from(["quarto-viewer", "--config", path.to_str().unwrap(), "--height", "400"]);
        let config = cli.engine_config().unwrap();
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 400);
        assert_eq!(config.shadow_resolution, 512);
    }

    #[test]
    fn defaults_without_config() {
        let cli = Cli::parse_from(["quarto-viewer"]);
        let config = cli.engine_config().unwrap();
        assert_eq!(config.title, "Quarto");
        assert_eq!((config.width, config.height), (1080, 720));
        assert_eq!(config.shadow_resolution, 2048);
    }

    #[test]
    fn lamp_starts_where_it_was_placed() {
        let cli = Cli::parse_from(["quarto-viewer"]);
        let app = Quarto::new(cli, &EngineConfig::default());
        let p = app.lamp_orbit.coordinates();
        assert!(p.abs_diff_eq(Vec3::new(0.0, 30.0, 60.0), 1e-3), "{p}");
    }
}
