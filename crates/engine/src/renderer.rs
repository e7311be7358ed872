use crate::config::EngineConfig;
use scenegraph_common::{CameraId, LightId, ObjectId};
use scenegraph_render::{
    DebugTextBackend, FrameClock, FramePlanner, Registry, RenderBackend, RenderError, RenderSettings,
};
use scenegraph_render_wgpu::{GpuContext, WgpuBackend};
use scenegraph_scene::{LightKind, Scene, SceneError, ShadowSettings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

/// Near plane of point and directional shadow maps.
const SHADOW_NEAR: f32 = 0.05;
/// Far plane of directional shadow maps.
const DIRECTIONAL_SHADOW_FAR: f32 = 500.0;

/// The renderer contract applications program against.
///
/// Owns the window, the GPU backend and the registries of objects and lights
/// to draw. Scene contents stay with the caller and are passed to
/// [`Renderer::render_frame`] every frame.
pub struct Renderer {
    window: Option<Arc<Window>>,
    backend: Option<WgpuBackend>,
    registry: Registry,
    settings: RenderSettings,
    planner: FramePlanner,
    clock: FrameClock,
    trace: DebugTextBackend,
    camera: Option<CameraId>,
    spot_light: Option<LightId>,
    pending_resolution: Option<(u32, u32)>,
    terminated: bool,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("objects", &self.registry.objects().len())
            .field("lights", &self.registry.lights().len())
            .field("camera", &self.camera)
            .field("spot_light", &self.spot_light)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Open a window with a default configuration.
    pub fn init_window(
        event_loop: &ActiveEventLoop,
        title: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let config = EngineConfig {
            title: title.to_string(),
            width,
            height,
            ..EngineConfig::default()
        };
        Self::init_window_with(event_loop, &config)
    }

    /// Open a window and a GPU device able to present to it.
    pub fn init_window_with(event_loop: &ActiveEventLoop, config: &EngineConfig) -> Result<Self, RenderError> {
        let attributes = Window::default_attributes()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .map_err(|e| RenderError::Window(e.to_string()))?,
        );
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|e| RenderError::Surface(e.to_string()))?;
        let ctx = GpuContext::new(instance, Some(&surface))?;
        let size = window.inner_size();
        let backend = WgpuBackend::with_surface(ctx, surface, size.width, size.height, config.vsync)?;
        tracing::info!(title = %config.title, width = size.width, height = size.height, "window created");
        Ok(Self::with_backend(Some(window), backend, config))
    }

    /// A renderer drawing into an offscreen target, without a window.
    pub fn headless(config: &EngineConfig) -> Result<Self, RenderError> {
        let ctx = GpuContext::headless()?;
        let backend = WgpuBackend::offscreen(ctx, config.width, config.height)?;
        Ok(Self::with_backend(None, backend, config))
    }

    fn with_backend(window: Option<Arc<Window>>, backend: WgpuBackend, config: &EngineConfig) -> Self {
        Self {
            window,
            backend: Some(backend),
            registry: Registry::new(),
            settings: config.render_settings(),
            planner: FramePlanner::new(),
            clock: FrameClock::new(),
            trace: DebugTextBackend::new(),
            camera: None,
            spot_light: None,
            pending_resolution: None,
            terminated: false,
        }
    }

    fn backend_mut(&mut self) -> Result<&mut WgpuBackend, RenderError> {
        self.backend.as_mut().ok_or(RenderError::Terminated)
    }

    /// Compile every shader pipeline the passes use.
    pub fn init_programs(&mut self) -> Result<(), RenderError> {
        self.backend_mut()?.init_programs()?;
        tracing::info!("render programs ready");
        Ok(())
    }

    /// Register an object for drawing. Returns false if already registered.
    pub fn add_object(&mut self, object: ObjectId) -> bool {
        self.registry.add_object(object)
    }

    pub fn remove_object(&mut self, object: ObjectId) -> bool {
        self.registry.remove_object(object)
    }

    pub fn add_light(&mut self, light: LightId) -> bool {
        self.registry.add_light(light)
    }

    pub fn remove_light(&mut self, light: LightId) -> bool {
        self.registry.remove_light(light)
    }

    /// Forget every registered object and light.
    pub fn remove_all_entities(&mut self) {
        self.registry.clear();
    }

    pub fn set_main_camera(&mut self, camera: CameraId) {
        self.camera = Some(camera);
    }

    /// The spotlight shadow caster. It lights the scene even when it is not
    /// registered.
    pub fn set_spot_light(&mut self, light: LightId) {
        self.spot_light = Some(light);
    }

    /// Give `light` a `width` x `height` shadow map and allocate its depth
    /// target now, so an incomplete target is reported here rather than
    /// mid-frame. Point lights get a cube map of `width`.
    ///
    /// On failure the light is left without shadows.
    pub fn setup_shadows(
        &mut self,
        scene: &mut Scene,
        light: LightId,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        let backend = self.backend.as_mut().ok_or(RenderError::Terminated)?;
        let entry = scene.light_mut(light).ok_or(SceneError::LightNotFound(light))?;
        let (settings, cube) = match *entry.kind() {
            LightKind::Point { range } => (ShadowSettings::cube(width, SHADOW_NEAR, range.max(SHADOW_NEAR * 2.0)), true),
            LightKind::Spot { projection } => {
                (ShadowSettings::new(width, height, projection.near(), projection.far()), false)
            }
            LightKind::Directional => (ShadowSettings::new(width, height, SHADOW_NEAR, DIRECTIONAL_SHADOW_FAR), false),
            LightKind::Ambient => return Err(SceneError::ShadowUnsupported.into()),
        };
        entry.setup_shadow_map(settings)?;
        let generation = entry.shadow_generation();
        if let Err(e) = backend.ensure_shadow_target(light, generation, &settings, cube) {
            tracing::error!(light = %light, width, height, "shadow setup failed: {e}");
            entry.disable_shadows();
            return Err(e);
        }
        tracing::info!(light = %light, width, height, cube, "shadow map ready");
        Ok(())
    }

    /// Free a light's shadow target before the light itself goes away.
    pub fn release_light_resources(&mut self, light: LightId) -> bool {
        self.backend
            .as_mut()
            .is_some_and(|backend| backend.release_shadow(light))
    }

    pub fn set_ambient_light(&mut self, intensity: f32) {
        self.settings.ambient = intensity;
    }

    pub fn set_normal_texture(&mut self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        if let Err(e) = self.backend_mut()?.set_normal_map(path) {
            tracing::error!(path = %path.display(), "normal texture not set: {e}");
            return Err(e.into());
        }
        tracing::info!(path = %path.display(), "normal texture set");
        Ok(())
    }

    pub fn set_displacement_texture(&mut self, path: impl AsRef<Path>) -> Result<(), RenderError> {
        let path = path.as_ref();
        if let Err(e) = self.backend_mut()?.set_displacement_map(path) {
            tracing::error!(path = %path.display(), "displacement texture not set: {e}");
            return Err(e.into());
        }
        tracing::info!(path = %path.display(), "displacement texture set");
        Ok(())
    }

    /// Six faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn set_skybox(&mut self, faces: [PathBuf; 6]) -> Result<(), RenderError> {
        let backend = self.backend_mut()?;
        if let Err(e) = backend.set_skybox(&faces) {
            tracing::error!("skybox not set: {e}");
            return Err(e);
        }
        self.settings.skybox = true;
        Ok(())
    }

    /// Request a new output size. It is applied at the start of the next
    /// frame together with the depth target and the camera aspect.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.pending_resolution = Some((width, height));
    }

    pub fn pending_resolution(&self) -> Option<(u32, u32)> {
        self.pending_resolution
    }

    pub fn set_show_triangulation(&mut self, show: bool) {
        self.settings.show_triangulation = show;
    }

    pub fn increase_tessellation_level(&mut self) -> u32 {
        let level = self.settings.increase_tessellation_level();
        tracing::debug!(level, "tessellation level");
        level
    }

    pub fn decrease_tessellation_level(&mut self) -> u32 {
        let level = self.settings.decrease_tessellation_level();
        tracing::debug!(level, "tessellation level");
        level
    }

    pub fn tessellation_level(&self) -> u32 {
        self.settings.tessellation_level()
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn main_camera(&self) -> Option<CameraId> {
        self.camera
    }

    pub fn spot_light(&self) -> Option<LightId> {
        self.spot_light
    }

    /// Current output size in pixels.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.backend.as_ref().map(WgpuBackend::size)
    }

    pub fn backend(&self) -> Option<&WgpuBackend> {
        self.backend.as_ref()
    }

    /// Draw one frame of `scene` and return the instantaneous frame rate.
    pub fn render_frame(&mut self, scene: &mut Scene) -> Result<u32, RenderError> {
        let Some(backend) = self.backend.as_mut() else {
            return Err(RenderError::Terminated);
        };
        let _span = tracing::info_span!("render_frame").entered();
        let fps = self.clock.tick(Instant::now());

        if let Some((width, height)) = self.pending_resolution {
            if width == 0 || height == 0 {
                return Ok(fps);
            }
            backend.resize(width, height)?;
            if let Some(camera) = self.camera.and_then(|id| scene.camera_mut(id)) {
                camera.set_aspect(width as f32 / height as f32);
            }
            self.pending_resolution = None;
            tracing::info!(width, height, "resolution applied");
        }

        backend.release_shadows_unless(|light| scene.light(light).is_some());
        self.settings.skybox = backend.has_skybox();
        let plan = self
            .planner
            .plan(scene, &self.registry, &self.settings, self.camera, self.spot_light)?;
        let stats = &plan.stats;
        tracing::debug!(
            draws = stats.draws,
            culled = stats.culled,
            shadow_passes = stats.shadow_passes,
            shadow_draws = stats.shadow_draws,
            dropped_lights = stats.dropped_lights,
            "frame planned"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let text = self.trace.execute(&plan)?;
            tracing::trace!("\n{text}");
        }
        backend.execute(&plan)?;
        Ok(fps)
    }

    /// Whether the window was destroyed. The frame loop stops on true.
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    /// Release every GPU resource while the device is still alive, then
    /// drop the surface and the window.
    pub fn destroy_window(&mut self) {
        if self.terminated {
            return;
        }
        if let Some(mut backend) = self.backend.take() {
            backend.release_all();
        }
        self.window = None;
        self.terminated = true;
        tracing::info!("window destroyed");
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if !self.terminated {
            tracing::warn!("renderer dropped without destroy_window, releasing GPU resources");
            self.destroy_window();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use scenegraph_assets::{Material, primitives};
    use scenegraph_scene::{Camera, Light, Projection, RenderFlags, SceneObject};

    fn renderer(width: u32, height: u32) -> Option<Renderer> {
        let config = EngineConfig {
            width,
            height,
            ..EngineConfig::default()
        };
        match Renderer::headless(&config) {
            Ok(mut r) => {
                r.init_programs().unwrap();
                Some(r)
            }
            Err(e) => {
                tracing::warn!("skipping GPU test: {e}");
                None
            }
        }
    }

    fn scene_with_camera(renderer: &mut Renderer) -> Scene {
        let mut scene = Scene::new();
        let camera = scene.spawn_camera(Camera::perspective(1.0, 1.0, 0.1, 100.0));
        let node = scene.camera_node(camera).unwrap();
        scene.set_global_position(node, Vec3::new(0.0, 5.0, 10.0)).unwrap();
        scene.look_at_global(node, Vec3::ZERO).unwrap();
        renderer.set_main_camera(camera);
        scene
    }

    #[test]
    fn frame_without_camera_fails() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = Scene::new();
        assert!(matches!(r.render_frame(&mut scene), Err(RenderError::NoMainCamera)));
        r.destroy_window();
    }

    #[test]
    fn registration_round_trip() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = scene_with_camera(&mut r);
        let model = Arc::new(primitives::cuboid(Vec3::ONE, Material::default()).unwrap());
        let obj = scene.spawn(SceneObject::new("box").with_model(model).with_flags(RenderFlags::solid()));

        assert!(r.add_object(obj));
        assert!(!r.add_object(obj));
        r.render_frame(&mut scene).unwrap();
        assert!(r.remove_object(obj));
        assert!(r.registry().objects().is_empty());
        r.render_frame(&mut scene).unwrap();
        r.destroy_window();
    }

    #[test]
    fn resolution_applies_at_next_frame() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = scene_with_camera(&mut r);
        let camera = r.main_camera().unwrap();

        r.set_resolution(32, 16);
        assert_eq!(r.size(), Some((16, 16)));
        r.render_frame(&mut scene).unwrap();
        assert_eq!(r.size(), Some((32, 16)));
        assert_eq!(r.pending_resolution(), None);
        approx::assert_relative_eq!(scene.camera(camera).unwrap().projection().aspect(), 2.0);
        r.destroy_window();
    }

    #[test]
    fn zero_resolution_stays_pending() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = scene_with_camera(&mut r);
        r.set_resolution(0, 720);
        r.render_frame(&mut scene).unwrap();
        assert_eq!(r.pending_resolution(), Some((0, 720)));
        assert_eq!(r.size(), Some((16, 16)));
        r.destroy_window();
    }

    #[test]
    fn shadows_need_a_capable_light() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = Scene::new();
        let ambient = scene.spawn_light(Light::ambient(0.3));
        assert!(matches!(
            r.setup_shadows(&mut scene, ambient, 256, 256),
            Err(RenderError::Scene(SceneError::ShadowUnsupported))
        ));

        let spot = scene.spawn_light(Light::spot(Projection::default()));
        r.setup_shadows(&mut scene, spot, 256, 256).unwrap();
        assert!(r.backend().unwrap().has_shadow_target(spot));
        assert!(r.release_light_resources(spot));
        assert!(!r.release_light_resources(spot));
        r.destroy_window();
    }

    #[test]
    fn despawned_light_frees_its_shadow_target() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = scene_with_camera(&mut r);
        let kept = scene.spawn_light(Light::point(20.0));
        let doomed = scene.spawn_light(Light::point(20.0));
        r.setup_shadows(&mut scene, kept, 64, 64).unwrap();
        r.setup_shadows(&mut scene, doomed, 64, 64).unwrap();
        r.add_light(doomed);
        assert_eq!(r.backend().unwrap().shadow_target_count(), 2);

        scene.despawn_light(doomed).unwrap();
        r.render_frame(&mut scene).unwrap();
        let backend = r.backend().unwrap();
        assert_eq!(backend.shadow_target_count(), 1);
        assert!(backend.has_shadow_target(kept));
        assert!(!backend.has_shadow_target(doomed));
        r.destroy_window();
    }

    #[test]
    fn replacing_a_model_does_not_grow_the_mesh_cache() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = scene_with_camera(&mut r);
        let cube = || Arc::new(primitives::cuboid(Vec3::ONE, Material::default()).unwrap());
        let obj = scene.spawn(SceneObject::new("box").with_model(cube()).with_flags(RenderFlags::solid()));
        r.add_object(obj);
        for _ in 0..4 {
            r.render_frame(&mut scene).unwrap();
            scene.object_mut(obj).unwrap().set_model(cube());
        }
        r.render_frame(&mut scene).unwrap();
        assert_eq!(r.backend().unwrap().mesh_count(), 1);
        r.destroy_window();
    }

    #[test]
    fn zero_sized_shadow_map_is_reported() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = Scene::new();
        let lamp = scene.spawn_light(Light::point(20.0));
        assert!(matches!(
            r.setup_shadows(&mut scene, lamp, 0, 0),
            Err(RenderError::InvalidFrameBuffer { .. })
        ));
        assert!(scene.light(lamp).unwrap().shadow().is_none());
        r.destroy_window();
    }

    #[test]
    fn missing_textures_leave_renderer_usable() {
        let Some(mut r) = renderer(16, 16) else { return };
        let mut scene = scene_with_camera(&mut r);
        let dir = tempfile::tempdir().unwrap();
        assert!(r.set_normal_texture(dir.path().join("normal.png")).is_err());
        assert!(r.set_displacement_texture(dir.path().join("disp.png")).is_err());
        let faces = ["px", "nx", "py", "ny", "pz", "nz"].map(|f| dir.path().join(format!("{f}.png")));
        assert!(r.set_skybox(faces).is_err());
        assert!(!r.settings().skybox);
        r.render_frame(&mut scene).unwrap();
        r.destroy_window();
    }

    #[test]
    fn tessellation_level_is_clamped() {
        let Some(mut r) = renderer(8, 8) else { return };
        assert_eq!(r.decrease_tessellation_level(), 1);
        for _ in 0..40 {
            r.increase_tessellation_level();
        }
        assert_eq!(r.tessellation_level(), scenegraph_render::MAX_TESSELLATION_LEVEL);
        r.destroy_window();
    }

    #[test]
    fn destroyed_renderer_refuses_frames() {
        let Some(mut r) = renderer(8, 8) else { return };
        let mut scene = scene_with_camera(&mut r);
        r.destroy_window();
        assert!(r.terminated());
        assert!(r.size().is_none());
        assert!(matches!(r.render_frame(&mut scene), Err(RenderError::Terminated)));
        r.destroy_window();
    }
}
