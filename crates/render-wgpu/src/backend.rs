//! Executes frame plans on the GPU.

use crate::framebuffer::{COLOR_FORMAT, DEPTH_FORMAT, FrameBuffer, FrameBufferCube, FrameBufferOptions};
use crate::mesh::{MaterialDefaults, MeshCache};
use crate::pipelines::Pipelines;
use crate::texture::{GpuTexture, TextureCache};
use crate::uniforms::{
    FrameUniforms, ObjectUniforms, ShadowViewUniforms, SkyUniforms, UNIFORM_STRIDE,
};
use crate::GpuContext;
use scenegraph_assets::{AssetError, CubeFaces, ImageData, TextureHandle};
use scenegraph_common::{LightId, ModelId, ObjectId};
use scenegraph_render::{
    DrawItem, DrawPath, FramePlan, GpuResource, PlannedLight, RenderBackend, RenderError,
    ShadowTargets,
};
use scenegraph_scene::{ShadowSettings, ShadowView};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A light's depth target: a 2D map for spot and directional lights, a
/// cube for point lights.
#[derive(Debug)]
pub enum ShadowMap {
    Single(FrameBuffer),
    Cube(FrameBufferCube),
}

impl ShadowMap {
    pub fn is_valid(&self) -> bool {
        match self {
            ShadowMap::Single(fb) => fb.is_valid(),
            ShadowMap::Cube(fb) => fb.is_valid(),
        }
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, ShadowMap::Cube(_))
    }

    fn label(&self) -> &str {
        match self {
            ShadowMap::Single(fb) => fb.label(),
            ShadowMap::Cube(fb) => fb.label(),
        }
    }

    /// View to render `face` into.
    fn face_target(&self, face: usize) -> Option<&wgpu::TextureView> {
        match self {
            ShadowMap::Single(fb) => fb.depth_target(),
            ShadowMap::Cube(fb) => fb.face_view(face),
        }
    }

    /// View the main pass samples.
    fn sample_view(&self) -> Option<&wgpu::TextureView> {
        match self {
            ShadowMap::Single(fb) => fb.depth_map().map(|a| &a.view),
            ShadowMap::Cube(fb) => fb.cube_view(),
        }
    }
}

impl GpuResource for ShadowMap {
    fn release(&mut self) {
        match self {
            ShadowMap::Single(fb) => fb.release(),
            ShadowMap::Cube(fb) => fb.release(),
        }
    }
}

/// Where the main pass renders to.
#[derive(Debug)]
pub enum Target {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen(FrameBuffer),
}

/// A uniform buffer holding many fixed-stride slots addressed by dynamic
/// offset. Grows by doubling.
#[derive(Debug)]
struct DynamicUniforms {
    label: &'static str,
    binding_size: u64,
    capacity: u64,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl DynamicUniforms {
    fn new(ctx: &GpuContext, layout: &wgpu::BindGroupLayout, label: &'static str, binding_size: u64, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity * UNIFORM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(binding_size),
                }),
            }],
        });
        Self {
            label,
            binding_size,
            capacity,
            buffer,
            bind_group,
        }
    }

    /// Upload `slots`, each padded to the stride.
    fn write<T: bytemuck::Pod>(&mut self, ctx: &GpuContext, layout: &wgpu::BindGroupLayout, slots: &[T]) {
        let needed = slots.len() as u64;
        if needed > self.capacity {
            let grown = needed.next_power_of_two();
            tracing::debug!(label = self.label, from = self.capacity, to = grown, "growing uniform buffer");
            self.buffer.destroy();
            *self = Self::new(ctx, layout, self.label, self.binding_size, grown);
        }
        let stride = UNIFORM_STRIDE as usize;
        let mut staging = vec![0u8; slots.len() * stride];
        for (i, slot) in slots.iter().enumerate() {
            let bytes = bytemuck::bytes_of(slot);
            staging[i * stride..i * stride + bytes.len()].copy_from_slice(bytes);
        }
        if !staging.is_empty() {
            ctx.queue.write_buffer(&self.buffer, 0, &staging);
        }
    }

    fn offset(slot: u32) -> u32 {
        slot * UNIFORM_STRIDE as u32
    }

    fn release(&self) {
        self.buffer.destroy();
    }
}

#[derive(Debug)]
struct Skybox {
    texture: GpuTexture,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

/// Stand-ins bound where a real resource is missing.
#[derive(Debug)]
struct Fallbacks {
    white: GpuTexture,
    flat_normal: GpuTexture,
    zero_height: GpuTexture,
    depth_2d: wgpu::Texture,
    depth_2d_view: wgpu::TextureView,
    depth_cube: wgpu::Texture,
    depth_cube_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    sky_sampler: wgpu::Sampler,
}

impl Fallbacks {
    fn new(ctx: &GpuContext) -> Self {
        let depth = |label: &str, layers: u32| {
            ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
        };
        let depth_2d = depth("no_shadow_2d", 1);
        let depth_cube = depth("no_shadow_cube", 6);
        let depth_2d_view = depth_2d.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_cube_view = depth_cube.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        let repeat = wgpu::SamplerDescriptor {
            label: Some("material_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        };
        Self {
            white: GpuTexture::solid(ctx, "white", [255; 4], true),
            flat_normal: GpuTexture::solid(ctx, "flat_normal", [128, 128, 255, 255], false),
            zero_height: GpuTexture::solid(ctx, "zero_height", [0, 0, 0, 255], false),
            depth_2d,
            depth_2d_view,
            depth_cube,
            depth_cube_view,
            sampler: ctx.device.create_sampler(&repeat),
            shadow_sampler: ctx.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("shadow_sampler"),
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                compare: Some(wgpu::CompareFunction::LessEqual),
                ..Default::default()
            }),
            sky_sampler: ctx.device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("sky_sampler"),
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            }),
        }
    }

    fn release(self) {
        self.white.release();
        self.flat_normal.release();
        self.zero_height.release();
        self.depth_2d.destroy();
        self.depth_cube.destroy();
    }
}

/// Slot assignment of one frame's dynamic uniforms.
#[derive(Debug, Default)]
struct FrameSlots {
    objects: HashMap<ObjectId, u32>,
    object_data: Vec<ObjectUniforms>,
    views: Vec<ShadowViewUniforms>,
    /// First view slot of every shadow pass, in plan order.
    pass_views: Vec<u32>,
    camera_view: u32,
}

impl FrameSlots {
    fn build(plan: &FramePlan) -> Self {
        let mut slots = Self::default();
        let casters = plan.shadow_passes.iter().flat_map(|p| p.casters.iter());
        for draw in plan.main.draws.iter().chain(casters) {
            if slots.objects.contains_key(&draw.object) {
                continue;
            }
            let displacement = match draw.path {
                DrawPath::Standard => 0.0,
                DrawPath::Displaced { .. } => plan.displacement_scale,
            };
            slots.objects.insert(draw.object, slots.object_data.len() as u32);
            slots.object_data.push(ObjectUniforms::new(
                draw.world,
                draw.flags.lit,
                draw.flags.receives_shadows,
                displacement,
            ));
        }
        for pass in &plan.shadow_passes {
            slots.pass_views.push(slots.views.len() as u32);
            let faces: &[glam::Mat4] = match &pass.view {
                ShadowView::Single { view_proj } => std::slice::from_ref(view_proj),
                ShadowView::Cube { faces, .. } => faces,
            };
            for face in faces {
                slots.views.push(ShadowViewUniforms {
                    view_proj: face.to_cols_array_2d(),
                });
            }
        }
        slots.camera_view = slots.views.len() as u32;
        slots.views.push(ShadowViewUniforms {
            view_proj: (plan.main.projection * plan.main.view).to_cols_array_2d(),
        });
        slots
    }
}

/// wgpu implementation of [`RenderBackend`].
///
/// Owns every GPU object the renderer creates. Call
/// [`WgpuBackend::release_all`] before dropping the context.
#[derive(Debug)]
pub struct WgpuBackend {
    ctx: GpuContext,
    target: Target,
    width: u32,
    height: u32,
    depth: FrameBuffer,
    pipelines: Option<Pipelines>,
    fallbacks: Option<Fallbacks>,
    shadows: ShadowTargets<ShadowMap>,
    textures: TextureCache,
    meshes: MeshCache,
    normal_map: Option<TextureHandle>,
    displacement_map: Option<TextureHandle>,
    skybox: Option<Skybox>,
    frame_uniforms: Option<wgpu::Buffer>,
    objects: Option<DynamicUniforms>,
    views: Option<DynamicUniforms>,
}

impl WgpuBackend {
    /// Render to a window surface. Prefers an sRGB format.
    pub fn with_surface(
        ctx: GpuContext,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self, RenderError> {
        let caps = surface.get_capabilities(&ctx.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);
        let target = Target::Surface { surface, config };
        Self::with_target(ctx, target, width.max(1), height.max(1))
    }

    /// Render into an offscreen color target, for tests and captures.
    pub fn offscreen(ctx: GpuContext, width: u32, height: u32) -> Result<Self, RenderError> {
        let color = FrameBuffer::new(
            &ctx,
            "offscreen_color",
            width,
            height,
            FrameBufferOptions {
                color: true,
                ..FrameBufferOptions::default()
            },
        );
        if !color.is_valid() {
            return Err(RenderError::InvalidFrameBuffer {
                label: color.label().to_string(),
            });
        }
        Self::with_target(ctx, Target::Offscreen(color), width, height)
    }

    fn with_target(ctx: GpuContext, target: Target, width: u32, height: u32) -> Result<Self, RenderError> {
        let depth = FrameBuffer::new(&ctx, "main_depth", width, height, FrameBufferOptions::depth_only());
        if !depth.is_valid() {
            return Err(RenderError::InvalidFrameBuffer {
                label: depth.label().to_string(),
            });
        }
        Ok(Self {
            ctx,
            target,
            width,
            height,
            depth,
            pipelines: None,
            fallbacks: None,
            shadows: ShadowTargets::new(),
            textures: TextureCache::new(),
            meshes: MeshCache::new(),
            normal_map: None,
            displacement_map: None,
            skybox: None,
            frame_uniforms: None,
            objects: None,
            views: None,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        match &self.target {
            Target::Surface { config, .. } => config.format,
            Target::Offscreen(_) => COLOR_FORMAT,
        }
    }

    pub fn programs_ready(&self) -> bool {
        self.pipelines.is_some()
    }

    /// Compile the shaders and create the pipelines and per-frame buffers.
    pub fn init_programs(&mut self) -> Result<(), RenderError> {
        let pipelines = Pipelines::new(&self.ctx, self.color_format())?;
        let layouts = &pipelines.layouts;
        self.frame_uniforms = Some(self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        self.objects = Some(DynamicUniforms::new(
            &self.ctx,
            &layouts.object,
            "object_uniforms",
            std::mem::size_of::<ObjectUniforms>() as u64,
            64,
        ));
        self.views = Some(DynamicUniforms::new(
            &self.ctx,
            &layouts.view,
            "view_uniforms",
            std::mem::size_of::<ShadowViewUniforms>() as u64,
            32,
        ));
        self.fallbacks = Some(Fallbacks::new(&self.ctx));
        self.pipelines = Some(pipelines);
        Ok(())
    }

    /// Make sure `light` has a depth target matching `settings`. An existing
    /// target of the same generation is kept.
    pub fn ensure_shadow_target(
        &mut self,
        light: LightId,
        generation: u64,
        settings: &ShadowSettings,
        cube: bool,
    ) -> Result<(), RenderError> {
        let ctx = &self.ctx;
        self.shadows
            .reconcile(light, generation, || {
                let label = format!("shadow {light}");
                let mut map = if cube {
                    ShadowMap::Cube(FrameBufferCube::new(ctx, &label, settings.width, FrameBufferOptions::shadow_map()))
                } else {
                    ShadowMap::Single(FrameBuffer::new(
                        ctx,
                        &label,
                        settings.width,
                        settings.height,
                        FrameBufferOptions::shadow_map(),
                    ))
                };
                if map.is_valid() {
                    tracing::debug!(light = %light, cube, width = settings.width, height = settings.height, "shadow target created");
                    Ok(map)
                } else {
                    map.release();
                    Err(RenderError::InvalidFrameBuffer { label })
                }
            })
            .map(|_| ())
    }

    pub fn has_shadow_target(&self, light: LightId) -> bool {
        self.shadows.get(light).is_some_and(ShadowMap::is_valid)
    }

    /// Free one light's shadow target early.
    pub fn release_shadow(&mut self, light: LightId) -> bool {
        self.shadows.release(light)
    }

    /// Free the targets of lights `alive` rejects, such as despawned ones.
    pub fn release_shadows_unless(&mut self, alive: impl FnMut(LightId) -> bool) -> usize {
        let released = self.shadows.release_unless(alive);
        if released > 0 {
            tracing::debug!(released, "released shadow targets of removed lights");
        }
        released
    }

    pub fn shadow_target_count(&self) -> usize {
        self.shadows.len()
    }

    /// Resize the color and depth targets. A zero extent is refused.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, RenderError> {
        if width == 0 || height == 0 {
            return Ok(false);
        }
        match &mut self.target {
            Target::Surface { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.ctx.device, config);
            }
            Target::Offscreen(color) => {
                color.release();
                *color = FrameBuffer::new(
                    &self.ctx,
                    "offscreen_color",
                    width,
                    height,
                    FrameBufferOptions {
                        color: true,
                        ..FrameBufferOptions::default()
                    },
                );
            }
        }
        self.depth.release();
        self.depth = FrameBuffer::new(&self.ctx, "main_depth", width, height, FrameBufferOptions::depth_only());
        self.width = width;
        self.height = height;
        if !self.depth.is_valid() {
            return Err(RenderError::InvalidFrameBuffer {
                label: self.depth.label().to_string(),
            });
        }
        tracing::debug!(width, height, "render targets resized");
        Ok(true)
    }

    /// Normal map applied to displaced objects.
    pub fn set_normal_map(&mut self, path: &Path) -> Result<(), AssetError> {
        self.normal_map = Some(self.textures.load_required(&self.ctx, path, false)?);
        Ok(())
    }

    /// Height map displacing patched objects along their normals.
    pub fn set_displacement_map(&mut self, path: &Path) -> Result<(), AssetError> {
        self.displacement_map = Some(self.textures.load_required(&self.ctx, path, false)?);
        Ok(())
    }

    /// Load six faces (+X, -X, +Y, -Y, +Z, -Z) as the sky. The previous sky
    /// stays in place if loading fails.
    pub fn set_skybox(&mut self, paths: &[PathBuf; 6]) -> Result<(), RenderError> {
        let faces = CubeFaces::load(paths)?;
        let pipelines = self.pipelines.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let fallbacks = self.fallbacks.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let texture = GpuTexture::cube(&self.ctx, "skybox", &faces);
        let uniforms = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sky_uniforms"),
            size: std::mem::size_of::<SkyUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("skybox"),
            layout: &pipelines.layouts.skybox,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&fallbacks.sky_sampler),
                },
            ],
        });
        if let Some(old) = self.skybox.replace(Skybox {
            texture,
            uniforms,
            bind_group,
        }) {
            old.uniforms.destroy();
            old.texture.release();
        }
        tracing::info!(size = faces.size(), "skybox loaded");
        Ok(())
    }

    pub fn has_skybox(&self) -> bool {
        self.skybox.is_some()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Destroy every GPU object the backend created. The backend stays
    /// usable for resizing but must be re-initialised before drawing.
    pub fn release_all(&mut self) {
        self.shadows.release_all();
        self.depth.release();
        if let Target::Offscreen(color) = &mut self.target {
            color.release();
        }
        self.textures.release_all();
        self.meshes.release_all();
        if let Some(sky) = self.skybox.take() {
            sky.uniforms.destroy();
            sky.texture.release();
        }
        if let Some(buffer) = self.frame_uniforms.take() {
            buffer.destroy();
        }
        for dynamic in [self.objects.take(), self.views.take()].into_iter().flatten() {
            dynamic.release();
        }
        if let Some(fallbacks) = self.fallbacks.take() {
            fallbacks.release();
        }
        self.normal_map = None;
        self.displacement_map = None;
        self.pipelines = None;
        tracing::debug!("GPU resources released");
    }

    /// Copy the offscreen color target back to the CPU.
    pub fn capture(&self) -> Option<ImageData> {
        let Target::Offscreen(fb) = &self.target else {
            return None;
        };
        let color = fb.color()?;
        let (width, height) = (fb.width(), fb.height());
        let padded = (width * 4).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("capture"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("capture") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.ctx.device.poll(wgpu::Maintain::Wait);
        if !matches!(rx.recv(), Ok(Ok(()))) {
            tracing::error!("capture readback failed");
            return None;
        }
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize).take(height as usize) {
                rgba.extend_from_slice(&row[..(width * 4) as usize]);
            }
        }
        buffer.unmap();
        buffer.destroy();
        Some(ImageData { width, height, rgba })
    }

    /// Free geometry, materials and diffuse textures of models nobody holds
    /// any more. Surface maps stay.
    fn evict_dropped_models(&mut self) {
        for handle in self.meshes.evict_dropped() {
            let surface_map = Some(handle) == self.normal_map || Some(handle) == self.displacement_map;
            if !surface_map && !self.meshes.uses_texture(handle) {
                self.textures.release(handle);
            }
        }
    }

    fn prepare_meshes(&mut self, plan: &FramePlan) -> Result<(), RenderError> {
        self.evict_dropped_models();
        let pipelines = self.pipelines.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let fallbacks = self.fallbacks.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let defaults = MaterialDefaults {
            white: &fallbacks.white,
            sampler: &fallbacks.sampler,
        };
        let casters = plan.shadow_passes.iter().flat_map(|p| p.casters.iter());
        let mut used: HashSet<(ModelId, u32)> = HashSet::new();
        for draw in plan.main.draws.iter().chain(casters) {
            let segments = draw.path.segments();
            if used.insert((draw.model.id(), segments)) {
                self.meshes.prepare(
                    &self.ctx,
                    &pipelines.layouts.material,
                    &mut self.textures,
                    &defaults,
                    &draw.model,
                    segments,
                );
            }
        }
        if plan.wireframe {
            for draw in &plan.main.draws {
                if let Some(mesh) = self.meshes.mesh_mut(draw.model.id(), draw.path.segments()) {
                    mesh.lines(&self.ctx);
                }
            }
        }
        // Subdivided variants from an older tessellation level.
        self.meshes
            .retain_meshes(|model, segments| segments == 1 || used.contains(&(model, segments)));
        Ok(())
    }

    fn prepare_shadow_targets(&mut self, plan: &FramePlan) {
        for pass in &plan.shadow_passes {
            let cube = matches!(pass.view, ShadowView::Cube { .. });
            if let Err(e) = self.ensure_shadow_target(pass.light, pass.generation, &pass.settings, cube) {
                tracing::error!(light = %pass.light, "shadow target unavailable, light renders unshadowed: {e}");
            }
        }
    }

    /// Whether a light's shadow map was rendered this frame and may be
    /// sampled.
    fn shadow_ready(&self, light: &PlannedLight, rendered: &HashSet<LightId>, cube: bool) -> bool {
        light.shadow.is_some()
            && rendered.contains(&light.id)
            && self
                .shadows
                .get(light.id)
                .is_some_and(|m| m.is_valid() && m.is_cube() == cube)
    }

    fn surface_bind_group(&self, pipelines: &Pipelines, fallbacks: &Fallbacks) -> wgpu::BindGroup {
        let normal = resident_or(&self.textures, self.normal_map, &fallbacks.flat_normal);
        let height = resident_or(&self.textures, self.displacement_map, &fallbacks.zero_height);
        self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("surface_maps"),
            layout: &pipelines.layouts.surface,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(normal),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(height),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&fallbacks.sampler),
                },
            ],
        })
    }

    /// Sample view of a light's shadow map, or the matching stand-in.
    fn shadow_view<'a>(
        &'a self,
        fallbacks: &'a Fallbacks,
        light: Option<&PlannedLight>,
        rendered: &HashSet<LightId>,
        cube: bool,
    ) -> &'a wgpu::TextureView {
        let fallback = if cube {
            &fallbacks.depth_cube_view
        } else {
            &fallbacks.depth_2d_view
        };
        light
            .filter(|l| self.shadow_ready(l, rendered, cube))
            .and_then(|l| self.shadows.get(l.id))
            .and_then(ShadowMap::sample_view)
            .unwrap_or(fallback)
    }

    fn frame_bind_group(
        &self,
        plan: &FramePlan,
        pipelines: &Pipelines,
        fallbacks: &Fallbacks,
        frame_uniforms: &wgpu::Buffer,
        rendered: &HashSet<LightId>,
    ) -> wgpu::BindGroup {
        let lights = &plan.main.lights;
        let mut views = vec![self.shadow_view(fallbacks, lights.directional.first(), rendered, false)];
        for i in 0..2 {
            views.push(self.shadow_view(fallbacks, lights.spot.get(i), rendered, false));
        }
        for i in 0..4 {
            views.push(self.shadow_view(fallbacks, lights.point.get(i), rendered, true));
        }

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_uniforms.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&fallbacks.shadow_sampler),
            },
        ];
        for (i, view) in views.into_iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame"),
            layout: &pipelines.layouts.frame,
            entries: &entries,
        })
    }

    /// Upload per-frame uniforms and record every pass.
    fn encode(
        &mut self,
        plan: &FramePlan,
        color_view: &wgpu::TextureView,
    ) -> Result<wgpu::CommandBuffer, RenderError> {
        self.prepare_meshes(plan)?;
        self.prepare_shadow_targets(plan);

        let slots = FrameSlots::build(plan);
        {
            let pipelines = self.pipelines.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
            let objects = self.objects.as_mut().ok_or(RenderError::ProgramsNotInitialized)?;
            objects.write(&self.ctx, &pipelines.layouts.object, &slots.object_data);
            let views = self.views.as_mut().ok_or(RenderError::ProgramsNotInitialized)?;
            views.write(&self.ctx, &pipelines.layouts.view, &slots.views);
        }

        let pipelines = self.pipelines.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let fallbacks = self.fallbacks.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let frame_uniforms = self.frame_uniforms.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let objects = self.objects.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let views = self.views.as_ref().ok_or(RenderError::ProgramsNotInitialized)?;
        let depth_view = self.depth.depth_target().ok_or_else(|| RenderError::InvalidFrameBuffer {
            label: self.depth.label().to_string(),
        })?;

        let rendered: HashSet<LightId> = plan
            .shadow_passes
            .iter()
            .filter(|p| self.shadows.get(p.light).is_some_and(ShadowMap::is_valid))
            .map(|p| p.light)
            .collect();
        let main = &plan.main;
        let uniforms = FrameUniforms::new(main.projection * main.view, main.eye, &main.lights, |l| {
            let cube = main.lights.point.iter().any(|p| p.id == l.id);
            self.shadow_ready(l, &rendered, cube)
        });
        self.ctx.queue.write_buffer(frame_uniforms, 0, bytemuck::bytes_of(&uniforms));
        if let Some(sky) = &self.skybox {
            let sky_uniforms = SkyUniforms::new(main.view, main.projection);
            self.ctx.queue.write_buffer(&sky.uniforms, 0, bytemuck::bytes_of(&sky_uniforms));
        }

        let surface_group = self.surface_bind_group(pipelines, fallbacks);
        let frame_group = self.frame_bind_group(plan, pipelines, fallbacks, frame_uniforms, &rendered);

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("frame") });

        let shadow_span = tracing::debug_span!("shadow_passes", lights = plan.shadow_passes.len()).entered();
        for (pass, first_view) in plan.shadow_passes.iter().zip(&slots.pass_views) {
            let Some(map) = self.shadows.get(pass.light).filter(|m| m.is_valid()) else {
                continue;
            };
            for face in 0..pass.view.pass_count() {
                let Some(target) = map.face_target(face) else {
                    continue;
                };
                let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(map.label()),
                    color_attachments: &[],
                    depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                        view: target,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                let view_slot = first_view + face as u32;
                rp.set_bind_group(0, &views.bind_group, &[DynamicUniforms::offset(view_slot)]);
                rp.set_bind_group(2, &surface_group, &[]);
                for caster in &pass.casters {
                    let pipeline = match caster.path {
                        DrawPath::Standard => &pipelines.shadow,
                        DrawPath::Displaced { .. } => &pipelines.shadow_displaced,
                    };
                    rp.set_pipeline(pipeline);
                    self.draw_geometry(&mut rp, &slots, caster, objects);
                }
            }
        }

        drop(shadow_span);

        {
            let _main_span = tracing::debug_span!("main_pass", draws = main.draws.len()).entered();
            let c = main.clear_color;
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(c.r),
                            g: f64::from(c.g),
                            b: f64::from(c.b),
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rp.set_bind_group(0, &frame_group, &[]);
            for draw in &main.draws {
                let Some(mesh) = self.meshes.mesh(draw.model.id(), draw.path.segments()) else {
                    continue;
                };
                let Some(&slot) = slots.objects.get(&draw.object) else {
                    continue;
                };
                match draw.path {
                    DrawPath::Standard => rp.set_pipeline(&pipelines.standard),
                    DrawPath::Displaced { .. } => {
                        rp.set_pipeline(&pipelines.displaced);
                        rp.set_bind_group(3, &surface_group, &[]);
                    }
                }
                rp.set_bind_group(1, &objects.bind_group, &[DynamicUniforms::offset(slot)]);
                rp.set_vertex_buffer(0, mesh.vertices.slice(..));
                rp.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                for sub in &mesh.submeshes {
                    let Some(material) = self.meshes.material(draw.model.id(), sub.material) else {
                        continue;
                    };
                    rp.set_bind_group(2, material, &[]);
                    rp.draw_indexed(sub.indices.clone(), 0, 0..1);
                }
            }

            if plan.skybox {
                if let Some(sky) = &self.skybox {
                    rp.set_pipeline(&pipelines.skybox);
                    rp.set_bind_group(0, &sky.bind_group, &[]);
                    rp.draw(0..3, 0..1);
                }
            }

            if plan.wireframe {
                rp.set_pipeline(&pipelines.wireframe);
                rp.set_bind_group(0, &views.bind_group, &[DynamicUniforms::offset(slots.camera_view)]);
                rp.set_bind_group(2, &surface_group, &[]);
                for draw in &main.draws {
                    let Some(mesh) = self.meshes.mesh(draw.model.id(), draw.path.segments()) else {
                        continue;
                    };
                    let (Some(lines), Some(&slot)) = (mesh.line_buffer(), slots.objects.get(&draw.object)) else {
                        continue;
                    };
                    rp.set_bind_group(1, &objects.bind_group, &[DynamicUniforms::offset(slot)]);
                    rp.set_vertex_buffer(0, mesh.vertices.slice(..));
                    rp.set_index_buffer(lines.0.slice(..), wgpu::IndexFormat::Uint32);
                    rp.draw_indexed(0..lines.1, 0, 0..1);
                }
            }
        }

        Ok(encoder.finish())
    }

    fn draw_geometry(
        &self,
        rp: &mut wgpu::RenderPass<'_>,
        slots: &FrameSlots,
        draw: &DrawItem,
        objects: &DynamicUniforms,
    ) {
        let Some(mesh) = self.meshes.mesh(draw.model.id(), draw.path.segments()) else {
            return;
        };
        let Some(&slot) = slots.objects.get(&draw.object) else {
            return;
        };
        rp.set_bind_group(1, &objects.bind_group, &[DynamicUniforms::offset(slot)]);
        rp.set_vertex_buffer(0, mesh.vertices.slice(..));
        rp.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
        for sub in &mesh.submeshes {
            rp.draw_indexed(sub.indices.clone(), 0, 0..1);
        }
    }
}

impl RenderBackend for WgpuBackend {
    type Output = ();

    fn execute(&mut self, plan: &FramePlan) -> Result<(), RenderError> {
        if self.pipelines.is_none() {
            return Err(RenderError::ProgramsNotInitialized);
        }
        let (frame, view) = match &self.target {
            Target::Offscreen(color) => {
                let view = color
                    .color()
                    .map(|a| a.texture.create_view(&wgpu::TextureViewDescriptor::default()))
                    .ok_or_else(|| RenderError::InvalidFrameBuffer {
                        label: color.label().to_string(),
                    })?;
                (None, view)
            }
            Target::Surface { surface, config } => {
                let frame = match surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        tracing::debug!("surface lost or outdated, reconfiguring");
                        surface.configure(&self.ctx.device, config);
                        return Ok(());
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        return Err(RenderError::Surface("out of memory".into()));
                    }
                    Err(e) => {
                        tracing::warn!("surface error, frame skipped: {e}");
                        return Ok(());
                    }
                };
                let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
                (Some(frame), view)
            }
        };
        let commands = self.encode(plan, &view)?;
        self.ctx.queue.submit(Some(commands));
        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }
}

fn resident_or<'a>(
    textures: &'a TextureCache,
    handle: Option<TextureHandle>,
    fallback: &'a GpuTexture,
) -> &'a wgpu::TextureView {
    handle
        .and_then(|h| textures.get(h))
        .map_or(&fallback.view, |t| &t.view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::gpu;
    use glam::Vec3;
    use scenegraph_assets::{Material, primitives};
    use scenegraph_common::{CameraId, Color};
    use scenegraph_render::{FramePlanner, Registry, RenderSettings};
    use scenegraph_scene::{Camera, Light, Projection, RenderFlags, Scene, SceneObject};
    use std::sync::Arc;

    const RED: Color = Color::rgb(1.0, 0.0, 0.0);

    fn backend(width: u32, height: u32) -> Option<WgpuBackend> {
        let ctx = gpu()?;
        let mut backend = WgpuBackend::offscreen(ctx, width, height).unwrap();
        backend.init_programs().unwrap();
        Some(backend)
    }

    fn camera(scene: &mut Scene) -> CameraId {
        let camera = scene.spawn_camera(Camera::perspective(1.0, 1.0, 0.1, 100.0));
        let node = scene.camera_node(camera).unwrap();
        scene.set_global_position(node, Vec3::new(0.0, 2.0, 5.0)).unwrap();
        scene.look_at_global(node, Vec3::ZERO).unwrap();
        camera
    }

    fn plan(scene: &Scene, registry: &Registry, camera: CameraId) -> FramePlan {
        let mut settings = RenderSettings::default();
        settings.clear_color = RED;
        FramePlanner::new()
            .plan(scene, registry, &settings, Some(camera), None)
            .unwrap()
    }

    #[test]
    fn clear_color_reaches_target() {
        let Some(mut backend) = backend(8, 8) else { return };
        let mut scene = Scene::new();
        let cam = camera(&mut scene);
        backend.execute(&plan(&scene, &Registry::new(), cam)).unwrap();
        let image = backend.capture().unwrap();
        assert_eq!((image.width, image.height), (8, 8));
        assert_eq!(&image.rgba[..4], &[255, 0, 0, 255]);
        backend.release_all();
    }

    #[test]
    fn execute_without_programs_fails() {
        let Some(ctx) = gpu() else { return };
        let mut backend = WgpuBackend::offscreen(ctx, 8, 8).unwrap();
        let mut scene = Scene::new();
        let cam = camera(&mut scene);
        let result = backend.execute(&plan(&scene, &Registry::new(), cam));
        assert!(matches!(result, Err(RenderError::ProgramsNotInitialized)));
        backend.release_all();
    }

    #[test]
    fn shadowed_scene_draws_geometry() {
        let Some(mut backend) = backend(32, 32) else { return };
        let mut scene = Scene::new();
        let mut registry = Registry::new();
        let cube = Arc::new(primitives::cuboid(Vec3::ONE, Material::default()).unwrap());
        let floor = Arc::new(primitives::plane(5.0, Material::default()).unwrap());
        registry.add_object(scene.spawn(SceneObject::new("crate").with_model(cube).with_flags(RenderFlags::solid())));
        let mut ground = SceneObject::new("floor").with_model(floor).with_flags(RenderFlags::solid());
        ground.set_patches(2);
        let ground = scene.spawn(ground);
        scene.set_global_position(ground, Vec3::new(0.0, -0.5, 0.0)).unwrap();
        registry.add_object(ground);

        let lamp = scene.spawn_light(Light::point(20.0).with_shadow(ShadowSettings::cube(64, 0.05, 20.0)));
        scene.set_global_position(scene.light_node(lamp).unwrap(), Vec3::new(1.0, 3.0, 1.0)).unwrap();
        registry.add_light(lamp);
        let spot = scene.spawn_light(
            Light::spot(Projection::Perspective {
                fov_y: 1.0,
                aspect: 1.0,
                near: 0.1,
                far: 30.0,
            })
            .with_shadow(ShadowSettings::new(64, 64, 0.1, 30.0)),
        );
        let spot_node = scene.light_node(spot).unwrap();
        scene.set_global_position(spot_node, Vec3::new(0.0, 6.0, 0.1)).unwrap();
        scene.look_at_global(spot_node, Vec3::ZERO).unwrap();
        registry.add_light(spot);

        let cam = camera(&mut scene);
        let frame = plan(&scene, &registry, cam);
        assert_eq!(frame.shadow_passes.len(), 2);
        backend.execute(&frame).unwrap();

        assert!(backend.has_shadow_target(lamp));
        assert!(backend.has_shadow_target(spot));
        assert_eq!(backend.mesh_count(), 2);
        let image = backend.capture().unwrap();
        let center = ((16 * 32 + 16) * 4) as usize;
        assert_ne!(&image.rgba[center..center + 3], &[255, 0, 0]);

        assert!(backend.release_shadow(lamp));
        assert!(!backend.has_shadow_target(lamp));
        backend.release_all();
    }

    #[test]
    fn invalid_shadow_target_is_reported() {
        let Some(mut backend) = backend(8, 8) else { return };
        let light = LightId::new();
        let result = backend.ensure_shadow_target(light, 1, &ShadowSettings::new(0, 0, 0.1, 10.0), false);
        assert!(matches!(result, Err(RenderError::InvalidFrameBuffer { .. })));
        assert!(!backend.has_shadow_target(light));
        backend.release_all();
    }

    #[test]
    fn resize_recreates_targets() {
        let Some(mut backend) = backend(8, 8) else { return };
        assert!(!backend.resize(0, 10).unwrap());
        assert_eq!(backend.size(), (8, 8));
        assert!(backend.resize(32, 16).unwrap());
        let image = backend.capture().unwrap();
        assert_eq!((image.width, image.height), (32, 16));
        backend.release_all();
    }

    #[test]
    fn missing_skybox_faces_keep_previous_state() {
        let Some(mut backend) = backend(8, 8) else { return };
        let paths: [PathBuf; 6] = std::array::from_fn(|i| PathBuf::from(format!("missing_{i}.png")));
        assert!(backend.set_skybox(&paths).is_err());
        assert!(!backend.has_skybox());
        assert!(backend.set_normal_map(Path::new("missing_normal.png")).is_err());
        backend.release_all();
    }
}
