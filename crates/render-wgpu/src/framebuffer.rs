//! Off-screen render targets.
//!
//! Validity is decided once, at creation, and cached. GPU memory is only
//! given back by an explicit [`FrameBuffer::release`]; dropping a buffer that
//! still holds textures logs a warning and leaves them to wgpu.

use crate::GpuContext;
use scenegraph_render::GpuResource;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Which attachments a framebuffer owns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameBufferOptions {
    /// Sampleable color texture.
    pub color: bool,
    /// Sampleable depth texture, i.e. a shadow map.
    pub depth_map: bool,
    /// Depth attachment used only for depth testing.
    pub depth_buffer: bool,
}

impl FrameBufferOptions {
    pub fn shadow_map() -> Self {
        Self {
            depth_map: true,
            ..Self::default()
        }
    }

    pub fn depth_only() -> Self {
        Self {
            depth_buffer: true,
            ..Self::default()
        }
    }

    pub fn color_and_depth() -> Self {
        Self {
            color: true,
            depth_buffer: true,
            ..Self::default()
        }
    }
}

/// A texture together with the default view over it.
#[derive(Debug)]
pub struct Attachment {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

fn extent_ok(ctx: &GpuContext, label: &str, width: u32, height: u32) -> bool {
    if width == 0 || height == 0 {
        tracing::error!(label, width, height, "framebuffer has a zero extent");
        return false;
    }
    let max = ctx.limits().max_texture_dimension_2d;
    if width > max || height > max {
        tracing::error!(label, width, height, max, "framebuffer exceeds the device limit");
        return false;
    }
    true
}

/// A 2D render target.
#[derive(Debug)]
pub struct FrameBuffer {
    label: String,
    width: u32,
    height: u32,
    valid: bool,
    color: Option<Attachment>,
    depth_map: Option<Attachment>,
    depth_buffer: Option<Attachment>,
}

impl FrameBuffer {
    /// Create the requested attachments. Never fails; check
    /// [`FrameBuffer::is_valid`] before use.
    pub fn new(
        ctx: &GpuContext,
        label: &str,
        width: u32,
        height: u32,
        options: FrameBufferOptions,
    ) -> Self {
        let mut fb = Self {
            label: label.to_string(),
            width,
            height,
            valid: false,
            color: None,
            depth_map: None,
            depth_buffer: None,
        };
        if !extent_ok(ctx, label, width, height) {
            return fb;
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let make = |device: &wgpu::Device,
                    suffix: &str,
                    format: wgpu::TextureFormat,
                    usage: wgpu::TextureUsages| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{label}_{suffix}")),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Attachment { texture, view }
        };

        let (attachments, error) = ctx.validated(|device| {
            let sampled = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
            (
                options
                    .color
                    .then(|| make(device, "color", COLOR_FORMAT, sampled | wgpu::TextureUsages::COPY_SRC)),
                options
                    .depth_map
                    .then(|| make(device, "depth_map", DEPTH_FORMAT, sampled)),
                options.depth_buffer.then(|| {
                    make(device, "depth_buffer", DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT)
                }),
            )
        });
        (fb.color, fb.depth_map, fb.depth_buffer) = attachments;
        fb.valid = match error {
            Some(e) => {
                tracing::error!(label, "framebuffer incomplete: {e}");
                false
            }
            None => true,
        };
        if fb.valid {
            tracing::debug!(label, width, height, ?options, "framebuffer created");
        }
        fb
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn color(&self) -> Option<&Attachment> {
        self.color.as_ref()
    }

    pub fn depth_map(&self) -> Option<&Attachment> {
        self.depth_map.as_ref()
    }

    pub fn depth_buffer(&self) -> Option<&Attachment> {
        self.depth_buffer.as_ref()
    }

    /// The depth attachment to render into: the depth map if there is one,
    /// else the depth buffer.
    pub fn depth_target(&self) -> Option<&wgpu::TextureView> {
        self.depth_map
            .as_ref()
            .or(self.depth_buffer.as_ref())
            .map(|a| &a.view)
    }

    pub fn holds_resources(&self) -> bool {
        self.color.is_some() || self.depth_map.is_some() || self.depth_buffer.is_some()
    }

    /// Destroy every attachment. The buffer is invalid afterwards.
    pub fn release(&mut self) {
        for a in [self.color.take(), self.depth_map.take(), self.depth_buffer.take()]
            .into_iter()
            .flatten()
        {
            a.texture.destroy();
        }
        self.valid = false;
    }
}

impl GpuResource for FrameBuffer {
    fn release(&mut self) {
        FrameBuffer::release(self);
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        if self.holds_resources() {
            tracing::warn!(label = %self.label, "framebuffer dropped without release");
        }
    }
}

/// A six-face cube render target for omnidirectional shadows.
#[derive(Debug)]
pub struct FrameBufferCube {
    label: String,
    size: u32,
    valid: bool,
    color: Option<wgpu::Texture>,
    depth_map: Option<wgpu::Texture>,
    depth_buffer: Option<Attachment>,
    /// One 2D view per face, in +X, -X, +Y, -Y, +Z, -Z order; depth faces
    /// when there is a depth map, color faces otherwise.
    face_views: Vec<wgpu::TextureView>,
    cube_view: Option<wgpu::TextureView>,
}

impl FrameBufferCube {
    pub fn new(ctx: &GpuContext, label: &str, size: u32, options: FrameBufferOptions) -> Self {
        let mut fb = Self {
            label: label.to_string(),
            size,
            valid: false,
            color: None,
            depth_map: None,
            depth_buffer: None,
            face_views: Vec::new(),
            cube_view: None,
        };
        if !extent_ok(ctx, label, size, size) {
            return fb;
        }

        let cube = |device: &wgpu::Device,
                    suffix: &str,
                    format: wgpu::TextureFormat,
                    usage: wgpu::TextureUsages| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{label}_{suffix}")),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };

        let (parts, error) = ctx.validated(|device| {
            let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
            let color = options.color.then(|| cube(device, "color", COLOR_FORMAT, usage));
            let depth_map = options.depth_map.then(|| cube(device, "depth_map", DEPTH_FORMAT, usage));
            let depth_buffer = options.depth_buffer.then(|| {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("{label}_depth_buffer")),
                    size: wgpu::Extent3d {
                        width: size,
                        height: size,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Attachment { texture, view }
            });
            let faces_of = depth_map.as_ref().or(color.as_ref());
            let face_views = faces_of
                .map(|t| {
                    (0..6)
                        .map(|layer| {
                            t.create_view(&wgpu::TextureViewDescriptor {
                                label: Some("cube_face"),
                                dimension: Some(wgpu::TextureViewDimension::D2),
                                base_array_layer: layer,
                                array_layer_count: Some(1),
                                ..Default::default()
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            let cube_view = faces_of.map(|t| {
                t.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("cube_view"),
                    dimension: Some(wgpu::TextureViewDimension::Cube),
                    ..Default::default()
                })
            });
            (color, depth_map, depth_buffer, face_views, cube_view)
        });
        (fb.color, fb.depth_map, fb.depth_buffer, fb.face_views, fb.cube_view) = parts;
        fb.valid = match error {
            Some(e) => {
                tracing::error!(label, "cube framebuffer incomplete: {e}");
                false
            }
            None => true,
        };
        fb
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn face_view(&self, face: usize) -> Option<&wgpu::TextureView> {
        self.face_views.get(face)
    }

    /// Whole-cube view for sampling.
    pub fn cube_view(&self) -> Option<&wgpu::TextureView> {
        self.cube_view.as_ref()
    }

    pub fn has_depth_map(&self) -> bool {
        self.depth_map.is_some()
    }

    pub fn depth_buffer(&self) -> Option<&Attachment> {
        self.depth_buffer.as_ref()
    }

    pub fn holds_resources(&self) -> bool {
        self.color.is_some() || self.depth_map.is_some() || self.depth_buffer.is_some()
    }

    pub fn release(&mut self) {
        self.face_views.clear();
        self.cube_view = None;
        for t in [self.color.take(), self.depth_map.take()].into_iter().flatten() {
            t.destroy();
        }
        if let Some(a) = self.depth_buffer.take() {
            a.texture.destroy();
        }
        self.valid = false;
    }
}

impl GpuResource for FrameBufferCube {
    fn release(&mut self) {
        FrameBufferCube::release(self);
    }
}

impl Drop for FrameBufferCube {
    fn drop(&mut self) {
        if self.holds_resources() {
            tracing::warn!(label = %self.label, "cube framebuffer dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::gpu;

    #[test]
    fn zero_extent_is_invalid() {
        let Some(ctx) = gpu() else { return };
        let mut fb = FrameBuffer::new(&ctx, "zero", 0, 512, FrameBufferOptions::shadow_map());
        assert!(!fb.is_valid());
        assert!(!fb.holds_resources());
        fb.release();

        let cube = FrameBufferCube::new(&ctx, "zero_cube", 0, FrameBufferOptions::shadow_map());
        assert!(!cube.is_valid());
        assert!(cube.cube_view().is_none());
    }

    #[test]
    fn oversized_extent_is_invalid() {
        let Some(ctx) = gpu() else { return };
        let too_big = ctx.limits().max_texture_dimension_2d + 1;
        let fb = FrameBuffer::new(&ctx, "huge", too_big, 4, FrameBufferOptions::depth_only());
        assert!(!fb.is_valid());
    }

    #[test]
    fn shadow_map_is_valid_and_released() {
        let Some(ctx) = gpu() else { return };
        let mut fb = FrameBuffer::new(&ctx, "shadow", 256, 256, FrameBufferOptions::shadow_map());
        assert!(fb.is_valid());
        assert!(fb.depth_map().is_some());
        assert!(fb.color().is_none());
        assert!(fb.depth_target().is_some());
        fb.release();
        assert!(!fb.is_valid());
        assert!(!fb.holds_resources());
    }

    #[test]
    fn cube_has_six_faces() {
        let Some(ctx) = gpu() else { return };
        let mut cube = FrameBufferCube::new(&ctx, "point", 64, FrameBufferOptions::shadow_map());
        assert!(cube.is_valid());
        assert!((0..6).all(|f| cube.face_view(f).is_some()));
        assert!(cube.face_view(6).is_none());
        assert!(cube.cube_view().is_some());
        cube.release();
    }

    #[test]
    fn two_targets_of_equal_size_are_distinct() {
        let Some(ctx) = gpu() else { return };
        let mut a = FrameBufferCube::new(&ctx, "lamp_a", 512, FrameBufferOptions::shadow_map());
        let mut b = FrameBufferCube::new(&ctx, "lamp_b", 512, FrameBufferOptions::shadow_map());
        assert!(a.is_valid() && b.is_valid());
        a.release();
        assert!(!a.is_valid());
        assert!(b.is_valid());
        assert!(b.cube_view().is_some());
        b.release();
    }
}
