//! Sampled textures and the path-keyed upload cache.

use crate::GpuContext;
use scenegraph_assets::{AssetError, CubeFaces, ImageData, TextureHandle, TextureRef};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A sampled 2D or cube texture.
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl GpuTexture {
    /// Upload RGBA8 pixels. `srgb` selects the color-space of the format.
    pub fn from_image(ctx: &GpuContext, label: &str, image: &ImageData, srgb: bool) -> Self {
        let format = if srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let size = wgpu::Extent3d {
            width: image.width.max(1),
            height: image.height.max(1),
            depth_or_array_layers: 1,
        };
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_layer(ctx, &texture, image, 0);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    /// 1x1 texture of a single color.
    pub fn solid(ctx: &GpuContext, label: &str, rgba: [u8; 4], srgb: bool) -> Self {
        Self::from_image(ctx, label, &ImageData::solid(1, 1, rgba), srgb)
    }

    /// Six equally sized square faces as a cube texture.
    pub fn cube(ctx: &GpuContext, label: &str, faces: &CubeFaces) -> Self {
        let size = faces.size().max(1);
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (layer, face) in faces.faces.iter().enumerate() {
            write_layer(ctx, &texture, face, layer as u32);
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Self { texture, view }
    }

    pub fn release(self) {
        self.texture.destroy();
    }
}

fn write_layer(ctx: &GpuContext, texture: &wgpu::Texture, image: &ImageData, layer: u32) {
    if image.width == 0 || image.height == 0 {
        return;
    }
    ctx.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: 0,
                y: 0,
                z: layer,
            },
            aspect: wgpu::TextureAspect::All,
        },
        &image.rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(image.bytes_per_row()),
            rows_per_image: Some(image.height),
        },
        wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        },
    );
}

/// Uploads each source path once and hands out stable handles.
///
/// A path that failed to load is remembered and never retried; draws using
/// it fall back to the default texture.
#[derive(Debug, Default)]
pub struct TextureCache {
    by_path: HashMap<PathBuf, Option<TextureHandle>>,
    textures: HashMap<TextureHandle, GpuTexture>,
    next: u64,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `path`, uploading it on first use.
    pub fn load(&mut self, ctx: &GpuContext, path: &Path, srgb: bool) -> Option<TextureHandle> {
        if let Some(known) = self.by_path.get(path) {
            return *known;
        }
        let handle = match ImageData::load(path) {
            Ok(image) => {
                let label = path.display().to_string();
                let handle = self.insert(GpuTexture::from_image(ctx, &label, &image, srgb));
                tracing::debug!(path = %path.display(), handle = handle.0, "texture uploaded");
                Some(handle)
            }
            Err(e) => {
                tracing::error!("{e}");
                None
            }
        };
        self.by_path.insert(path.to_path_buf(), handle);
        handle
    }

    /// Load a texture that must exist, reporting the failure to the caller.
    pub fn load_required(
        &mut self,
        ctx: &GpuContext,
        path: &Path,
        srgb: bool,
    ) -> Result<TextureHandle, AssetError> {
        if let Some(Some(handle)) = self.by_path.get(path) {
            return Ok(*handle);
        }
        let image = ImageData::load(path)?;
        let handle = self.insert(GpuTexture::from_image(ctx, &path.display().to_string(), &image, srgb));
        self.by_path.insert(path.to_path_buf(), Some(handle));
        Ok(handle)
    }

    /// Handle of a material texture slot, uploading a source on first use.
    pub fn handle_for(&mut self, ctx: &GpuContext, slot: &TextureRef, srgb: bool) -> Option<TextureHandle> {
        let handle = match slot {
            TextureRef::None => None,
            TextureRef::Source(path) => self.load(ctx, path, srgb),
            TextureRef::Resident(handle) => Some(*handle),
        }?;
        self.textures.contains_key(&handle).then_some(handle)
    }

    /// Resolve a material texture slot to a resident texture.
    pub fn resolve(&mut self, ctx: &GpuContext, slot: &TextureRef, srgb: bool) -> Option<&GpuTexture> {
        let handle = self.handle_for(ctx, slot, srgb)?;
        self.textures.get(&handle)
    }

    /// Destroy one texture. Its source path may be loaded again later.
    pub fn release(&mut self, handle: TextureHandle) -> bool {
        let Some(texture) = self.textures.remove(&handle) else {
            return false;
        };
        texture.release();
        self.by_path.retain(|_, known| *known != Some(handle));
        true
    }

    pub fn insert(&mut self, texture: GpuTexture) -> TextureHandle {
        self.next += 1;
        let handle = TextureHandle(self.next);
        self.textures.insert(handle, texture);
        handle
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&GpuTexture> {
        self.textures.get(&handle)
    }

    /// Whether `path` was tried before, successfully or not.
    pub fn attempted(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Destroy every uploaded texture.
    pub fn release_all(&mut self) {
        for (_, texture) in self.textures.drain() {
            texture.release();
        }
        self.by_path.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::gpu;

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbaImage::from_pixel(4, 2, image::Rgba([200, 10, 10, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn uploads_once_per_path() {
        let Some(ctx) = gpu() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "brick.png");
        let mut cache = TextureCache::new();
        let a = cache.load(&ctx, &path, true).unwrap();
        let b = cache.load(&ctx, &path, true).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        cache.release_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn failures_are_remembered() {
        let Some(ctx) = gpu() else { return };
        let mut cache = TextureCache::new();
        let missing = Path::new("does/not/exist.png");
        assert!(cache.load(&ctx, missing, true).is_none());
        assert!(cache.attempted(missing));
        assert!(cache.load(&ctx, missing, true).is_none());
        assert!(cache.is_empty());
        assert!(cache.load_required(&ctx, missing, true).is_err());
    }

    #[test]
    fn resolves_material_slots() {
        let Some(ctx) = gpu() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "kd.png");
        let mut cache = TextureCache::new();
        assert!(cache.resolve(&ctx, &TextureRef::None, true).is_none());
        assert!(cache.resolve(&ctx, &TextureRef::Source(path.clone()), true).is_some());
        let handle = cache.load(&ctx, &path, true).unwrap();
        assert!(cache.resolve(&ctx, &TextureRef::Resident(handle), true).is_some());
        cache.release_all();
    }

    #[test]
    fn released_path_uploads_again() {
        let Some(ctx) = gpu() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "moss.png");
        let mut cache = TextureCache::new();
        let first = cache.load(&ctx, &path, true).unwrap();
        assert!(cache.release(first));
        assert!(!cache.release(first));
        assert!(cache.is_empty());
        assert!(!cache.attempted(&path));
        let second = cache.load(&ctx, &path, true).unwrap();
        assert_ne!(first, second);
        assert_eq!(cache.len(), 1);
        cache.release_all();
    }

    #[test]
    fn cube_texture_from_faces() {
        let Some(ctx) = gpu() else { return };
        let faces = CubeFaces::from_faces(std::array::from_fn(|_| ImageData::solid(8, 8, [0, 0, 255, 255]))).unwrap();
        let tex = GpuTexture::cube(&ctx, "sky", &faces);
        assert_eq!(tex.texture.depth_or_array_layers(), 6);
        tex.release();
    }
}
