//! Device-resident geometry and material bind groups, cached per model.

use crate::texture::{GpuTexture, TextureCache};
use crate::uniforms::{GpuVertex, MaterialUniforms};
use crate::GpuContext;
use scenegraph_assets::{Material, Model, TextureHandle};
use scenegraph_common::ModelId;
use scenegraph_render::{build_geometry, wireframe};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Weak};
use wgpu::util::DeviceExt;

/// A draw range bound to one material bind group.
#[derive(Debug, Clone)]
pub struct GpuSubMesh {
    pub indices: Range<u32>,
    /// Index into the model's material bindings; the last one is the
    /// default material.
    pub material: usize,
}

#[derive(Debug)]
pub struct GpuMesh {
    pub vertices: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub submeshes: Vec<GpuSubMesh>,
    /// Line-list indices for the wireframe overlay, built on first request.
    lines: Option<(wgpu::Buffer, u32)>,
    triangle_indices: Vec<u32>,
}

impl GpuMesh {
    fn upload(ctx: &GpuContext, model: &Model, segments: u32) -> Self {
        let geometry = build_geometry(model, segments);
        let vertices: Vec<GpuVertex> = geometry.vertices.iter().map(GpuVertex::from).collect();
        let label = format!("mesh {} x{segments}", model.id());
        let vertex_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&label),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&label),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let default_material = model.materials().len();
        let submeshes = geometry
            .submeshes
            .iter()
            .map(|s| GpuSubMesh {
                indices: s.indices.clone(),
                material: s.material.unwrap_or(default_material),
            })
            .collect();
        tracing::debug!(
            model = %model.id(),
            segments,
            triangles = geometry.triangle_count(),
            "mesh uploaded"
        );
        Self {
            vertices: vertex_buffer,
            indices: index_buffer,
            submeshes,
            lines: None,
            triangle_indices: geometry.indices,
        }
    }

    /// Line-list index buffer and its index count.
    pub fn lines(&mut self, ctx: &GpuContext) -> (&wgpu::Buffer, u32) {
        let triangles = &self.triangle_indices;
        let (buffer, count) = self.lines.get_or_insert_with(|| {
            let edges = wireframe::edge_list(triangles);
            let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("wireframe"),
                contents: bytemuck::cast_slice(&edges),
                usage: wgpu::BufferUsages::INDEX,
            });
            (buffer, edges.len() as u32)
        });
        (&*buffer, *count)
    }

    /// The wireframe buffer if [`GpuMesh::lines`] built it already.
    pub fn line_buffer(&self) -> Option<(&wgpu::Buffer, u32)> {
        self.lines.as_ref().map(|(buffer, count)| (buffer, *count))
    }

    pub fn has_lines(&self) -> bool {
        self.lines.is_some()
    }

    fn release(self) {
        self.vertices.destroy();
        self.indices.destroy();
        if let Some((lines, _)) = self.lines {
            lines.destroy();
        }
    }
}

#[derive(Debug)]
struct MaterialBinding {
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    texture: Option<TextureHandle>,
}

/// Geometry keyed by `(model, segments)` and material bind groups keyed by
/// model. Subdivided variants of one model share its materials.
///
/// Entries live as long as their model: once every `Arc<Model>` is gone,
/// [`MeshCache::evict_dropped`] frees them.
#[derive(Debug, Default)]
pub struct MeshCache {
    meshes: HashMap<(ModelId, u32), GpuMesh>,
    materials: HashMap<ModelId, Vec<MaterialBinding>>,
    owners: HashMap<ModelId, Weak<Model>>,
}

impl MeshCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload the model at `segments` and its materials if not resident.
    pub fn prepare(
        &mut self,
        ctx: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        textures: &mut TextureCache,
        fallback: &MaterialDefaults<'_>,
        model: &Arc<Model>,
        segments: u32,
    ) {
        self.owners
            .entry(model.id())
            .or_insert_with(|| Arc::downgrade(model));
        self.meshes
            .entry((model.id(), segments))
            .or_insert_with(|| GpuMesh::upload(ctx, model, segments));
        if !self.materials.contains_key(&model.id()) {
            let mut bindings: Vec<MaterialBinding> = model
                .materials()
                .iter()
                .map(|m| material_binding(ctx, layout, textures, fallback, m))
                .collect();
            bindings.push(material_binding(ctx, layout, textures, fallback, &Material::default()));
            self.materials.insert(model.id(), bindings);
        }
    }

    pub fn mesh(&self, model: ModelId, segments: u32) -> Option<&GpuMesh> {
        self.meshes.get(&(model, segments))
    }

    pub fn mesh_mut(&mut self, model: ModelId, segments: u32) -> Option<&mut GpuMesh> {
        self.meshes.get_mut(&(model, segments))
    }

    /// Bind group of a material slot, falling back to the default material.
    pub fn material(&self, model: ModelId, index: usize) -> Option<&wgpu::BindGroup> {
        let bindings = self.materials.get(&model)?;
        bindings
            .get(index)
            .or_else(|| bindings.last())
            .map(|b| &b.bind_group)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Drop subdivided variants no longer in use, e.g. after the
    /// tessellation level changed.
    pub fn retain_meshes(&mut self, mut keep: impl FnMut(ModelId, u32) -> bool) {
        let stale: Vec<(ModelId, u32)> = self
            .meshes
            .keys()
            .filter(|(model, segments)| !keep(*model, *segments))
            .copied()
            .collect();
        for key in stale {
            if let Some(mesh) = self.meshes.remove(&key) {
                mesh.release();
            }
        }
    }

    /// Free every entry whose model was dropped. Returns the textures the
    /// freed materials referenced, for the caller to release if nothing else
    /// uses them.
    pub fn evict_dropped(&mut self) -> Vec<TextureHandle> {
        let dropped: Vec<ModelId> = self
            .owners
            .iter()
            .filter(|(_, owner)| owner.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        if dropped.is_empty() {
            return Vec::new();
        }
        self.retain_meshes(|model, _| !dropped.contains(&model));
        let mut orphaned = Vec::new();
        for id in &dropped {
            self.owners.remove(id);
            for binding in self.materials.remove(id).into_iter().flatten() {
                binding.uniforms.destroy();
                if let Some(handle) = binding.texture {
                    if !orphaned.contains(&handle) {
                        orphaned.push(handle);
                    }
                }
            }
        }
        tracing::debug!(models = dropped.len(), "evicted meshes of dropped models");
        orphaned
    }

    /// Whether any cached material samples `handle`.
    pub fn uses_texture(&self, handle: TextureHandle) -> bool {
        self.materials
            .values()
            .flatten()
            .any(|binding| binding.texture == Some(handle))
    }

    /// Number of models with resident materials.
    pub fn model_count(&self) -> usize {
        self.materials.len()
    }

    pub fn release_all(&mut self) {
        for (_, mesh) in self.meshes.drain() {
            mesh.release();
        }
        for (_, bindings) in self.materials.drain() {
            for binding in bindings {
                binding.uniforms.destroy();
            }
        }
        self.owners.clear();
    }
}

/// Textures and sampler used when a material has no diffuse map.
#[derive(Debug)]
pub struct MaterialDefaults<'a> {
    pub white: &'a GpuTexture,
    pub sampler: &'a wgpu::Sampler,
}

fn material_binding(
    ctx: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    textures: &mut TextureCache,
    fallback: &MaterialDefaults<'_>,
    material: &Material,
) -> MaterialBinding {
    let texture = textures.handle_for(ctx, &material.map_kd, true);
    let diffuse = texture.and_then(|h| textures.get(h));
    let uniforms = MaterialUniforms::new(material, diffuse.is_some());
    let view = diffuse.map_or(&fallback.white.view, |t| &t.view);
    let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&material.name),
        contents: bytemuck::bytes_of(&uniforms),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&material.name),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(fallback.sampler),
            },
        ],
    });
    MaterialBinding {
        uniforms: buffer,
        bind_group,
        texture,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::gpu;
    use crate::pipelines::Layouts;
    use glam::Vec3;
    use scenegraph_assets::{TextureRef, primitives};

    #[test]
    fn caches_per_model_and_segments() {
        let Some(ctx) = gpu() else { return };
        let layouts = Layouts::new(&ctx.device);
        let mut textures = TextureCache::new();
        let white = GpuTexture::solid(&ctx, "white", [255; 4], true);
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor::default());
        let defaults = MaterialDefaults {
            white: &white,
            sampler: &sampler,
        };
        let model = Arc::new(primitives::cuboid(Vec3::ONE, Material::default()).unwrap());
        let mut cache = MeshCache::new();

        cache.prepare(&ctx, &layouts.material, &mut textures, &defaults, &model, 1);
        cache.prepare(&ctx, &layouts.material, &mut textures, &defaults, &model, 1);
        assert_eq!(cache.len(), 1);
        cache.prepare(&ctx, &layouts.material, &mut textures, &defaults, &model, 4);
        assert_eq!(cache.len(), 2);
        assert!(cache.material(model.id(), 0).is_some());
        assert!(cache.material(model.id(), 99).is_some());

        let mesh = cache.mesh_mut(model.id(), 4).unwrap();
        assert!(!mesh.has_lines());
        let (_, count) = mesh.lines(&ctx);
        assert_eq!(count % 2, 0);
        assert!(count > 0);

        cache.retain_meshes(|_, segments| segments == 1);
        assert_eq!(cache.len(), 1);
        cache.release_all();
        assert!(cache.is_empty());
        white.release();
    }

    #[test]
    fn replaced_models_do_not_accumulate() {
        let Some(ctx) = gpu() else { return };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bark.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([90, 60, 30, 255]))
            .save(&path)
            .unwrap();
        let layouts = Layouts::new(&ctx.device);
        let mut textures = TextureCache::new();
        let white = GpuTexture::solid(&ctx, "white", [255; 4], true);
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor::default());
        let defaults = MaterialDefaults {
            white: &white,
            sampler: &sampler,
        };
        let bark = Material {
            map_kd: TextureRef::Source(path),
            ..Material::default()
        };
        let mut cache = MeshCache::new();

        let mut model = Arc::new(primitives::cuboid(Vec3::ONE, bark.clone()).unwrap());
        for _ in 0..5 {
            cache.prepare(&ctx, &layouts.material, &mut textures, &defaults, &model, 1);
            cache.prepare(&ctx, &layouts.material, &mut textures, &defaults, &model, 3);
            // Swap in a fresh copy, as reloading an object's model does.
            model = Arc::new(primitives::cuboid(Vec3::ONE, bark.clone()).unwrap());
            for handle in cache.evict_dropped() {
                if !cache.uses_texture(handle) {
                    textures.release(handle);
                }
            }
            assert!(cache.is_empty());
            assert_eq!(cache.model_count(), 0);
            assert!(textures.is_empty());
        }

        cache.prepare(&ctx, &layouts.material, &mut textures, &defaults, &model, 1);
        assert!(cache.evict_dropped().is_empty());
        assert_eq!(cache.len(), 1);
        assert_eq!(textures.len(), 1);
        cache.release_all();
        textures.release_all();
        white.release();
    }
}
