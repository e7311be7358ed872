//! Bind group layouts and every render pipeline the passes use.

use crate::framebuffer::DEPTH_FORMAT;
use crate::shaders::{GEOMETRY_SHADER, SCENE_SHADER, SKYBOX_SHADER};
use crate::uniforms::{
    FrameUniforms, GpuVertex, MaterialUniforms, ObjectUniforms, ShadowViewUniforms, SkyUniforms,
};
use crate::GpuContext;
use scenegraph_render::RenderError;
use std::num::NonZeroU64;

/// Bind group layouts shared between pipelines.
#[derive(Debug)]
pub struct Layouts {
    /// Frame uniforms, comparison sampler and the shadow maps.
    pub frame: wgpu::BindGroupLayout,
    /// One dynamic-offset object uniform.
    pub object: wgpu::BindGroupLayout,
    /// Material uniform, diffuse texture and sampler.
    pub material: wgpu::BindGroupLayout,
    /// Normal map, displacement map and sampler.
    pub surface: wgpu::BindGroupLayout,
    /// One dynamic-offset view-projection.
    pub view: wgpu::BindGroupLayout,
    pub skybox: wgpu::BindGroupLayout,
}

fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    dynamic: bool,
    size: usize,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

fn texture_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    sample_type: wgpu::TextureSampleType,
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    kind: wgpu::SamplerBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(kind),
        count: None,
    }
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        use wgpu::ShaderStages as S;
        use wgpu::TextureSampleType as T;
        use wgpu::TextureViewDimension as D;
        let both = S::VERTEX | S::FRAGMENT;
        let color = T::Float { filterable: true };

        let mut frame_entries = vec![
            uniform_entry(0, both, false, std::mem::size_of::<FrameUniforms>()),
            sampler_entry(1, S::FRAGMENT, wgpu::SamplerBindingType::Comparison),
        ];
        for binding in 2..=4 {
            frame_entries.push(texture_entry(binding, S::FRAGMENT, T::Depth, D::D2));
        }
        for binding in 5..=8 {
            frame_entries.push(texture_entry(binding, S::FRAGMENT, T::Depth, D::Cube));
        }

        let layout = |label: &str, entries: &[wgpu::BindGroupLayoutEntry]| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            })
        };

        Self {
            frame: layout("frame_layout", &frame_entries),
            object: layout(
                "object_layout",
                &[uniform_entry(0, both, true, std::mem::size_of::<ObjectUniforms>())],
            ),
            material: layout(
                "material_layout",
                &[
                    uniform_entry(0, S::FRAGMENT, false, std::mem::size_of::<MaterialUniforms>()),
                    texture_entry(1, S::FRAGMENT, color, D::D2),
                    sampler_entry(2, S::FRAGMENT, wgpu::SamplerBindingType::Filtering),
                ],
            ),
            surface: layout(
                "surface_layout",
                &[
                    texture_entry(0, both, color, D::D2),
                    texture_entry(1, both, color, D::D2),
                    sampler_entry(2, both, wgpu::SamplerBindingType::Filtering),
                ],
            ),
            view: layout(
                "view_layout",
                &[uniform_entry(0, S::VERTEX, true, std::mem::size_of::<ShadowViewUniforms>())],
            ),
            skybox: layout(
                "skybox_layout",
                &[
                    uniform_entry(0, S::FRAGMENT, false, std::mem::size_of::<SkyUniforms>()),
                    texture_entry(1, S::FRAGMENT, color, D::Cube),
                    sampler_entry(2, S::FRAGMENT, wgpu::SamplerBindingType::Filtering),
                ],
            ),
        }
    }
}

/// All pipelines of a frame.
#[derive(Debug)]
pub struct Pipelines {
    pub layouts: Layouts,
    pub standard: wgpu::RenderPipeline,
    pub displaced: wgpu::RenderPipeline,
    pub shadow: wgpu::RenderPipeline,
    pub shadow_displaced: wgpu::RenderPipeline,
    pub skybox: wgpu::RenderPipeline,
    pub wireframe: wgpu::RenderPipeline,
}

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<GpuVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

fn depth_state(write: bool, compare: wgpu::CompareFunction, bias: wgpu::DepthBiasState) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias,
    }
}

struct PipelineDesc<'a> {
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    module: &'a wgpu::ShaderModule,
    vs: &'a str,
    fs: Option<&'a str>,
    vertex_input: bool,
    topology: wgpu::PrimitiveTopology,
    cull_mode: Option<wgpu::Face>,
    depth: wgpu::DepthStencilState,
    blend: wgpu::BlendState,
}

fn build(device: &wgpu::Device, color_format: wgpu::TextureFormat, desc: PipelineDesc<'_>) -> wgpu::RenderPipeline {
    let buffers = [vertex_layout()];
    let targets = [Some(wgpu::ColorTargetState {
        format: color_format,
        blend: Some(desc.blend),
        write_mask: wgpu::ColorWrites::ALL,
    })];
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.module,
            entry_point: Some(desc.vs),
            compilation_options: Default::default(),
            buffers: if desc.vertex_input { &buffers } else { &[] },
        },
        fragment: desc.fs.map(|fs| wgpu::FragmentState {
            module: desc.module,
            entry_point: Some(fs),
            compilation_options: Default::default(),
            targets: &targets,
        }),
        primitive: wgpu::PrimitiveState {
            topology: desc.topology,
            cull_mode: desc.cull_mode,
            ..Default::default()
        },
        depth_stencil: Some(desc.depth),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

impl Pipelines {
    /// Compile every shader and build the pipelines for `color_format`.
    /// Any validation error is returned instead of panicking later.
    pub fn new(ctx: &GpuContext, color_format: wgpu::TextureFormat) -> Result<Self, RenderError> {
        let (pipelines, error) = ctx.validated(|device| Self::build_all(device, color_format));
        if let Some(e) = error {
            tracing::error!("pipeline creation failed: {e}");
            return Err(RenderError::Device(e.to_string()));
        }
        tracing::info!(?color_format, "render pipelines ready");
        Ok(pipelines)
    }

    fn build_all(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let layouts = Layouts::new(device);
        let module = |label: &str, source: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };
        let scene_shader = module("scene_shader", SCENE_SHADER);
        let geometry_shader = module("geometry_shader", GEOMETRY_SHADER);
        let skybox_shader = module("skybox_shader", SKYBOX_SHADER);

        let pipeline_layout = |label: &str, groups: &[&wgpu::BindGroupLayout]| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: groups,
                push_constant_ranges: &[],
            })
        };
        let standard_layout =
            pipeline_layout("standard_layout", &[&layouts.frame, &layouts.object, &layouts.material]);
        let displaced_layout = pipeline_layout(
            "displaced_layout",
            &[&layouts.frame, &layouts.object, &layouts.material, &layouts.surface],
        );
        let geometry_layout =
            pipeline_layout("geometry_layout", &[&layouts.view, &layouts.object, &layouts.surface]);
        let skybox_layout = pipeline_layout("skybox_layout", &[&layouts.skybox]);

        let opaque = depth_state(true, wgpu::CompareFunction::Less, wgpu::DepthBiasState::default());
        let shadow_bias = wgpu::DepthBiasState {
            constant: 2,
            slope_scale: 2.0,
            clamp: 0.0,
        };

        let standard = build(
            device,
            color_format,
            PipelineDesc {
                label: "standard_pipeline",
                layout: &standard_layout,
                module: &scene_shader,
                vs: "vs_main",
                fs: Some("fs_main"),
                vertex_input: true,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                depth: opaque.clone(),
                blend: wgpu::BlendState::ALPHA_BLENDING,
            },
        );
        let displaced = build(
            device,
            color_format,
            PipelineDesc {
                label: "displaced_pipeline",
                layout: &displaced_layout,
                module: &scene_shader,
                vs: "vs_displaced",
                fs: Some("fs_displaced"),
                vertex_input: true,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                depth: opaque,
                blend: wgpu::BlendState::ALPHA_BLENDING,
            },
        );
        // Depth-only; both faces are rendered so open meshes still cast.
        let shadow_desc = |label, vs| PipelineDesc {
            label,
            layout: &geometry_layout,
            module: &geometry_shader,
            vs,
            fs: None,
            vertex_input: true,
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            depth: depth_state(true, wgpu::CompareFunction::Less, shadow_bias),
            blend: wgpu::BlendState::REPLACE,
        };
        let shadow = build(device, color_format, shadow_desc("shadow_pipeline", "vs_depth"));
        let shadow_displaced = build(
            device,
            color_format,
            shadow_desc("shadow_displaced_pipeline", "vs_depth_displaced"),
        );
        let wireframe = build(
            device,
            color_format,
            PipelineDesc {
                label: "wireframe_pipeline",
                layout: &geometry_layout,
                module: &geometry_shader,
                vs: "vs_depth_displaced",
                fs: Some("fs_wire"),
                vertex_input: true,
                topology: wgpu::PrimitiveTopology::LineList,
                cull_mode: None,
                // Line topologies reject depth bias, so lines rely on LessEqual.
                depth: depth_state(false, wgpu::CompareFunction::LessEqual, wgpu::DepthBiasState::default()),
                blend: wgpu::BlendState::REPLACE,
            },
        );
        let skybox = build(
            device,
            color_format,
            PipelineDesc {
                label: "skybox_pipeline",
                layout: &skybox_layout,
                module: &skybox_shader,
                vs: "vs_sky",
                fs: Some("fs_sky"),
                vertex_input: false,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                depth: depth_state(false, wgpu::CompareFunction::LessEqual, wgpu::DepthBiasState::default()),
                blend: wgpu::BlendState::REPLACE,
            },
        );

        Self {
            layouts,
            standard,
            displaced,
            shadow,
            shadow_displaced,
            skybox,
            wireframe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::gpu;
    use crate::framebuffer::COLOR_FORMAT;

    #[test]
    fn shaders_parse() {
        for source in [SCENE_SHADER, GEOMETRY_SHADER, SKYBOX_SHADER] {
            assert!(source.contains("@vertex"));
            assert!(source.contains("@group(0)"));
        }
    }

    #[test]
    fn every_pipeline_compiles() {
        let Some(ctx) = gpu() else { return };
        let pipelines = Pipelines::new(&ctx, COLOR_FORMAT);
        assert!(pipelines.is_ok(), "{:?}", pipelines.err());
    }
}
