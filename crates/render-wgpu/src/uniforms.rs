//! CPU mirrors of the WGSL uniform blocks. Field order and padding must
//! match `shaders.rs` exactly.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use scenegraph_assets::{Material, Vertex};
use scenegraph_render::{LightSet, PlannedLight};

/// Light slots: one directional, then spots, then points.
pub const DIRECTIONAL_SLOT: usize = 0;
pub const SPOT_SLOTS: usize = 1;
pub const POINT_SLOTS: usize = 3;
pub const LIGHT_SLOTS: usize = 7;

/// Every dynamic-offset uniform is placed on this stride.
pub const UNIFORM_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl From<&Vertex> for GpuVertex {
    fn from(v: &Vertex) -> Self {
        Self {
            position: v.position.to_array(),
            normal: v.normal.to_array(),
            uv: v.tex_coord.to_array(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct GpuLight {
    /// xyz position, w range.
    pub position: [f32; 4],
    /// xyz direction, w cosine of the spot cutoff.
    pub direction: [f32; 4],
    pub radiance: [f32; 4],
    /// x enabled, y bias, z near, w far.
    pub shadow: [f32; 4],
    pub view_proj: [[f32; 4]; 4],
}

impl GpuLight {
    /// `has_map` tells whether a valid shadow target is bound for it.
    pub fn from_planned(light: &PlannedLight, has_map: bool) -> Self {
        let shadow = match (&light.shadow, has_map) {
            (Some(s), true) => [1.0, s.bias, s.near, s.far],
            _ => [0.0; 4],
        };
        Self {
            position: light.position.extend(light.range).to_array(),
            direction: light.direction.extend(light.cos_cutoff).to_array(),
            radiance: light.radiance.extend(1.0).to_array(),
            shadow,
            view_proj: light
                .shadow
                .map_or(Mat4::IDENTITY, |s| s.view_proj)
                .to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub ambient: [f32; 4],
    /// Directional, spot and point light counts.
    pub counts: [u32; 4],
    pub lights: [GpuLight; LIGHT_SLOTS],
}

impl FrameUniforms {
    /// `has_map(slot, light)` reports whether the light's shadow target is
    /// usable this frame.
    pub fn new(
        view_proj: Mat4,
        eye: Vec3,
        lights: &LightSet,
        mut has_map: impl FnMut(&PlannedLight) -> bool,
    ) -> Self {
        let mut slots = [GpuLight::default(); LIGHT_SLOTS];
        let groups: [(&[PlannedLight], usize, usize); 3] = [
            (&lights.directional, DIRECTIONAL_SLOT, 1),
            (&lights.spot, SPOT_SLOTS, 2),
            (&lights.point, POINT_SLOTS, 4),
        ];
        let mut counts = [0u32; 4];
        for (i, (group, first, cap)) in groups.into_iter().enumerate() {
            for (j, light) in group.iter().take(cap).enumerate() {
                slots[first + j] = GpuLight::from_planned(light, has_map(light));
                counts[i] += 1;
            }
        }
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            eye: eye.extend(1.0).to_array(),
            ambient: lights.ambient.extend(1.0).to_array(),
            counts,
            lights: slots,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
    /// x lit, y receives shadows, z displacement scale.
    pub params: [f32; 4],
}

impl ObjectUniforms {
    pub fn new(model: Mat4, lit: bool, receives_shadows: bool, displacement: f32) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            params: [
                f32::from(u8::from(lit)),
                f32::from(u8::from(receives_shadows)),
                displacement,
                0.0,
            ],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MaterialUniforms {
    /// rgb diffuse, w opacity.
    pub kd: [f32; 4],
    /// rgb specular, w shininess.
    pub ks: [f32; 4],
    /// rgb emissive, w 1 when a diffuse map is bound.
    pub ke: [f32; 4],
}

impl MaterialUniforms {
    pub fn new(material: &Material, has_map: bool) -> Self {
        let [r, g, b] = material.kd;
        let [sr, sg, sb] = material.ks;
        let [er, eg, eb] = material.ke;
        Self {
            kd: [r, g, b, material.opacity()],
            ks: [sr, sg, sb, material.ns],
            ke: [er, eg, eb, f32::from(u8::from(has_map))],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ShadowViewUniforms {
    pub view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SkyUniforms {
    pub inv_view_proj: [[f32; 4]; 4],
}

impl SkyUniforms {
    /// Inverse of the view-projection with the translation removed, so the
    /// sky stays at infinity.
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        let mut rotation_only = view;
        rotation_only.w_axis = glam::Vec4::W;
        Self {
            inv_view_proj: (projection * rotation_only).inverse().to_cols_array_2d(),
        }
    }
}
