use std::path::{Path, PathBuf};

/// Renderer-issued handle of a texture that is already resident on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// A material's reference to a texture map.
///
/// `Source` maps are uploaded lazily by the renderer the first time a draw
/// needs them; `Resident` maps were uploaded by someone else and are used
/// as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TextureRef {
    #[default]
    None,
    Source(PathBuf),
    Resident(TextureHandle),
}

impl TextureRef {
    pub fn is_present(&self) -> bool {
        !matches!(self, TextureRef::None)
    }

    pub fn source(&self) -> Option<&Path> {
        match self {
            TextureRef::Source(p) => Some(p),
            _ => None,
        }
    }
}

/// Reflectance description of a surface, as found in an MTL file.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Diffuse reflectance.
    pub kd: [f32; 3],
    /// Specular reflectance.
    pub ks: [f32; 3],
    /// Emissive color.
    pub ke: [f32; 3],
    /// Transmission filter.
    pub tf: [f32; 3],
    /// Specular exponent.
    pub ns: f32,
    /// Optical density.
    pub ni: f32,
    pub illum: u8,
    /// Dissolve (opacity).
    pub d: f32,
    /// Transparency, `1 - d` when written by exporters that use it.
    pub tr: f32,
    pub map_kd: TextureRef,
    pub map_ks: TextureRef,
    pub map_ns: TextureRef,
    pub map_d: TextureRef,
    pub map_bump: TextureRef,
    pub map_disp: TextureRef,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".into(),
            kd: [1.0; 3],
            ks: [0.0; 3],
            ke: [0.0; 3],
            tf: [0.0; 3],
            ns: 0.0,
            ni: 1.0,
            illum: 2,
            d: 1.0,
            tr: 0.0,
            map_kd: TextureRef::None,
            map_ks: TextureRef::None,
            map_ns: TextureRef::None,
            map_d: TextureRef::None,
            map_bump: TextureRef::None,
            map_disp: TextureRef::None,
        }
    }
}

impl Material {
    /// Plain colored material with the given diffuse/specular terms.
    pub fn colored(
        name: impl Into<String>,
        kd: [f32; 3],
        ks: [f32; 3],
        ns: f32,
        d: f32,
    ) -> Self {
        Self {
            name: name.into(),
            kd,
            ks,
            ns,
            d,
            ..Self::default()
        }
    }

    pub fn with_emission(mut self, ke: [f32; 3]) -> Self {
        self.ke = ke;
        self
    }

    pub fn with_diffuse_map(mut self, map: TextureRef) -> Self {
        self.map_kd = map;
        self
    }

    /// Effective opacity, taking both `d` and `Tr` into account.
    pub fn opacity(&self) -> f32 {
        (self.d * (1.0 - self.tr)).clamp(0.0, 1.0)
    }
}
