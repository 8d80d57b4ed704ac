use glam::{Vec3, Vec4};
use kestrel_resources::prelude::Name;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MaterialKind {
    #[default]
    Standard,
    Water,
    Blended,
    Custom,
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum MaterialModel {
    #[default]
    Pbr = 0,
    Phong = 1,
    Unlit = 2,
}

/// Channel of a texture feeding a single scalar input
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TextureChannel {
    #[default]
    R = 0,
    G = 1,
    B = 2,
    A = 3,
}

/// Reference to a texture resource feeding a material input
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureMap {
    pub resource_name: Name,
    pub package_name: Name,
    pub channel: TextureChannel,
}

impl TextureMap {
    pub fn new(package_name: impl Into<Name>, resource_name: impl Into<Name>) -> Self {
        Self {
            resource_name: resource_name.into(),
            package_name: package_name.into(),
            channel: TextureChannel::default(),
        }
    }

    pub fn with_channel(mut self, channel: TextureChannel) -> Self {
        self.channel = channel;
        self
    }
}

/// Inline value, optionally replaced by a texture
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MaterialInput<T> {
    pub value: T,
    pub map: Option<TextureMap>,
}

impl<T> MaterialInput<T> {
    pub fn value(value: T) -> Self {
        Self { value, map: None }
    }

    pub fn mapped(value: T, map: TextureMap) -> Self {
        Self {
            value,
            map: Some(map),
        }
    }
}

/// CPU-side description of a material as delivered by the loading collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialAsset {
    pub kind: MaterialKind,
    pub model: MaterialModel,

    pub has_transparency: bool,
    pub double_sided: bool,
    pub receives_shadow: bool,
    pub casts_shadow: bool,
    pub use_vertex_colour_as_base_colour: bool,
    pub normal_enabled: bool,
    pub ao_enabled: bool,
    /// Metallic, roughness and ao come packed in `mra` instead of their own inputs
    pub mra_enabled: bool,
    pub emissive_enabled: bool,

    pub base_colour: MaterialInput<Vec4>,
    pub normal: MaterialInput<Vec3>,
    pub metallic: MaterialInput<f32>,
    pub roughness: MaterialInput<f32>,
    pub ao: MaterialInput<f32>,
    pub mra: MaterialInput<Vec3>,
    pub emissive: MaterialInput<Vec4>,

    pub uv_offset: Vec3,
    pub uv_scale: Vec3,
}

impl Default for MaterialAsset {
    fn default() -> Self {
        Self {
            kind: MaterialKind::Standard,
            model: MaterialModel::Pbr,
            has_transparency: false,
            double_sided: false,
            receives_shadow: true,
            casts_shadow: true,
            use_vertex_colour_as_base_colour: false,
            normal_enabled: true,
            ao_enabled: true,
            mra_enabled: false,
            emissive_enabled: false,
            base_colour: MaterialInput::value(Vec4::ONE),
            normal: MaterialInput::value(Vec3::Z),
            metallic: MaterialInput::value(0.0),
            roughness: MaterialInput::value(0.5),
            ao: MaterialInput::value(1.0),
            mra: MaterialInput::value(Vec3::new(0.0, 0.5, 1.0)),
            emissive: MaterialInput::value(Vec4::ZERO),
            uv_offset: Vec3::ZERO,
            uv_scale: Vec3::ONE,
        }
    }
}
