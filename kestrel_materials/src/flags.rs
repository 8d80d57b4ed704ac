use crate::asset::MaterialAsset;
use bitflags::bitflags;

bitflags! {
    /// Capabilities accumulated from the boolean fields of a material
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u32 {
        const HasTransparency = 0b0000_0000_0001;
        const DoubleSided = 0b0000_0000_0010;
        const ReceivesShadow = 0b0000_0000_0100;
        const CastsShadow = 0b0000_0000_1000;
        const NormalEnabled = 0b0000_0001_0000;
        const AoEnabled = 0b0000_0010_0000;
        const MraEnabled = 0b0000_0100_0000;
        const EmissiveEnabled = 0b0000_1000_0000;
        const UseVertexColourAsBaseColour = 0b0001_0000_0000;
    }
}

bitflags! {
    /// Inputs which are sampled from a texture rather than taken from the inline value
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct TextureFlags: u32 {
        const BaseColour = 0b0000_0001;
        const Normal = 0b0000_0010;
        const Metallic = 0b0000_0100;
        const Roughness = 0b0000_1000;
        const Ao = 0b0001_0000;
        const Mra = 0b0010_0000;
        const Emissive = 0b0100_0000;
    }
}

impl MaterialFlags {
    pub fn from_asset(asset: &MaterialAsset) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::HasTransparency, asset.has_transparency);
        flags.set(Self::DoubleSided, asset.double_sided);
        flags.set(Self::ReceivesShadow, asset.receives_shadow);
        flags.set(Self::CastsShadow, asset.casts_shadow);
        flags.set(Self::NormalEnabled, asset.normal_enabled);
        flags.set(Self::AoEnabled, asset.ao_enabled);
        flags.set(Self::MraEnabled, asset.mra_enabled);
        flags.set(Self::EmissiveEnabled, asset.emissive_enabled);
        flags.set(
            Self::UseVertexColourAsBaseColour,
            asset.use_vertex_colour_as_base_colour,
        );
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_from_asset() {
        let asset = MaterialAsset {
            double_sided: true,
            has_transparency: true,
            casts_shadow: false,
            ..MaterialAsset::default()
        };
        let flags = MaterialFlags::from_asset(&asset);
        assert!(flags.contains(MaterialFlags::DoubleSided | MaterialFlags::HasTransparency));
        assert!(flags.contains(MaterialFlags::ReceivesShadow));
        assert!(!flags.contains(MaterialFlags::CastsShadow));
        assert!(!flags.contains(MaterialFlags::MraEnabled));
    }
}
