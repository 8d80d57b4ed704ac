use bytemuck::{Pod, Zeroable};

/// Per-group uniforms shared by every instance of a material
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_colour: [f32; 4],
    pub emissive: [f32; 4],
    /// xyz, w unused
    pub normal: [f32; 4],
    /// metallic, roughness, ao, w unused
    pub mra: [f32; 4],
    pub material_flags: u32,
    pub texture_flags: u32,
    /// Two bits per channel: metallic, roughness, ao
    pub texture_channels: u32,
    pub model: u32,
}

/// Per-draw uniforms of a single instance
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct InstanceUniforms {
    pub base_colour: [f32; 4],
    pub uv_offset: [f32; 4],
    pub uv_scale: [f32; 4],
    pub flags: u32,
    pub _padding: [u32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_are_vec4_aligned() {
        assert_eq!(std::mem::size_of::<MaterialUniforms>() % 16, 0);
        assert_eq!(std::mem::size_of::<InstanceUniforms>() % 16, 0);
        let uniforms = InstanceUniforms::zeroed();
        assert_eq!(bytemuck::bytes_of(&uniforms).len(), 64);
    }
}
