pub use super::asset::{
    MaterialAsset, MaterialInput, MaterialKind, MaterialModel, TextureChannel, TextureMap,
};
pub use super::binder::{BinderCall, BindingError, HeadlessBinder, ShaderBinder, ShaderId, ShaderStats};
pub use super::error::MaterialError;
pub use super::flags::{MaterialFlags, TextureFlags};
pub use super::handler::{MaterialHandler, MaterialResource};
pub use super::system::{
    DEFAULT_MATERIAL_NAME, InstanceData, InstanceHandle, MaterialData, MaterialHandle,
    MaterialInstance, MaterialStatus, MaterialSummary, MaterialSystem, MaterialSystemConfig,
    MaterialTexture,
};
pub use super::uniforms::{InstanceUniforms, MaterialUniforms};
