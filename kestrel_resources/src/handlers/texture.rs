use crate::asset::{AssetPayload, AssetType, ImageAsset};
use crate::error::ResourceError;
use crate::handler::{PopulateContext, Populated, ResourceHandler};
use crate::request::RequestInfo;
use crate::resource::{Resource, ResourceState};
use std::any::Any;

/// Number of mip levels in a full chain for a `width` x `height` image
pub fn mip_levels(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

/// CPU-side texture. Array textures carry one pixel buffer per layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextureResource {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub mip_levels: u32,
    pub layers: Vec<Vec<u8>>,
    loaded_layers: u32,
}

impl TextureResource {
    pub fn layer_count(&self) -> u32 {
        self.layers.len() as u32
    }

    pub fn loaded_layers(&self) -> u32 {
        self.loaded_layers
    }

    fn reset(&mut self, layer_count: usize) {
        *self = Self {
            layers: vec![Vec::new(); layer_count],
            ..Self::default()
        };
    }

    fn accept_layer(&mut self, layer: usize, image: &ImageAsset) -> Result<(), String> {
        if layer >= self.layers.len() {
            return Err(format!("layer {layer} out of range"));
        }
        if self.loaded_layers == 0 {
            self.width = image.width;
            self.height = image.height;
            self.channels = image.channels;
        } else if (self.width, self.height, self.channels)
            != (image.width, image.height, image.channels)
        {
            return Err(format!(
                "layer {layer} is {}x{}x{}, expected {}x{}x{}",
                image.width, image.height, image.channels, self.width, self.height, self.channels
            ));
        }
        self.layers[layer] = image.pixels.clone();
        self.loaded_layers += 1;
        Ok(())
    }
}

/// Populates a texture from one image asset per layer, or from an inline [`ImageAsset`] source.
/// Every layer must share the same dimensions and channel count.
#[derive(Debug, Default)]
pub struct TextureHandler;

impl ResourceHandler for TextureHandler {
    fn allocate(&self) -> Box<dyn Any + Send + Sync> {
        Box::new(TextureResource::default())
    }

    fn populate(
        &mut self,
        resource: &mut Resource,
        info: &mut RequestInfo,
        ctx: &mut PopulateContext<'_>,
    ) -> Result<Populated, ResourceError> {
        let name = resource.name();
        let texture = resource
            .payload_mut::<TextureResource>()
            .ok_or_else(|| ResourceError::populate(name, "payload is not a texture"))?;

        if let Some(image) = info.take_source::<ImageAsset>() {
            texture.reset(1);
            texture
                .accept_layer(0, &image)
                .map_err(|reason| ResourceError::populate(name, reason))?;
            texture.mip_levels = mip_levels(texture.width, texture.height);
            resource.set_state(ResourceState::Initialized);
            return Ok(Populated::Ready);
        }

        if info.assets.is_empty() {
            return Err(ResourceError::populate(name, "texture has no image assets"));
        }
        if let Some(asset) = info.assets.iter().find(|asset| asset.kind != AssetType::Image) {
            return Err(ResourceError::populate(
                name,
                format!("{} is a {:?} asset, not an image", asset.name, asset.kind),
            ));
        }
        texture.reset(info.assets.len());
        resource.set_state(ResourceState::Loading);
        for asset in info.assets.iter() {
            ctx.submit(asset, info.synchronous);
        }
        Ok(Populated::Pending)
    }

    fn on_asset(
        &mut self,
        resource: &mut Resource,
        asset_index: u32,
        asset: AssetPayload,
    ) -> Result<(), ResourceError> {
        let name = resource.name();
        let image = asset
            .downcast_ref::<ImageAsset>()
            .ok_or_else(|| ResourceError::populate(name, "asset is not an image"))?;
        resource
            .payload_mut::<TextureResource>()
            .ok_or_else(|| ResourceError::populate(name, "payload is not a texture"))?
            .accept_layer(asset_index as usize, image)
            .map_err(|reason| ResourceError::populate(name, reason))
    }

    fn finalize(&mut self, resource: &mut Resource) -> Result<(), ResourceError> {
        let name = resource.name();
        let texture = resource
            .payload_mut::<TextureResource>()
            .ok_or_else(|| ResourceError::populate(name, "payload is not a texture"))?;
        if texture.loaded_layers != texture.layer_count() {
            return Err(ResourceError::populate(
                name,
                format!(
                    "{} of {} layers loaded",
                    texture.loaded_layers,
                    texture.layer_count()
                ),
            ));
        }
        texture.mip_levels = mip_levels(texture.width, texture.height);
        tracing::trace!(
            "{}: {}x{} with {} layers and {} mips",
            name,
            texture.width,
            texture.height,
            texture.layer_count(),
            texture.mip_levels
        );
        Ok(())
    }

    fn release(&mut self, resource: &mut Resource) {
        if let Some(texture) = resource.payload_mut::<TextureResource>() {
            texture.reset(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_levels() {
        assert_eq!(mip_levels(1, 1), 1);
        assert_eq!(mip_levels(256, 256), 9);
        assert_eq!(mip_levels(512, 100), 10);
        assert_eq!(mip_levels(0, 0), 1);
    }

    #[test]
    fn test_accept_layer_rejects_mismatch() {
        let mut texture = TextureResource::default();
        texture.reset(2);
        texture
            .accept_layer(0, &ImageAsset::new(2, 2, 4, vec![0; 16]))
            .unwrap();
        assert!(texture
            .accept_layer(1, &ImageAsset::new(4, 4, 4, vec![0; 64]))
            .is_err());
        assert!(texture
            .accept_layer(2, &ImageAsset::new(2, 2, 4, vec![0; 16]))
            .is_err());
        assert_eq!(texture.loaded_layers(), 1);
    }
}
