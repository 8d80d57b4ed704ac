use super::single_asset;
use crate::asset::{AssetPayload, AssetType};
use crate::error::ResourceError;
use crate::handler::{PopulateContext, Populated, ResourceHandler};
use crate::request::RequestInfo;
use crate::resource::{Resource, ResourceState};
use std::any::Any;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextResource {
    pub text: String,
}

/// Populates from a single text asset, or from an inline `String` source
#[derive(Debug, Default)]
pub struct TextHandler;

impl ResourceHandler for TextHandler {
    fn allocate(&self) -> Box<dyn Any + Send + Sync> {
        Box::new(TextResource::default())
    }

    fn populate(
        &mut self,
        resource: &mut Resource,
        info: &mut RequestInfo,
        ctx: &mut PopulateContext<'_>,
    ) -> Result<Populated, ResourceError> {
        if let Some(text) = info.take_source::<String>() {
            if let Some(payload) = resource.payload_mut::<TextResource>() {
                payload.text = text;
            }
            resource.set_state(ResourceState::Initialized);
            return Ok(Populated::Ready);
        }
        let asset = single_asset(resource, info, AssetType::Text)?;
        resource.set_state(ResourceState::Loading);
        ctx.submit(asset, info.synchronous);
        Ok(Populated::Pending)
    }

    fn on_asset(
        &mut self,
        resource: &mut Resource,
        _asset_index: u32,
        asset: AssetPayload,
    ) -> Result<(), ResourceError> {
        let text = asset
            .downcast_ref::<String>()
            .ok_or_else(|| ResourceError::populate(resource.name(), "asset is not text"))?;
        if let Some(payload) = resource.payload_mut::<TextResource>() {
            payload.text = text.clone();
        }
        Ok(())
    }

    fn release(&mut self, resource: &mut Resource) {
        if let Some(payload) = resource.payload_mut::<TextResource>() {
            payload.text = String::new();
        }
    }
}
