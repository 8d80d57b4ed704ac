use super::single_asset;
use crate::asset::{AssetPayload, AssetType};
use crate::error::ResourceError;
use crate::handler::{PopulateContext, Populated, ResourceHandler};
use crate::request::RequestInfo;
use crate::resource::{Resource, ResourceState};
use std::any::Any;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryResource {
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct BinaryHandler;

impl ResourceHandler for BinaryHandler {
    fn allocate(&self) -> Box<dyn Any + Send + Sync> {
        Box::new(BinaryResource::default())
    }

    fn populate(
        &mut self,
        resource: &mut Resource,
        info: &mut RequestInfo,
        ctx: &mut PopulateContext<'_>,
    ) -> Result<Populated, ResourceError> {
        let asset = single_asset(resource, info, AssetType::Binary)?;
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
        let bytes = asset
            .downcast_ref::<Vec<u8>>()
            .ok_or_else(|| ResourceError::populate(resource.name(), "asset is not binary"))?;
        if let Some(payload) = resource.payload_mut::<BinaryResource>() {
            payload.bytes = bytes.clone();
        }
        Ok(())
    }

    fn release(&mut self, resource: &mut Resource) {
        if let Some(payload) = resource.payload_mut::<BinaryResource>() {
            payload.bytes = Vec::new();
        }
    }
}
