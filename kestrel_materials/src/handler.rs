use crate::asset::MaterialAsset;
use kestrel_resources::prelude::*;
use std::any::Any;

/// Cached form of a material: the asset as it was delivered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialResource {
    pub asset: Option<MaterialAsset>,
}

/// Populates [`ResourceType::Material`] entries from a single material asset, or from an inline
/// [`MaterialAsset`] source
#[derive(Debug, Default)]
pub struct MaterialHandler;

impl ResourceHandler for MaterialHandler {
    fn allocate(&self) -> Box<dyn Any + Send + Sync> {
        Box::new(MaterialResource::default())
    }

    fn populate(
        &mut self,
        resource: &mut Resource,
        info: &mut RequestInfo,
        ctx: &mut PopulateContext<'_>,
    ) -> Result<Populated, ResourceError> {
        let name = resource.name();
        if let Some(asset) = info.take_source::<MaterialAsset>() {
            resource
                .payload_mut::<MaterialResource>()
                .ok_or_else(|| ResourceError::populate(name, "payload is not a material"))?
                .asset = Some(asset);
            resource.set_state(ResourceState::Initialized);
            return Ok(Populated::Ready);
        }
        match info.assets.as_slice() {
            [asset] if asset.kind == AssetType::Material => {
                resource.set_state(ResourceState::Loading);
                ctx.submit(asset, info.synchronous);
                Ok(Populated::Pending)
            }
            [asset] => Err(ResourceError::populate(
                name,
                format!("expected a material asset, got {:?}", asset.kind),
            )),
            [] => Err(ResourceError::populate(name, "no material source or asset")),
            assets => Err(ResourceError::populate(
                name,
                format!("expected one material asset, got {}", assets.len()),
            )),
        }
    }

    fn on_asset(
        &mut self,
        resource: &mut Resource,
        _asset_index: u32,
        asset: AssetPayload,
    ) -> Result<(), ResourceError> {
        let name = resource.name();
        let material = asset
            .downcast_ref::<MaterialAsset>()
            .ok_or_else(|| ResourceError::populate(name, "asset is not a material"))?;
        resource
            .payload_mut::<MaterialResource>()
            .ok_or_else(|| ResourceError::populate(name, "payload is not a material"))?
            .asset = Some(material.clone());
        Ok(())
    }

    fn release(&mut self, resource: &mut Resource) {
        if let Some(payload) = resource.payload_mut::<MaterialResource>() {
            payload.asset = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::MaterialKind;
    use std::sync::Arc;

    fn cache(broker: Arc<MemoryBroker>) -> ResourceCache {
        let mut cache = ResourceCache::new(CacheConfig::default(), broker).unwrap();
        cache
            .register_handler(ResourceType::Material, MaterialHandler)
            .unwrap();
        cache
    }

    #[test]
    fn test_inline_source() {
        let mut cache = cache(Arc::new(MemoryBroker::new()));
        let handle = cache
            .request(
                "inline",
                ResourceType::Material,
                RequestInfo::new().with_source(MaterialAsset {
                    kind: MaterialKind::Water,
                    ..MaterialAsset::default()
                }),
            )
            .unwrap();
        let payload = cache.payload::<MaterialResource>(&handle).unwrap();
        assert_eq!(payload.asset.as_ref().unwrap().kind, MaterialKind::Water);
        assert!(cache.get(&handle).unwrap().is_loaded());
    }

    #[test]
    fn test_from_broker() {
        let broker = Arc::new(MemoryBroker::new());
        broker.insert("materials", "brick", MaterialAsset::default());
        let mut cache = cache(broker);
        let handle = cache
            .request(
                "brick",
                ResourceType::Material,
                RequestInfo::new().with_asset(AssetInfo::new(
                    AssetType::Material,
                    "materials",
                    "brick",
                )),
            )
            .unwrap();
        let payload = cache.payload::<MaterialResource>(&handle).unwrap();
        assert_eq!(payload.asset, Some(MaterialAsset::default()));
    }

    #[test]
    fn test_wrong_asset_type() {
        let broker = Arc::new(MemoryBroker::new());
        broker.insert("materials", "brick", String::from("not a material"));
        let mut cache = cache(broker);
        let result = cache.request(
            "brick",
            ResourceType::Material,
            RequestInfo::new().with_asset(AssetInfo::new(AssetType::Text, "materials", "brick")),
        );
        assert!(matches!(result, Err(ResourceError::PopulateFailed { .. })));
        assert!(!cache.contains("brick"));

        let result = cache.request(
            "brick",
            ResourceType::Material,
            RequestInfo::new().with_asset(AssetInfo::new(
                AssetType::Material,
                "materials",
                "brick",
            )),
        );
        assert!(matches!(result, Err(ResourceError::PopulateFailed { .. })));
        assert!(cache.is_empty());
    }
}
