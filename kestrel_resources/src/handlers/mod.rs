//! Handlers for the resource types the cache can populate on its own

mod binary;
mod text;
mod texture;

pub use binary::{BinaryHandler, BinaryResource};
pub use text::{TextHandler, TextResource};
pub use texture::{TextureHandler, TextureResource, mip_levels};

use crate::asset::{AssetInfo, AssetType};
use crate::error::ResourceError;
use crate::request::RequestInfo;
use crate::resource::Resource;

/// The one asset of `kind` a single-asset handler populates from
fn single_asset<'a>(
    resource: &Resource,
    info: &'a RequestInfo,
    kind: AssetType,
) -> Result<&'a AssetInfo, ResourceError> {
    match info.assets.as_slice() {
        [asset] if asset.kind == kind => Ok(asset),
        [asset] => Err(ResourceError::populate(
            resource.name(),
            format!("expected a {:?} asset, got {:?}", kind, asset.kind),
        )),
        assets => Err(ResourceError::populate(
            resource.name(),
            format!("expected exactly one asset, got {}", assets.len()),
        )),
    }
}
