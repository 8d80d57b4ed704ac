pub use super::asset::{
    AssetBroker, AssetInfo, AssetLoadError, AssetPayload, AssetReply, AssetRequest, AssetResult,
    AssetTicket, AssetType, ImageAsset,
};
pub use super::brokers::{BrokerMode, FileBroker, MemoryBroker};
pub use super::cache::{
    CacheConfig, LookupEntry, Released, ResourceCache, ResourceHandle, ResourceSummary,
};
pub use super::error::ResourceError;
pub use super::handler::{HandlerRegistry, PopulateContext, Populated, ResourceHandler};
pub use super::handlers::{
    BinaryHandler, BinaryResource, TextHandler, TextResource, TextureHandler, TextureResource,
};
pub use super::name::Name;
pub use super::request::{Completion, RequestInfo, ResourceEvent, Subscription};
pub use super::resource::{INVALID_GENERATION, Resource, ResourceState, ResourceType};
