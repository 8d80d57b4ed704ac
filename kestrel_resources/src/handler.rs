use crate::asset::{AssetBroker, AssetInfo, AssetPayload, AssetReply, AssetRequest, AssetResult, AssetTicket};
use crate::cache::ResourceHandle;
use crate::error::ResourceError;
use crate::request::RequestInfo;
use crate::resource::{Resource, ResourceType};
use crossbeam_channel::Sender;
use std::any::Any;
use std::fmt::{Debug, Formatter};

/// Result of a successful [`ResourceHandler::populate`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Populated {
    /// Fully resolved before returning
    Ready,
    /// Waiting on every sub-request submitted through the [`PopulateContext`]
    Pending,
}

/// Lets a handler issue asset sub-requests for the resource it is populating
pub struct PopulateContext<'a> {
    broker: &'a dyn AssetBroker,
    results: &'a Sender<AssetResult>,
    resource: ResourceHandle,
    submitted: u32,
}

impl<'a> PopulateContext<'a> {
    pub(crate) fn new(
        broker: &'a dyn AssetBroker,
        results: &'a Sender<AssetResult>,
        resource: ResourceHandle,
    ) -> Self {
        Self {
            broker,
            results,
            resource,
            submitted: 0,
        }
    }

    /// Submits `asset` to the broker and returns the index its result will arrive with
    pub fn submit(&mut self, asset: &AssetInfo, synchronous: bool) -> u32 {
        let asset_index = self.submitted;
        self.submitted += 1;
        let request = AssetRequest {
            kind: asset.kind,
            name: asset.name,
            package: asset.package,
            synchronous,
        };
        let ticket = AssetTicket {
            resource: self.resource,
            asset_index,
        };
        tracing::trace!("Submitting asset {}/{} as {:?}", asset.package, asset.name, ticket);
        self.broker
            .submit_load(request, AssetReply::new(ticket, self.results.clone()));
        asset_index
    }

    pub fn submitted(&self) -> u32 {
        self.submitted
    }

    pub fn resource(&self) -> ResourceHandle {
        self.resource
    }
}

/// Per-type operation set the cache dispatches through.
///
/// `populate` either resolves the resource in place and returns [`Populated::Ready`], or submits
/// sub-requests and returns [`Populated::Pending`]. Each sub-request result is then handed to
/// `on_asset`, and `finalize` runs once all of them have arrived. Any error along the way fails the
/// whole population.
pub trait ResourceHandler: Send {
    fn allocate(&self) -> Box<dyn Any + Send + Sync>;

    fn populate(
        &mut self,
        resource: &mut Resource,
        info: &mut RequestInfo,
        ctx: &mut PopulateContext<'_>,
    ) -> Result<Populated, ResourceError>;

    fn on_asset(
        &mut self,
        resource: &mut Resource,
        asset_index: u32,
        asset: AssetPayload,
    ) -> Result<(), ResourceError> {
        let _ = asset;
        Err(ResourceError::populate(
            resource.name(),
            format!("unexpected asset #{asset_index}"),
        ))
    }

    fn finalize(&mut self, resource: &mut Resource) -> Result<(), ResourceError> {
        let _ = resource;
        Ok(())
    }

    fn release(&mut self, resource: &mut Resource);
}

/// Flat table of handlers indexed by [`ResourceType`]
pub struct HandlerRegistry {
    handlers: [Option<Box<dyn ResourceHandler>>; ResourceType::COUNT],
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: std::array::from_fn(|_| None),
        }
    }
}

impl Debug for HandlerRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn register(
        &mut self,
        kind: ResourceType,
        handler: Box<dyn ResourceHandler>,
    ) -> Result<(), ResourceError> {
        let slot = &mut self.handlers[kind.index()];
        if slot.is_some() {
            tracing::error!("Handler for {:?} already registered", kind);
            return Err(ResourceError::DuplicateHandler(kind));
        }
        *slot = Some(handler);
        tracing::debug!("Registered handler for {:?}", kind);
        Ok(())
    }

    pub fn get(&self, kind: ResourceType) -> Result<&dyn ResourceHandler, ResourceError> {
        self.handlers[kind.index()]
            .as_deref()
            .ok_or(ResourceError::NoHandler(kind))
    }

    pub fn get_mut(
        &mut self,
        kind: ResourceType,
    ) -> Result<&mut (dyn ResourceHandler + 'static), ResourceError> {
        self.handlers[kind.index()]
            .as_deref_mut()
            .ok_or(ResourceError::NoHandler(kind))
    }

    pub fn contains(&self, kind: ResourceType) -> bool {
        self.handlers[kind.index()].is_some()
    }

    pub fn registered(&self) -> Vec<ResourceType> {
        ResourceType::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }
}
