use crate::asset::{AssetBroker, AssetInfo, AssetLoadError, AssetPayload, AssetResult};
use crate::error::ResourceError;
use crate::handler::{HandlerRegistry, PopulateContext, Populated, ResourceHandler};
use crate::name::Name;
use crate::request::{Completion, RequestInfo, ResourceEvent};
use crate::resource::{Resource, ResourceState, ResourceType};
use crossbeam_channel::{Receiver, Sender};
use derivative::Derivative;
use kestrel_containers::prelude::{Handle, SlotArena};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ResourceHandle = Handle<LookupEntry>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Fixed capacity of the slot arena backing the cache
    pub max_resource_count: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_resource_count: 1024,
        }
    }
}

impl CacheConfig {
    pub fn with_max_resource_count(mut self, max_resource_count: u32) -> Self {
        self.max_resource_count = max_resource_count;
        self
    }

    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.max_resource_count == 0 {
            return Err(ResourceError::InvalidConfig(
                "max_resource_count must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Slot payload of the cache: the owned resource and its bookkeeping
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct LookupEntry {
    resource: Option<Resource>,
    reference_count: i32,
    auto_release: bool,
    /// Sub-requests the entry was created with, kept for reloads
    assets: Vec<AssetInfo>,
    outstanding_assets: u32,
    waiters: Vec<Completion>,
    /// Replacement being populated by a reload. The live resource stays in place until it loads.
    staged: Option<Resource>,
}

impl LookupEntry {
    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn reference_count(&self) -> i32 {
        self.reference_count
    }

    pub fn auto_release(&self) -> bool {
        self.auto_release
    }

    pub fn is_pending(&self) -> bool {
        self.outstanding_assets > 0
    }

    pub fn is_reloading(&self) -> bool {
        self.staged.is_some()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Released {
    /// Still cached with this many references
    Remaining(i32),
    /// Reference count hit zero on an auto-release entry and it was torn down
    TornDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSummary {
    pub name: Name,
    pub kind: ResourceType,
    pub state: ResourceState,
    pub generation: u32,
    pub reference_count: i32,
    pub auto_release: bool,
}

/// Name-indexed, reference-counted store of resources.
///
/// Requests for a cached name share the existing entry. A miss claims a slot and populates it
/// through the handler registered for the requested type; asset results come back over a channel
/// and are applied on the owning thread by [`ResourceCache::pump`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ResourceCache {
    config: CacheConfig,
    index: BTreeMap<Name, u32>,
    entries: SlotArena<LookupEntry>,
    handlers: HandlerRegistry,
    #[derivative(Debug = "ignore")]
    broker: Arc<dyn AssetBroker>,
    results_send: Sender<AssetResult>,
    results_recv: Receiver<AssetResult>,
}

impl ResourceCache {
    pub fn new(config: CacheConfig, broker: Arc<dyn AssetBroker>) -> Result<Self, ResourceError> {
        config.validate()?;
        let (results_send, results_recv) = crossbeam_channel::unbounded();
        tracing::info!(
            "Resource cache initialized with room for {} resources",
            config.max_resource_count
        );
        Ok(Self {
            config,
            index: BTreeMap::new(),
            entries: SlotArena::with_capacity(config.max_resource_count as usize),
            handlers: HandlerRegistry::default(),
            broker,
            results_send,
            results_recv,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn register_handler<H: ResourceHandler + 'static>(
        &mut self,
        kind: ResourceType,
        handler: H,
    ) -> Result<(), ResourceError> {
        self.handlers.register(kind, Box::new(handler))
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Returns the entry for `name`, creating and populating it on a miss.
    ///
    /// A hit adds a reference. Its completion fires before this returns if the resource is already
    /// loaded, otherwise once the in-flight population resolves. A miss starts with one reference
    /// and may resolve before returning when the handler or broker is synchronous.
    pub fn request(
        &mut self,
        name: impl Into<Name>,
        kind: ResourceType,
        mut info: RequestInfo,
    ) -> Result<ResourceHandle, ResourceError> {
        let name = name.into();
        if let Some(&index) = self.index.get(&name) {
            return self.request_existing(index, kind, info);
        }

        let handler = match self.handlers.get_mut(kind) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!("Cannot create {}: {}", name, e);
                return Err(e);
            }
        };
        let handle = self
            .entries
            .insert(LookupEntry::default())
            .map_err(|e| {
                let e = ResourceError::from(e);
                tracing::error!("Cannot create {}: {}", name, e);
                e
            })?;
        self.index.insert(name, handle.index());
        tracing::debug!("Creating {:?} resource {}", kind, name);

        let mut resource = Resource::new(name, kind, handler.allocate());
        let mut ctx = PopulateContext::new(self.broker.as_ref(), &self.results_send, handle);
        let populated = match handler.populate(&mut resource, &mut info, &mut ctx) {
            Ok(Populated::Pending) if ctx.submitted() == 0 => Err(ResourceError::populate(
                name,
                "handler is pending without any asset sub-requests",
            )),
            other => other,
        };
        let outstanding = ctx.submitted();
        let completion = info.take_completion();

        let populated = match populated {
            Ok(populated) => populated,
            Err(error) => {
                let error = error.into_populate_failure(name);
                tracing::error!("{}", error);
                handler.release(&mut resource);
                if let Some(completion) = completion {
                    completion.notify(ResourceEvent::failed(handle, &resource, error.clone()));
                }
                self.entries.release_slot(handle.index())?;
                self.index.remove(&name);
                return Err(error);
            }
        };

        let entry = self
            .entries
            .get_mut(&handle)
            .ok_or(ResourceError::StaleHandleUse)?;
        entry.reference_count = 1;
        entry.auto_release = info.auto_release;
        entry.assets = std::mem::take(&mut info.assets);
        match populated {
            Populated::Ready => {
                resource.mark_loaded();
                tracing::debug!("{} resolved synchronously", name);
                let event = ResourceEvent::loaded(handle, &resource);
                entry.resource = Some(resource);
                if let Some(completion) = completion {
                    completion.notify(event);
                }
            }
            Populated::Pending => {
                if resource.state() < ResourceState::Loading {
                    resource.set_state(ResourceState::Loading);
                }
                entry.outstanding_assets = outstanding;
                entry.waiters.extend(completion);
                entry.resource = Some(resource);
                // synchronous brokers have already replied
                self.pump();
                if self.entries.is_stale(&handle) {
                    return Err(ResourceError::populate(name, "asset sub-request failed"));
                }
            }
        }
        Ok(handle)
    }

    fn request_existing(
        &mut self,
        index: u32,
        kind: ResourceType,
        mut info: RequestInfo,
    ) -> Result<ResourceHandle, ResourceError> {
        let handle = self
            .entries
            .handle_at(index)
            .ok_or(ResourceError::StaleHandleUse)?;
        let entry = self
            .entries
            .get_index_mut(index)
            .ok_or(ResourceError::StaleHandleUse)?;
        let Some(resource) = entry.resource.as_ref() else {
            return Err(ResourceError::StaleHandleUse);
        };
        if resource.kind() != kind {
            tracing::warn!(
                "{} requested as {:?} but is cached as {:?}",
                resource.name(),
                kind,
                resource.kind()
            );
        }
        if info.auto_release != entry.auto_release {
            tracing::debug!(
                "auto_release of {} was fixed at creation ({}), ignoring {}",
                resource.name(),
                entry.auto_release,
                info.auto_release
            );
        }
        entry.reference_count += 1;
        tracing::trace!(
            "{} now has {} references",
            resource.name(),
            entry.reference_count
        );
        if let Some(completion) = info.take_completion() {
            if resource.is_loaded() {
                completion.notify(ResourceEvent::loaded(handle, resource));
            } else {
                entry.waiters.push(completion);
            }
        }
        Ok(handle)
    }

    /// Drops one reference to `name`, tearing the entry down when it reaches zero and the entry is
    /// auto-released.
    pub fn release(&mut self, name: impl Into<Name>) -> Result<Released, ResourceError> {
        let name = name.into();
        let Some(&index) = self.index.get(&name) else {
            tracing::warn!("Release of unknown resource {}", name);
            return Err(ResourceError::ReleaseOfUnknownResource(name));
        };
        let entry = self
            .entries
            .get_index_mut(index)
            .ok_or(ResourceError::StaleHandleUse)?;
        if entry.reference_count <= 0 {
            tracing::warn!("Release of {} with no outstanding references", name);
            return Err(ResourceError::ReferenceUnderflow(name));
        }
        entry.reference_count -= 1;
        if entry.reference_count == 0 && entry.auto_release {
            self.tear_down(index, ResourceError::Cancelled);
            return Ok(Released::TornDown);
        }
        Ok(Released::Remaining(entry.reference_count))
    }

    /// [`ResourceCache::release`] of the entry `handle` refers to. A stale handle releases nothing,
    /// so a reference taken on an entry that has since been torn down can never drop a reference
    /// held on a newer entry of the same name.
    pub fn release_handle(&mut self, handle: &ResourceHandle) -> Result<Released, ResourceError> {
        let name = self.get(handle)?.name();
        self.release(name)
    }

    /// Re-populates a cached resource from the assets it was created with. The new data is built
    /// beside the live resource and swapped in once complete, advancing the generation. A failed
    /// reload leaves the live resource, its generation and its references untouched.
    pub fn reload(&mut self, name: impl Into<Name>) -> Result<ResourceHandle, ResourceError> {
        let name = name.into();
        let index = *self
            .index
            .get(&name)
            .ok_or(ResourceError::UnknownResource(name))?;
        let handle = self
            .entries
            .handle_at(index)
            .ok_or(ResourceError::StaleHandleUse)?;
        let entry = self
            .entries
            .get_index_mut(index)
            .ok_or(ResourceError::StaleHandleUse)?;
        if entry.is_pending() {
            return Ok(handle);
        }
        if entry.assets.is_empty() {
            return Err(ResourceError::populate(name, "nothing to reload from"));
        }
        let (kind, generation) = entry
            .resource
            .as_ref()
            .map(|resource| (resource.kind(), resource.generation()))
            .ok_or(ResourceError::StaleHandleUse)?;
        let mut info = RequestInfo::new().with_assets(entry.assets.iter().copied());
        let handler = self.handlers.get_mut(kind)?;
        let mut staged = Resource::new(name, kind, handler.allocate());
        let mut ctx = PopulateContext::new(self.broker.as_ref(), &self.results_send, handle);
        tracing::debug!("Reloading {}", name);
        let populated = handler.populate(&mut staged, &mut info, &mut ctx);
        let submitted = ctx.submitted();
        let error = match populated {
            Ok(Populated::Ready) => {
                swap_in(handler, entry, staged);
                return Ok(handle);
            }
            Ok(Populated::Pending) if submitted > 0 => {
                staged.set_state(ResourceState::Loading);
                entry.staged = Some(staged);
                entry.outstanding_assets = submitted;
                // synchronous brokers have already replied
                self.pump();
                let entry = self
                    .entries
                    .get(&handle)
                    .ok_or(ResourceError::StaleHandleUse)?;
                let reloaded = entry
                    .resource
                    .as_ref()
                    .is_some_and(|resource| resource.generation() != generation);
                if entry.is_pending() || reloaded {
                    return Ok(handle);
                }
                return Err(ResourceError::populate(name, "reload sub-request failed"));
            }
            Ok(Populated::Pending) => {
                ResourceError::populate(name, "reload submitted no asset sub-requests")
            }
            Err(error) => error.into_populate_failure(name),
        };
        handler.release(&mut staged);
        tracing::error!(
            "Reload of {} failed, keeping generation {}: {}",
            name,
            generation,
            error
        );
        Err(error)
    }

    /// Applies every asset result delivered so far. Returns how many were processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(result) = self.results_recv.try_recv() {
            self.process_result(result);
            processed += 1;
        }
        processed
    }

    fn process_result(&mut self, result: AssetResult) {
        let AssetResult { ticket, outcome } = result;
        let handle = ticket.resource;
        let Some(entry) = self.entries.get_mut(&handle) else {
            tracing::debug!("Dropping asset result for released resource {:?}", handle);
            return;
        };
        let Some((name, kind)) = entry
            .resource
            .as_ref()
            .map(|resource| (resource.name(), resource.kind()))
        else {
            return;
        };
        if !entry.is_pending() {
            tracing::debug!("Ignoring unexpected asset result for {}", name);
            return;
        }

        let step = match self.handlers.get_mut(kind) {
            Ok(handler) => advance(handler, entry, ticket.asset_index, outcome),
            Err(e) => Err(e),
        };
        match step {
            Ok(false) => {}
            Ok(true) => {
                let Some(resource) = entry.resource.as_ref() else {
                    return;
                };
                tracing::debug!("{} loaded (generation {})", name, resource.generation());
                let event = ResourceEvent::loaded(handle, resource);
                for waiter in std::mem::take(&mut entry.waiters) {
                    waiter.notify(event.clone());
                }
            }
            Err(error) => {
                let error = error.into_populate_failure(name);
                match entry.staged.take() {
                    Some(mut staged) => {
                        entry.outstanding_assets = 0;
                        if let Ok(handler) = self.handlers.get_mut(kind) {
                            handler.release(&mut staged);
                        }
                        tracing::error!(
                            "Reload of {} failed, keeping the loaded data: {}",
                            name,
                            error
                        );
                    }
                    None => {
                        tracing::error!("{}", error);
                        self.tear_down(handle.index(), error);
                    }
                }
            }
        }
    }

    /// Runs the handler's release on the live payload, fails any waiters with `failure`, then frees
    /// the slot and the index entry.
    fn tear_down(&mut self, index: u32, failure: ResourceError) {
        let Some(handle) = self.entries.handle_at(index) else {
            return;
        };
        let handlers = &mut self.handlers;
        let released = self.entries.release_slot_with(index, |entry| {
            if let Some(staged) = entry.staged.as_mut() {
                if let Ok(handler) = handlers.get_mut(staged.kind()) {
                    handler.release(staged);
                }
            }
            let resource = entry.resource.as_mut()?;
            if let Ok(handler) = handlers.get_mut(resource.kind()) {
                handler.release(resource);
            }
            resource.clear_tags();
            for waiter in std::mem::take(&mut entry.waiters) {
                waiter.notify(ResourceEvent::failed(handle, resource, failure.clone()));
            }
            Some(resource.name())
        });
        if let Ok(Some(name)) = released {
            self.index.remove(&name);
            tracing::debug!("Released resource {}", name);
        }
    }

    pub fn get(&self, handle: &ResourceHandle) -> Result<&Resource, ResourceError> {
        self.entries
            .get(handle)
            .and_then(|entry| entry.resource.as_ref())
            .ok_or(ResourceError::StaleHandleUse)
    }

    /// Typed payload behind `handle`, `None` if stale or of another type
    pub fn payload<T: 'static>(&self, handle: &ResourceHandle) -> Option<&T> {
        self.get(handle).ok()?.payload::<T>()
    }

    pub fn handle(&self, name: impl Into<Name>) -> Option<ResourceHandle> {
        let index = *self.index.get(&name.into())?;
        self.entries.handle_at(index)
    }

    pub fn resource(&self, name: impl Into<Name>) -> Option<&Resource> {
        let index = *self.index.get(&name.into())?;
        self.entries.get_index(index)?.resource.as_ref()
    }

    pub fn reference_count(&self, name: impl Into<Name>) -> Option<i32> {
        let index = *self.index.get(&name.into())?;
        self.entries
            .get_index(index)
            .map(|entry| entry.reference_count)
    }

    pub fn contains(&self, name: impl Into<Name>) -> bool {
        self.index.contains_key(&name.into())
    }

    pub fn is_stale(&self, handle: &ResourceHandle) -> bool {
        self.entries.is_stale(handle)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Logs and returns a summary row per cached resource, ordered by name id
    pub fn dump(&self) -> Vec<ResourceSummary> {
        let summaries: Vec<ResourceSummary> = self
            .index
            .values()
            .filter_map(|index| self.entries.get_index(*index))
            .filter_map(|entry| {
                entry.resource.as_ref().map(|resource| ResourceSummary {
                    name: resource.name(),
                    kind: resource.kind(),
                    state: resource.state(),
                    generation: resource.generation(),
                    reference_count: entry.reference_count,
                    auto_release: entry.auto_release,
                })
            })
            .collect();
        tracing::info!("{} cached resources", summaries.len());
        for summary in summaries.iter() {
            tracing::info!(
                "  {} ({:?}) {:?} gen={} refs={} auto_release={}",
                summary.name,
                summary.kind,
                summary.state,
                summary.generation,
                summary.reference_count,
                summary.auto_release
            );
        }
        summaries
    }

    /// Force-releases every entry regardless of its reference count
    pub fn shutdown(&mut self) {
        if self.index.is_empty() && self.entries.is_empty() {
            return;
        }
        let indices: Vec<u32> = self.index.values().copied().collect();
        let count = indices.len();
        for index in indices {
            self.tear_down(index, ResourceError::Cancelled);
        }
        let handlers = &mut self.handlers;
        self.entries.clear_with(|_, entry| {
            if let Some(staged) = entry.staged.as_mut() {
                if let Ok(handler) = handlers.get_mut(staged.kind()) {
                    handler.release(staged);
                }
            }
            if let Some(resource) = entry.resource.as_mut() {
                if let Ok(handler) = handlers.get_mut(resource.kind()) {
                    handler.release(resource);
                }
            }
        });
        self.index.clear();
        let dropped = self.results_recv.try_iter().count();
        tracing::info!(
            "Resource cache shut down, released {} resources and dropped {} asset results",
            count,
            dropped
        );
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Feeds one asset result to the handler. `Ok(true)` once the last outstanding sub-request is in
/// and the handler finalized the resource.
fn advance(
    handler: &mut dyn ResourceHandler,
    entry: &mut LookupEntry,
    asset_index: u32,
    outcome: Result<AssetPayload, AssetLoadError>,
) -> Result<bool, ResourceError> {
    let resource = match entry.staged.as_mut() {
        Some(staged) => staged,
        None => entry
            .resource
            .as_mut()
            .ok_or(ResourceError::StaleHandleUse)?,
    };
    let name = resource.name();
    let asset = outcome.map_err(|e| ResourceError::populate(name, e.to_string()))?;
    handler.on_asset(resource, asset_index, asset)?;
    entry.outstanding_assets = entry.outstanding_assets.saturating_sub(1);
    if entry.outstanding_assets > 0 {
        return Ok(false);
    }
    handler.finalize(resource)?;
    match entry.staged.take() {
        Some(staged) => swap_in(handler, entry, staged),
        None => {
            if let Some(resource) = entry.resource.as_mut() {
                resource.mark_loaded();
            }
        }
    }
    Ok(true)
}

/// Replaces the live resource with a completed reload and releases the previous payload
fn swap_in(handler: &mut dyn ResourceHandler, entry: &mut LookupEntry, mut staged: Resource) {
    if let Some(mut previous) = entry.resource.take() {
        staged.inherit(&mut previous);
        handler.release(&mut previous);
    }
    staged.mark_loaded();
    entry.resource = Some(staged);
}
