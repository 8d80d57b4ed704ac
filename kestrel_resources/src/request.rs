use crate::asset::AssetInfo;
use crate::cache::ResourceHandle;
use crate::error::ResourceError;
use crate::name::Name;
use crate::resource::{Resource, ResourceType};
use crossbeam_channel::Sender;
use derivative::Derivative;
use futures::channel::oneshot;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Delivered once per request when the resource it refers to resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    pub handle: ResourceHandle,
    pub name: Name,
    pub kind: ResourceType,
    pub generation: u32,
    pub outcome: Result<(), ResourceError>,
    /// Listener context supplied with [`RequestInfo::listener`], 0 otherwise
    pub context: u64,
}

impl ResourceEvent {
    pub(crate) fn loaded(handle: ResourceHandle, resource: &Resource) -> Self {
        Self {
            handle,
            name: resource.name(),
            kind: resource.kind(),
            generation: resource.generation(),
            outcome: Ok(()),
            context: 0,
        }
    }

    pub(crate) fn failed(handle: ResourceHandle, resource: &Resource, error: ResourceError) -> Self {
        Self {
            outcome: Err(error),
            ..Self::loaded(handle, resource)
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// How a request wants to hear about completion
pub enum Completion {
    Callback(Box<dyn FnOnce(&ResourceEvent) + Send>),
    Listener {
        sender: Sender<ResourceEvent>,
        context: u64,
    },
    Oneshot(oneshot::Sender<ResourceEvent>),
}

impl Debug for Completion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Callback(_) => f.write_str("Callback"),
            Completion::Listener { context, .. } => {
                f.debug_struct("Listener").field("context", context).finish()
            }
            Completion::Oneshot(_) => f.write_str("Oneshot"),
        }
    }
}

impl Completion {
    pub(crate) fn notify(self, event: ResourceEvent) {
        match self {
            Completion::Callback(callback) => callback(&event),
            Completion::Listener { sender, context } => {
                if let Err(e) = sender.send(ResourceEvent { context, ..event }) {
                    tracing::warn!("Listener for {} hung up", e.0.name);
                }
            }
            Completion::Oneshot(sender) => {
                // receiver may have been dropped, nobody cares about the result then
                let _ = sender.send(event);
            }
        }
    }
}

/// Future resolving to the [`ResourceEvent`] of the request it was created with
#[derive(Debug)]
pub struct Subscription {
    receiver: oneshot::Receiver<ResourceEvent>,
}

impl Subscription {
    /// Non-blocking poll, `Ok(None)` while the request is still pending
    pub fn try_event(&mut self) -> Result<Option<ResourceEvent>, ResourceError> {
        self.receiver
            .try_recv()
            .map_err(|_| ResourceError::Cancelled)
    }
}

impl Future for Subscription {
    type Output = Result<ResourceEvent, ResourceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| ResourceError::Cancelled))
    }
}

/// Everything a handler needs to populate a resource, plus how the caller wants to be notified.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RequestInfo {
    pub assets: Vec<AssetInfo>,
    /// Tear the resource down once its reference count reaches zero. Only the request that creates
    /// the entry decides this.
    pub auto_release: bool,
    /// Ask the broker to resolve sub-requests before returning
    pub synchronous: bool,
    completion: Option<Completion>,
    #[derivative(Debug = "ignore")]
    source: Option<Box<dyn Any + Send>>,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            auto_release: true,
            synchronous: false,
            completion: None,
            source: None,
        }
    }
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, asset: AssetInfo) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn with_assets<I: IntoIterator<Item = AssetInfo>>(mut self, assets: I) -> Self {
        self.assets.extend(assets);
        self
    }

    pub fn auto_release(mut self, auto_release: bool) -> Self {
        self.auto_release = auto_release;
        self
    }

    pub fn synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// In-memory population data, used instead of assets by handlers that support it
    pub fn with_source<T: Any + Send>(mut self, source: T) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn source<T: Any + Send>(&self) -> Option<&T> {
        self.source.as_ref().and_then(|source| source.downcast_ref::<T>())
    }

    pub fn take_source<T: Any + Send>(&mut self) -> Option<T> {
        match self.source.take()?.downcast::<T>() {
            Ok(source) => Some(*source),
            Err(source) => {
                self.source = Some(source);
                None
            }
        }
    }

    pub fn on_complete<F: FnOnce(&ResourceEvent) + Send + 'static>(mut self, callback: F) -> Self {
        self.completion = Some(Completion::Callback(Box::new(callback)));
        self
    }

    /// Deliver the completion as a message, tagged with `context`
    pub fn listener(mut self, sender: Sender<ResourceEvent>, context: u64) -> Self {
        self.completion = Some(Completion::Listener { sender, context });
        self
    }

    pub fn subscribe(mut self) -> (Self, Subscription) {
        let (sender, receiver) = oneshot::channel();
        self.completion = Some(Completion::Oneshot(sender));
        (self, Subscription { receiver })
    }

    pub(crate) fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetType;

    #[test]
    fn test_defaults() {
        let info = RequestInfo::new();
        assert!(info.auto_release);
        assert!(!info.synchronous);
        assert!(info.assets.is_empty());
    }

    #[test]
    fn test_take_source_keeps_mismatched_type() {
        let mut info = RequestInfo::new()
            .with_asset(AssetInfo::new(AssetType::Text, "pkg", "a"))
            .with_source(String::from("inline"));
        assert_eq!(info.take_source::<u32>(), None);
        assert_eq!(info.source::<String>().map(String::as_str), Some("inline"));
        assert_eq!(info.take_source::<String>(), Some(String::from("inline")));
        assert!(info.source::<String>().is_none());
    }

    #[test]
    fn test_subscription_cancelled_when_dropped() {
        let (mut info, subscription) = RequestInfo::new().subscribe();
        drop(info.take_completion());
        assert_eq!(
            futures::executor::block_on(subscription),
            Err(ResourceError::Cancelled)
        );
    }
}
