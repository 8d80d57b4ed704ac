use crate::asset::{AssetBroker, AssetLoadError, AssetPayload, AssetReply, AssetRequest};
use crate::name::Name;
use derivative::Derivative;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BrokerMode {
    /// Reply before `submit_load` returns
    #[default]
    Immediate,
    /// Queue replies until [`MemoryBroker::flush`]
    Deferred,
}

/// Broker serving assets from an in-memory table keyed by `(package, name)`.
///
/// In [`BrokerMode::Deferred`] loads stay in flight until flushed, from any thread, which makes it
/// a stand-in for a real asynchronous loader.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct MemoryBroker {
    mode: BrokerMode,
    #[derivative(Debug = "ignore")]
    assets: RwLock<HashMap<(Name, Name), AssetPayload>>,
    pending: Mutex<Vec<(AssetRequest, AssetReply)>>,
    submitted: AtomicUsize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred() -> Self {
        Self {
            mode: BrokerMode::Deferred,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> BrokerMode {
        self.mode
    }

    pub fn insert<T: Any + Send + Sync>(
        &self,
        package: impl Into<Name>,
        name: impl Into<Name>,
        asset: T,
    ) {
        self.insert_payload(package, name, Arc::new(asset));
    }

    pub fn insert_payload(
        &self,
        package: impl Into<Name>,
        name: impl Into<Name>,
        asset: AssetPayload,
    ) {
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((package.into(), name.into()), asset);
    }

    pub fn remove(&self, package: impl Into<Name>, name: impl Into<Name>) -> bool {
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(package.into(), name.into()))
            .is_some()
    }

    /// Total number of `submit_load` calls seen
    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn resolve(&self, request: &AssetRequest) -> Result<AssetPayload, AssetLoadError> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(request.package, request.name))
            .cloned()
            .ok_or(AssetLoadError::NotFound {
                package: request.package,
                name: request.name,
            })
    }

    fn take_pending(&self) -> Vec<(AssetRequest, AssetReply)> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replies to every queued load. Returns how many were answered.
    pub fn flush(&self) -> usize {
        let pending = self.take_pending();
        let count = pending.len();
        for (request, reply) in pending {
            reply.send(self.resolve(&request));
        }
        count
    }

    /// Fails every queued load with `error`
    pub fn fail_pending(&self, error: AssetLoadError) -> usize {
        let pending = self.take_pending();
        let count = pending.len();
        for (_, reply) in pending {
            reply.send(Err(error.clone()));
        }
        count
    }
}

impl AssetBroker for MemoryBroker {
    fn submit_load(&self, request: AssetRequest, reply: AssetReply) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        if request.synchronous || self.mode == BrokerMode::Immediate {
            reply.send(self.resolve(&request));
        } else {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((request, reply));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetResult, AssetTicket, AssetType};
    use kestrel_containers::prelude::Handle;

    fn request(name: &str, synchronous: bool) -> AssetRequest {
        AssetRequest {
            kind: AssetType::Text,
            name: Name::new(name),
            package: Name::new("pkg"),
            synchronous,
        }
    }

    fn reply(sender: &crossbeam_channel::Sender<AssetResult>) -> AssetReply {
        AssetReply::new(
            AssetTicket {
                resource: Handle::invalid(),
                asset_index: 0,
            },
            sender.clone(),
        )
    }

    #[test]
    fn test_immediate() {
        let broker = MemoryBroker::new();
        broker.insert("pkg", "hello", String::from("world"));
        let (send, recv) = crossbeam_channel::unbounded();
        broker.submit_load(request("hello", false), reply(&send));
        let result = recv.try_recv().unwrap();
        let text = result.outcome.unwrap();
        assert_eq!(text.downcast_ref::<String>().unwrap(), "world");
        assert_eq!(broker.submitted(), 1);
    }

    #[test]
    fn test_deferred_waits_for_flush() {
        let broker = MemoryBroker::deferred();
        broker.insert("pkg", "hello", String::from("world"));
        let (send, recv) = crossbeam_channel::unbounded();
        broker.submit_load(request("hello", false), reply(&send));
        broker.submit_load(request("missing", false), reply(&send));
        assert!(recv.try_recv().is_err());
        assert_eq!(broker.pending(), 2);
        assert_eq!(broker.flush(), 2);
        assert!(recv.try_recv().unwrap().outcome.is_ok());
        match recv.try_recv().unwrap().outcome {
            Err(AssetLoadError::NotFound { .. }) => {}
            _ => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_deferred_honours_synchronous() {
        let broker = MemoryBroker::deferred();
        broker.insert("pkg", "hello", String::from("world"));
        let (send, recv) = crossbeam_channel::unbounded();
        broker.submit_load(request("hello", true), reply(&send));
        assert!(recv.try_recv().is_ok());
        assert_eq!(broker.pending(), 0);
    }

    #[test]
    fn test_fail_pending() {
        let broker = MemoryBroker::deferred();
        let (send, recv) = crossbeam_channel::unbounded();
        broker.submit_load(request("a", false), reply(&send));
        assert_eq!(broker.fail_pending(AssetLoadError::Abandoned), 1);
        assert_eq!(
            recv.try_recv().unwrap().outcome.err(),
            Some(AssetLoadError::Abandoned)
        );
    }
}
