use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Error)]
pub enum ContainerErrors {
    #[error("Expected a valid slot, got null")]
    NonexistentSlot,
    #[error("Handle is stale, the slot has been released or reused")]
    StaleHandle,
    #[error("Arena is full ({capacity} slots)")]
    CapacityExceeded { capacity: usize },
}
