use crate::name::Name;
use crate::resource::ResourceType;
use kestrel_containers::prelude::ContainerErrors;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("No handler registered for resource type {0:?}")]
    NoHandler(ResourceType),
    #[error("A handler for resource type {0:?} is already registered")]
    DuplicateHandler(ResourceType),
    #[error("Resource cache is full ({capacity} resources)")]
    CapacityExceeded { capacity: usize },
    #[error("Population of {name} failed: {reason}")]
    PopulateFailed { name: Name, reason: String },
    #[error("Release of unknown resource {0}")]
    ReleaseOfUnknownResource(Name),
    #[error("Resource {0} is not cached")]
    UnknownResource(Name),
    #[error("Reference count of {0} is already zero")]
    ReferenceUnderflow(Name),
    #[error("Handle no longer refers to a live resource")]
    StaleHandleUse,
    #[error("Request was dropped before the resource resolved")]
    Cancelled,
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(&'static str),
}

impl ResourceError {
    pub fn populate(name: Name, reason: impl Into<String>) -> Self {
        Self::PopulateFailed {
            name,
            reason: reason.into(),
        }
    }

    /// Folds any handler-side error into [`ResourceError::PopulateFailed`] for `name`
    pub fn into_populate_failure(self, name: Name) -> Self {
        match self {
            error @ Self::PopulateFailed { .. } => error,
            other => Self::populate(name, other.to_string()),
        }
    }
}

impl From<ContainerErrors> for ResourceError {
    fn from(value: ContainerErrors) -> Self {
        match value {
            ContainerErrors::CapacityExceeded { capacity } => Self::CapacityExceeded { capacity },
            ContainerErrors::NonexistentSlot | ContainerErrors::StaleHandle => Self::StaleHandleUse,
        }
    }
}
