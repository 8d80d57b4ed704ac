use crate::asset::MaterialKind;
use crate::binder::BindingError;
use kestrel_containers::prelude::ContainerErrors;
use kestrel_resources::prelude::ResourceError;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterialError {
    #[error("Material handle is stale")]
    StaleHandle,
    #[error("Material has not finished loading")]
    NotReady,
    #[error("No shader available for {0:?} materials")]
    UnsupportedKind(MaterialKind),
    #[error("Invalid material system configuration: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Container(#[from] ContainerErrors),
}
