pub use super::config::EngineConfig;
pub use super::engine::Engine;
pub use kestrel_materials::prelude as materials;
pub use kestrel_resources::prelude as resources;
