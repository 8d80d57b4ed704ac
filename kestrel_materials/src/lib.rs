pub mod asset;
pub mod binder;
pub mod error;
pub mod flags;
pub mod handler;
pub mod prelude;
pub mod system;
pub mod uniforms;
