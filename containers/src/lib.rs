pub mod arena;
pub mod error;
pub mod handle;
pub mod prelude;
