pub mod asset;
pub mod brokers;
pub mod cache;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod name;
pub mod prelude;
pub mod request;
pub mod resource;
