mod file;
mod memory;

pub use file::FileBroker;
pub use memory::{BrokerMode, MemoryBroker};
