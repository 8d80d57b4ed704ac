pub use super::arena::SlotArena;
pub use super::error::ContainerErrors;
pub use super::handle::{Handle, HandleAllocator, INVALID_ID, INVALID_INDEX};
