//! Object store implementations

mod in_memory;
mod local;

pub use in_memory::InMemoryObjectStore;
pub use local::LocalObjectStore;
