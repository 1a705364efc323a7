//! Job queue implementations

mod in_memory;

pub use in_memory::{InMemoryJobQueue, QueuedJob};
