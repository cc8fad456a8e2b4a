pub mod memory_queue;
pub mod memory_store;

pub use memory_queue::InMemoryJobQueue;
pub use memory_store::InMemoryJobStore;
