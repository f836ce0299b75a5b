//! Queue transports

pub mod in_memory;
pub mod pgmq_queue;

pub use in_memory::InMemoryMessageQueue;
pub use pgmq_queue::PgmqMessageQueue;
