//! Durable queue substrate.
//!
//! Named queues, each paired with a dead letter queue, with
//! transactional-style consume (receive / commit / rollback) and
//! broker-managed redelivery. Listeners never implement retry logic of their
//! own; a failed consume is rolled back and the substrate either redelivers
//! the message or, once the redelivery budget is exhausted, moves it to the
//! queue's DLQ.

pub mod backend;
pub mod backoff;
pub mod console;
pub mod factory;
pub mod listener;
pub mod memory_backend;
pub mod redis_backend;

pub use backend::{QueueBackend, QueueBackendError, QueueDelivery, QueuedMessage};
pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use console::DlqConsole;
pub use factory::create_queue_backend;
pub use listener::{MessageProcessor, ProcessingError, QueueListener};
