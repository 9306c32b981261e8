// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain layer (transport semantics)
pub mod domain;
pub mod partner;
pub mod processors;
pub mod queue;
pub mod storage;
pub mod transform;
pub mod transport;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod shutdown;
