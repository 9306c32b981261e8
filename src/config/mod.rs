pub mod settings;

pub use settings::{
    AuthConfig, LogConfig, PushConfig, QueuePairConfig, QueuesConfig, RouterConfig, ServerConfig,
    Settings, TransportConfig,
};
