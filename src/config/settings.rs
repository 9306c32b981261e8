use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::domain::LinkPartner;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub router: RouterConfig,
    /// Link partners known at deployment time; loaded into the registry at startup.
    #[serde(default)]
    pub partners: Vec<LinkPartner>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body size in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the client-certificate subject DN, set by the
    /// TLS-terminating layer in front of this service.
    #[serde(default = "default_client_dn_header")]
    pub client_dn_header: String,
}

/// One logical queue and its paired dead letter queue.
#[derive(Debug, Clone, Deserialize)]
pub struct QueuePairConfig {
    pub name: String,
    pub dlq: String,
}

impl QueuePairConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            dlq: format!("DLQ.{name}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueuesConfig {
    /// Queue backend: "memory" or "redis"
    #[serde(default = "default_queue_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Redeliveries granted to a message before it is moved to the DLQ
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
    /// Listener poll interval when a queue is empty, in milliseconds
    #[serde(default = "default_receive_poll_interval")]
    pub receive_poll_interval_ms: u64,
    #[serde(default = "default_to_link_queue")]
    pub to_link: QueuePairConfig,
    #[serde(default = "default_to_connector_queue")]
    pub to_connector: QueuePairConfig,
    #[serde(default = "default_to_cleanup_queue")]
    pub to_cleanup: QueuePairConfig,
}

impl QueuesConfig {
    /// All configured queue/DLQ pairs.
    pub fn pairs(&self) -> Vec<QueuePairConfig> {
        vec![
            self.to_link.clone(),
            self.to_connector.clone(),
            self.to_cleanup.clone(),
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Transport step store backend: "memory" or "postgres"
    #[serde(default = "default_transport_store")]
    pub store: String,
    pub postgres_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Upper bound for one synchronous push delivery call, in seconds
    #[serde(default = "default_push_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Link partner that inbound messages are routed to when the submitted
    /// message does not name a target itself.
    pub default_target: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Emit log lines as JSON instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_body_limit() -> usize {
    16 * 1024 * 1024
}

fn default_client_dn_header() -> String {
    "x-client-cert-dn".to_string()
}

fn default_queue_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_max_redeliveries() -> u32 {
    3
}

fn default_receive_poll_interval() -> u64 {
    250
}

fn default_to_link_queue() -> QueuePairConfig {
    QueuePairConfig::new("to-link")
}

fn default_to_connector_queue() -> QueuePairConfig {
    QueuePairConfig::new("to-connector")
}

fn default_to_cleanup_queue() -> QueuePairConfig {
    QueuePairConfig::new("to-cleanup")
}

fn default_transport_store() -> String {
    "memory".to_string()
}

fn default_push_timeout() -> u64 {
    30
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("queues.backend", "memory")?
            .set_default("queues.redis_url", "redis://localhost:6379")?
            .set_default("queues.max_redeliveries", 3)?
            .set_default("transport.store", "memory")?
            .set_default("push.timeout_seconds", 30)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, QUEUES_REDIS_URL, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_dn_header: default_client_dn_header(),
        }
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
            redis_url: default_redis_url(),
            max_redeliveries: default_max_redeliveries(),
            receive_poll_interval_ms: default_receive_poll_interval(),
            to_link: default_to_link_queue(),
            to_connector: default_to_connector_queue(),
            to_cleanup: default_to_cleanup_queue(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            store: default_transport_store(),
            postgres_url: None,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_push_timeout(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_target: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { json: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);
    }

    #[test]
    fn test_queue_pair_dlq_naming() {
        let pair = QueuePairConfig::new("to-cleanup");
        assert_eq!(pair.name, "to-cleanup");
        assert_eq!(pair.dlq, "DLQ.to-cleanup");
    }

    #[test]
    fn test_three_queue_pairs_configured() {
        let queues = QueuesConfig::default();
        let pairs = queues.pairs();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().all(|p| p.dlq == format!("DLQ.{}", p.name)));
    }
}
