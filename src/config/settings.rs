use std::env;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::websocket::KeepaliveConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Whether per-session subscriptions narrow delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryPolicy {
    /// Every session receives every event; subscriptions are only recorded
    #[default]
    Broadcast,
    /// Topic-tagged events only reach sessions subscribed to that topic
    Subscribed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Capacity of the router's inbound publish queue
    #[serde(default = "default_queue_capacity")]
    pub router_queue_capacity: usize,
    /// Capacity of each session's outbound queue; overflowing it evicts the session
    #[serde(default = "default_queue_capacity")]
    pub session_queue_capacity: usize,
    #[serde(default)]
    pub delivery_policy: DeliveryPolicy,
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_session: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Ping interval in seconds, must be shorter than `pong_timeout`
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Read liveness deadline in seconds
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout: u64,
    /// Deadline for a single write to the socket, in seconds
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,
    /// Largest inbound frame accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_subscriptions() -> usize {
    100
}

fn default_ping_interval() -> u64 {
    54
}

fn default_pong_timeout() -> u64 {
    60
}

fn default_write_timeout() -> u64 {
    10
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "taskboard-hub".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("hub.router_queue_capacity", default_queue_capacity() as i64)?
            .set_default("hub.session_queue_capacity", default_queue_capacity() as i64)?
            .set_default("websocket.ping_interval", default_ping_interval() as i64)?
            .set_default("websocket.pong_timeout", default_pong_timeout() as i64)?
            .set_default("websocket.write_timeout", default_write_timeout() as i64)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // TASKBOARD_SERVER__PORT, TASKBOARD_HUB__DELIVERY_POLICY, ...
            .add_source(
                Environment::with_prefix("TASKBOARD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.websocket.keepalive().is_valid() {
            return Err(ConfigError::Message(format!(
                "websocket.ping_interval ({}s) must be positive and shorter than websocket.pong_timeout ({}s)",
                self.websocket.ping_interval, self.websocket.pong_timeout
            )));
        }
        if self.hub.router_queue_capacity == 0 || self.hub.session_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "hub queue capacities must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl WebSocketConfig {
    pub fn keepalive(&self) -> KeepaliveConfig {
        KeepaliveConfig {
            ping_interval: Duration::from_secs(self.ping_interval),
            pong_timeout: Duration::from_secs(self.pong_timeout),
            write_timeout: Duration::from_secs(self.write_timeout),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            router_queue_capacity: default_queue_capacity(),
            session_queue_capacity: default_queue_capacity(),
            delivery_policy: DeliveryPolicy::default(),
            max_subscriptions_per_session: default_max_subscriptions(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval: default_ping_interval(),
            pong_timeout: default_pong_timeout(),
            write_timeout: default_write_timeout(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            server: ServerConfig::default(),
            hub: HubConfig::default(),
            websocket: WebSocketConfig::default(),
            otel: OtelConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        let settings = settings();
        assert_eq!(settings.server_addr(), "0.0.0.0:8080");
        assert_eq!(settings.hub.session_queue_capacity, 256);
        assert_eq!(settings.hub.router_queue_capacity, 256);
        assert_eq!(settings.hub.delivery_policy, DeliveryPolicy::Broadcast);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_keepalive_conversion() {
        let keepalive = WebSocketConfig::default().keepalive();
        assert_eq!(keepalive.ping_interval, Duration::from_secs(54));
        assert_eq!(keepalive.pong_timeout, Duration::from_secs(60));
        assert_eq!(keepalive.write_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_ping_must_be_shorter_than_deadline() {
        let mut settings = settings();
        settings.websocket.ping_interval = 60;
        assert!(settings.validate().is_err());

        settings.websocket.ping_interval = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut settings = settings();
        settings.hub.session_queue_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_delivery_policy_deserialize() {
        let policy: DeliveryPolicy = serde_json::from_str("\"subscribed\"").unwrap();
        assert_eq!(policy, DeliveryPolicy::Subscribed);
    }
}
