use std::env;

// ============================================================================
// Configuration
// ============================================================================
//
// Everything routable is environment-driven; only DATABASE_URL has no
// sensible default. Assembled once at startup and passed down explicitly.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub kafka_brokers: String,
    pub order_events_topic: String,
    pub consumer_group: String,
    pub metrics_port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            kafka_brokers: env_or("KAFKA_BROKERS", "127.0.0.1:9092"),
            order_events_topic: env_or("ORDER_EVENTS_TOPIC", "order-events"),
            consumer_group: env_or("CONSUMER_GROUP", "order-notifications"),
            metrics_port: parse_u16("METRICS_PORT", 9090)?,
        })
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_u16(name: &'static str, default: u16) -> Result<u16, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
