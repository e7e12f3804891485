use std::env;

/// Which bus implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Kafka,
    InMemory,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {source}")]
    InvalidPort {
        key: &'static str,
        source: std::num::ParseIntError,
    },

    #[error("invalid BUS_TYPE: {0} (must be 'kafka' or 'inmemory')")]
    InvalidBusType(String),
}

/// Process configuration, loaded from the environment.
///
/// Every service binary loads the same shape; fields a service does not use
/// (e.g. the database URL outside ingestion) are simply ignored.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub http_port: u16,
    pub metrics_port: u16,
    pub database_url: Option<String>,
    pub kafka_brokers: String,
    pub bus_type: BusType,
    pub notification_topic: String,
    pub email_topic: String,
    pub dlq_topic: String,
    pub provider_events_topic: String,
    pub otlp_endpoint: Option<String>,
    pub ses_endpoint: String,
    pub ses_api_key: String,
    pub sendgrid_endpoint: String,
    pub sendgrid_api_key: String,
}

impl Config {
    pub fn from_env(service: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let http_port = env_port("HTTP_PORT", 8080)?;
        let metrics_port = env_port("METRICS_PORT", http_port + 1000)?;

        let bus_type = match env_or("BUS_TYPE", "kafka").as_str() {
            "kafka" => BusType::Kafka,
            "inmemory" => BusType::InMemory,
            other => return Err(ConfigError::InvalidBusType(other.to_string())),
        };

        Ok(Self {
            service_name: service.to_string(),
            http_port,
            metrics_port,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            kafka_brokers: env_or("KAFKA_BROKERS", "localhost:9092"),
            bus_type,
            notification_topic: env_or("NOTIFICATION_TOPIC", "notifications"),
            email_topic: env_or("EMAIL_TOPIC", "dispatch.email"),
            dlq_topic: env_or("DLQ_TOPIC", "dlq.dispatch.email"),
            provider_events_topic: env_or("PROVIDER_EVENTS_TOPIC", "provider.events"),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            ses_endpoint: env_or("SES_ENDPOINT", "https://ses.local"),
            ses_api_key: env_or("SES_API_KEY", ""),
            sendgrid_endpoint: env_or("SENDGRID_ENDPOINT", "https://sendgrid.local"),
            sendgrid_api_key: env_or("SENDGRID_API_KEY", ""),
        })
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn env_port(key: &'static str, fallback: u16) -> Result<u16, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v
            .parse()
            .map_err(|source| ConfigError::InvalidPort { key, source }),
        _ => Ok(fallback),
    }
}
