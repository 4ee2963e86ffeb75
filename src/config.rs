use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Environment-driven configuration, following the sidecar's
/// `Config::from_env()` shape: `dotenvy::dotenv()` first, then a
/// small fallback chain per variable, with `anyhow::Context` on the
/// variables that have no sane default.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,

    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_keepalive_secs: u64,
    pub mqtt_ingest_topic: String,
    pub mqtt_publish_topic: String,

    pub types_catalogue_path: Option<String>,
}

fn env_or(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary).ok().or_else(|| std::env::var(fallback).ok())
}

impl Config {
    pub fn from_env() -> Result<Config> {
        dotenv().ok();

        let database_url = env_or("THINGS_DATABASE_URL", "DATABASE_URL")
            .context("THINGS_DATABASE_URL (or DATABASE_URL) must be set")?;

        let database_max_connections = std::env::var("THINGS_DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let mqtt_host = std::env::var("THINGS_MQTT_HOST").unwrap_or_else(|_| "localhost".to_string());
        let mqtt_port = std::env::var("THINGS_MQTT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1883);
        let mqtt_client_id =
            std::env::var("THINGS_MQTT_CLIENT_ID").unwrap_or_else(|_| "things-engine".to_string());
        let mqtt_username = std::env::var("THINGS_MQTT_USERNAME").ok();
        let mqtt_password = std::env::var("THINGS_MQTT_PASSWORD").ok();
        let mqtt_keepalive_secs = std::env::var("THINGS_MQTT_KEEPALIVE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let mqtt_ingest_topic =
            std::env::var("THINGS_MQTT_INGEST_TOPIC").unwrap_or_else(|_| "message.accepted".to_string());
        let mqtt_publish_topic =
            std::env::var("THINGS_MQTT_PUBLISH_TOPIC").unwrap_or_else(|_| "thing.updated".to_string());

        let types_catalogue_path = std::env::var("THINGS_TYPES_CATALOGUE_PATH").ok();

        Ok(Config {
            database_url,
            database_max_connections,
            mqtt_host,
            mqtt_port,
            mqtt_client_id,
            mqtt_username,
            mqtt_password,
            mqtt_keepalive_secs,
            mqtt_ingest_topic,
            mqtt_publish_topic,
            types_catalogue_path,
        })
    }

    pub fn mqtt_keepalive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keepalive_secs)
    }
}
