use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use things_engine::config::Config;
use things_engine::ingest::TelemetryIngestor;
use things_engine::mqtt::{self, MqttPublisher};
use things_engine::publisher;
use things_engine::repository::PostgresRepository;

fn init_tracing() -> Result<()> {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,things_engine=info".into());
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing()?;

    let repository = Arc::new(PostgresRepository::connect(&config.database_url, config.database_max_connections).await?);

    let (publish_tx, publish_rx) = mpsc::channel::<String>(256);
    let ingestor = Arc::new(TelemetryIngestor::new(repository.clone(), publish_tx));

    let mut mqttoptions = rumqttc::MqttOptions::new(config.mqtt_client_id.clone(), config.mqtt_host.clone(), config.mqtt_port);
    mqttoptions.set_keep_alive(config.mqtt_keepalive());
    if let Some(username) = &config.mqtt_username {
        mqttoptions.set_credentials(username.clone(), config.mqtt_password.clone().unwrap_or_default());
    }
    let (publish_client, mut publish_eventloop) = rumqttc::AsyncClient::new(mqttoptions, 32);
    tokio::spawn(async move {
        loop {
            if publish_eventloop.poll().await.is_err() {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
        }
    });
    let bus_publisher = Arc::new(MqttPublisher::new(publish_client));

    let publisher_handle = publisher::spawn(repository.clone(), bus_publisher, publish_rx);

    let mqtt_config = config.clone();
    let mqtt_handle = {
        let ingestor = ingestor.clone();
        tokio::spawn(async move { mqtt::run_listener(mqtt_config, ingestor).await })
    };

    tokio::select! {
        res = mqtt_handle => {
            if let Err(err) = res {
                tracing::error!(error = %err, "mqtt listener task failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    publisher_handle.abort();

    Ok(())
}
