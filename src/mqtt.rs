use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::time::{sleep, Duration};

use crate::config::Config;
use crate::ingest::TelemetryIngestor;
use crate::repository::{Reader, Writer};

/// Publish side of the bus transport, used by the coalescing
/// publisher. Kept as a trait so the publisher can be exercised in
/// tests with a fake.
#[async_trait]
pub trait BusPublisher {
    async fn publish(&self, topic: &str, content_type: &str, payload: serde_json::Value) -> Result<()>;
}

pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> MqttPublisher {
        MqttPublisher { client }
    }
}

#[async_trait]
impl BusPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, content_type: &str, payload: serde_json::Value) -> Result<()> {
        let body = serde_json::json!({
            "contentType": content_type,
            "data": payload,
        });
        let bytes = serde_json::to_vec(&body)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, bytes)
            .await?;
        Ok(())
    }
}

/// Subscribes to `message.accepted` and feeds every delivery to the
/// ingestor. Grounded on the sidecar's `run_listener`: an outer
/// reconnect loop, an inner `eventloop.poll()` loop, short sleeps on
/// subscribe failure before retrying.
pub async fn run_listener<R>(config: Config, ingestor: Arc<TelemetryIngestor<R>>) -> Result<()>
where
    R: Reader + Writer + 'static,
{
    let topic = config.mqtt_ingest_topic.clone();

    loop {
        let mut mqttoptions = MqttOptions::new(
            config.mqtt_client_id.clone(),
            config.mqtt_host.clone(),
            config.mqtt_port,
        );
        mqttoptions.set_keep_alive(config.mqtt_keepalive());
        if let Some(username) = &config.mqtt_username {
            mqttoptions.set_credentials(username.clone(), config.mqtt_password.clone().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 32);

        if let Err(err) = client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
            tracing::warn!(error = %err, "failed to subscribe to ingest topic; retrying");
            sleep(Duration::from_secs(2)).await;
            continue;
        }
        tracing::info!(topic = %topic, "subscribed to ingest feed");

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    if let Err(err) = ingestor.handle_message(&publish.payload[..]).await {
                        tracing::error!(error = %err, "failed to handle inbound message");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "mqtt event loop error; reconnecting");
                    sleep(Duration::from_secs(2)).await;
                    break;
                }
            }
        }
    }
}
