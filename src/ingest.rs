use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};

use crate::repository::{Reader, Writer};
use crate::value::{Measurement, Value};

/// Raw SenML-like record as carried in an inbound pack. `name` is
/// either `"0"` (the header record, whose `string_value` is the
/// object URN and whose name-prefix up to the first `/` is the
/// device id) or `<deviceId>/<objectId>/<resourceId>`.
#[derive(Debug, Clone, Deserialize)]
struct SenmlRecord {
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "u")]
    unit: Option<String>,
    #[serde(rename = "v")]
    value: Option<f64>,
    #[serde(rename = "vb")]
    bool_value: Option<bool>,
    #[serde(rename = "vs")]
    string_value: Option<String>,
    #[serde(rename = "t")]
    time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SenmlEnvelope {
    pack: Vec<SenmlRecord>,
    timestamp: DateTime<Utc>,
}

/// Converts an inbound pack into raw measurements. The header record
/// (`name == "0"`) supplies the URN attached to every other record and
/// is itself never turned into a Measurement. Records with neither a
/// numeric nor boolean value are skipped.
fn pack_to_measurements(envelope: &SenmlEnvelope) -> Vec<Measurement> {
    let urn = envelope
        .pack
        .iter()
        .find(|r| r.name == "0")
        .and_then(|r| r.string_value.clone());

    let Some(urn) = urn else {
        return Vec::new();
    };

    envelope
        .pack
        .iter()
        .filter(|r| r.name != "0")
        .filter(|r| r.value.is_some() || r.bool_value.is_some())
        .map(|r| {
            let timestamp = r
                .time
                .and_then(|t| Utc.timestamp_opt(t as i64, 0).single())
                .unwrap_or(envelope.timestamp);
            Measurement {
                id: r.name.clone(),
                urn: urn.clone(),
                v: r.value,
                vb: r.bool_value,
                vs: r.string_value.clone(),
                unit: r.unit.clone(),
                timestamp,
            }
        })
        .collect()
}

fn device_id_of(measurements: &[Measurement]) -> Option<String> {
    measurements.first().map(|m| m.device_id().to_string())
}

/// Serializes the full ingest-and-dispatch sequence behind a single
/// process-wide lock, the deliberate single-writer guarantee carried
/// over from the sidecar's `Arc<Mutex<IngestState>>`.
pub struct TelemetryIngestor<R> {
    repository: Arc<R>,
    lock: Mutex<()>,
    publish_tx: mpsc::Sender<String>,
}

impl<R> TelemetryIngestor<R>
where
    R: Reader + Writer,
{
    pub fn new(repository: Arc<R>, publish_tx: mpsc::Sender<String>) -> TelemetryIngestor<R> {
        TelemetryIngestor {
            repository,
            lock: Mutex::new(()),
            publish_tx,
        }
    }

    /// Entry point for one inbound `message.accepted` payload.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<()> {
        let mut owned = payload.to_vec();
        let envelope: SenmlEnvelope =
            simd_json::serde::from_slice(&mut owned).context("invalid senml envelope")?;

        let measurements = pack_to_measurements(&envelope);
        if measurements.is_empty() {
            tracing::debug!("pack produced no measurements, dropping");
            return Ok(());
        }

        let Some(device_id) = device_id_of(&measurements) else {
            tracing::debug!("pack missing device id, dropping");
            return Ok(());
        };

        let _guard = self.lock.lock().await;

        let things = self
            .repository
            .things_connected_to(&device_id)
            .await
            .context("looking up things connected to device")?;
        if things.is_empty() {
            tracing::trace!(device = %device_id, "no things reference this device");
            return Ok(());
        }

        for mut thing in things {
            let thing_id = thing.id.clone();

            let mut emitted: Vec<Value> = Vec::new();
            if let Err(e) = thing.handle(&measurements, &mut |value| {
                emitted.push(value);
                Ok(())
            }) {
                tracing::warn!(thing = %thing_id, error = %e, "error handling measurements for thing");
            }

            for value in emitted {
                if let Err(e) = self.repository.add_value(&thing_id, value).await {
                    tracing::warn!(thing = %thing_id, error = %e, "failed to persist derived value");
                }
            }

            thing.set_last_observed(&measurements);

            if let Err(e) = self.repository.update_thing(&thing).await {
                tracing::warn!(thing = %thing_id, error = %e, "failed to save thing, skipping notification");
                continue;
            }

            if let Err(e) = self.publish_tx.send(thing_id.clone()).await {
                tracing::warn!(thing = %thing_id, error = %e, "failed to enqueue change notification");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::thing::{ReferencedDevice, Thing, ThingKind};
    use std::collections::HashMap;

    fn envelope_json(device: &str, urn: &str, value: f64, ts: DateTime<Utc>) -> Vec<u8> {
        format!(
            r#"{{"pack":[{{"n":"0","vs":"{urn}"}},{{"n":"{device}/3330/5700","v":{value}}}],"timestamp":"{}"}}"#,
            ts.to_rfc3339()
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn ingest_container_fill_updates_thing_and_enqueues_notification() {
        let repo = Arc::new(InMemoryRepository::new());
        let now = Utc::now();
        let mut thing = Thing::new("container-1", "default", ThingKind::Container, now);
        thing.ref_devices.push(ReferencedDevice {
            id: "dev-1".into(),
            measurements: HashMap::new(),
        });
        if let crate::thing::ThingState::Container(ref mut c) = thing.state {
            c.level.max_distance = Some(3.0);
            c.level.max_level = Some(2.8);
        }
        repo.add_thing(thing).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let ingestor = TelemetryIngestor::new(repo.clone(), tx);

        let payload = envelope_json("dev-1", crate::value::urn::DISTANCE, 2.51, now);
        ingestor.handle_message(&payload).await.unwrap();

        let saved = repo.get_thing("container-1").await.unwrap().unwrap();
        match saved.state {
            crate::thing::ThingState::Container(c) => {
                assert!((c.level.current_level - 0.49).abs() < 1e-9);
            }
            _ => panic!("wrong variant"),
        }

        let notified = rx.try_recv().unwrap();
        assert_eq!(notified, "container-1");
    }

    #[tokio::test]
    async fn unknown_device_is_dropped_without_error() {
        let repo = Arc::new(InMemoryRepository::new());
        let (tx, _rx) = mpsc::channel(8);
        let ingestor = TelemetryIngestor::new(repo, tx);
        let payload = envelope_json("unknown-dev", crate::value::urn::DISTANCE, 1.0, Utc::now());
        ingestor.handle_message(&payload).await.unwrap();
    }
}
