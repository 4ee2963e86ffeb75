use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time;

use crate::mqtt::BusPublisher;
use crate::repository::Reader;
use crate::thing::Thing;

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);
const TICK_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct ThingUpdated<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub thing: &'a Thing,
    pub tenant: &'a str,
    pub timestamp: DateTime<Utc>,
}

/// Debounces per-thing change signals from the ingestion pipeline and
/// republishes a single `thing.updated` event once a thing has been
/// quiet for `DEBOUNCE_WINDOW`. Grounded directly on the sidecar's
/// `spawn_worker` (`pipeline.rs`): same `tokio::select!` over a
/// ticker and an mpsc receiver, adapted from batch-by-size to
/// debounce-by-id.
pub fn spawn<R, P>(
    repository: Arc<R>,
    publisher: Arc<P>,
    mut rx: mpsc::Receiver<String>,
) -> tokio::task::JoinHandle<()>
where
    R: Reader + Send + Sync + 'static,
    P: BusPublisher + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut not_before: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut ticker = time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                maybe_id = rx.recv() => {
                    match maybe_id {
                        Some(id) => {
                            let deadline = Utc::now() + chrono::Duration::from_std(DEBOUNCE_WINDOW).unwrap();
                            not_before.insert(id, deadline);
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    let ready: Vec<String> = not_before
                        .iter()
                        .filter(|(_, deadline)| **deadline <= now)
                        .map(|(id, _)| id.clone())
                        .collect();

                    for id in ready {
                        not_before.remove(&id);
                        match repository.get_thing(&id).await {
                            Ok(Some(thing)) => {
                                let message = ThingUpdated {
                                    id: &thing.id,
                                    kind: thing.kind().as_str(),
                                    thing: &thing,
                                    tenant: &thing.tenant,
                                    timestamp: now,
                                };
                                let topic = "thing.updated";
                                let content_type = format!(
                                    "application/vnd.diwise.{}+json",
                                    thing.kind().as_str().to_lowercase()
                                );
                                let payload = match serde_json::to_value(&message) {
                                    Ok(payload) => payload,
                                    Err(e) => {
                                        tracing::warn!(thing = %id, error = %e, "failed to serialize change notification");
                                        continue;
                                    }
                                };
                                if let Err(e) = publisher.publish(topic, &content_type, payload).await {
                                    tracing::warn!(thing = %id, error = %e, "failed to publish change notification, retaining for next tick");
                                    not_before.insert(id, now + chrono::Duration::from_std(DEBOUNCE_WINDOW).unwrap());
                                }
                            }
                            Ok(None) => {
                                tracing::debug!(thing = %id, "thing vanished before publish, dropping");
                            }
                            Err(e) => {
                                tracing::warn!(thing = %id, error = %e, "failed to re-read thing, retrying next tick");
                                not_before.insert(id, now + chrono::Duration::from_std(DEBOUNCE_WINDOW).unwrap());
                            }
                        }
                    }
                }
            }
        }
    })
}
