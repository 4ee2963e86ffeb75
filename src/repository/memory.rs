use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{ThingsError, ThingsResult};
use crate::query::{apply_thing_query, apply_value_query, Conditions};
use crate::repository::{QueryResult, Reader, Writer};
use crate::thing::Thing;
use crate::value::Value;

/// An in-process store used by this crate's own test suite and
/// suitable as a fake repository for downstream integration tests.
/// Grounded on the same `Reader`/`Writer` contract the Postgres
/// adapter implements, kept behind a single `RwLock` the way the
/// sidecar's `Arc<Mutex<IngestState>>` guards its in-memory maps.
#[derive(Default)]
pub struct InMemoryRepository {
    things: RwLock<HashMap<String, Thing>>,
    values: RwLock<Vec<(String, Value)>>,
}

impl InMemoryRepository {
    pub fn new() -> InMemoryRepository {
        InMemoryRepository::default()
    }
}

fn thing_visible(thing: &Thing, conditions: &Conditions) -> bool {
    if thing.deleted_on.is_some() {
        return false;
    }
    if !conditions.tenants.is_empty() && !conditions.tenants.contains(&thing.tenant) {
        return false;
    }
    if !conditions.types.is_empty() && !conditions.types.contains(&thing.kind().as_str().to_string()) {
        return false;
    }
    if let Some(sub_type) = &conditions.sub_type {
        if thing.sub_type.as_ref() != Some(sub_type) {
            return false;
        }
    }
    if let Some(id) = &conditions.id {
        if &thing.id != id {
            return false;
        }
    }
    if let Some(device) = &conditions.ref_device {
        if !thing.is_connected_to(device) {
            return false;
        }
    }
    if !conditions.tags.is_empty() && !conditions.tags.iter().all(|t| thing.tags.contains(t)) {
        return false;
    }
    true
}

#[async_trait]
impl Reader for InMemoryRepository {
    async fn query_things(&self, conditions: &Conditions) -> ThingsResult<QueryResult<Thing>> {
        let things = self.things.read().await;
        let matched: Vec<Thing> = things
            .values()
            .filter(|t| thing_visible(t, conditions) && conditions.matches_thing_attributes(t))
            .cloned()
            .collect();
        Ok(apply_thing_query(conditions, matched))
    }

    async fn query_values(&self, conditions: &Conditions) -> ThingsResult<QueryResult<Value>> {
        let values = self.values.read().await;
        let matched: Vec<Value> = values
            .iter()
            .map(|(_, v)| v.clone())
            .filter(|v| conditions.matches_value(v))
            .collect();
        Ok(apply_value_query(conditions, matched))
    }

    async fn get_tags(&self, tenants: &[String]) -> ThingsResult<Vec<String>> {
        let things = self.things.read().await;
        let mut tags: Vec<String> = things
            .values()
            .filter(|t| t.deleted_on.is_none() && (tenants.is_empty() || tenants.contains(&t.tenant)))
            .flat_map(|t| t.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    async fn things_connected_to(&self, device_id: &str) -> ThingsResult<Vec<Thing>> {
        let things = self.things.read().await;
        Ok(things
            .values()
            .filter(|t| t.deleted_on.is_none() && t.is_connected_to(device_id))
            .cloned()
            .collect())
    }

    async fn get_thing(&self, id: &str) -> ThingsResult<Option<Thing>> {
        let things = self.things.read().await;
        Ok(things.get(id).filter(|t| t.deleted_on.is_none()).cloned())
    }
}

#[async_trait]
impl Writer for InMemoryRepository {
    async fn add_thing(&self, thing: Thing) -> ThingsResult<()> {
        let mut things = self.things.write().await;
        if things.contains_key(&thing.id) {
            return Err(ThingsError::AlreadyExists(thing.id));
        }
        things.insert(thing.id.clone(), thing);
        Ok(())
    }

    async fn update_thing(&self, thing: &Thing) -> ThingsResult<()> {
        let mut things = self.things.write().await;
        let mut updated = thing.clone();
        updated.modified_on = Utc::now();
        things.insert(thing.id.clone(), updated);
        Ok(())
    }

    async fn delete_thing(&self, id: &str) -> ThingsResult<()> {
        let mut things = self.things.write().await;
        match things.get_mut(id) {
            Some(thing) => {
                thing.deleted_on = Some(Utc::now());
                Ok(())
            }
            None => Err(ThingsError::NotFound(id.to_string())),
        }
    }

    async fn add_value(&self, thing_id: &str, value: Value) -> ThingsResult<()> {
        if value.id.is_empty() || value.urn.is_empty() || !value.has_payload_for_repo() {
            return Err(ThingsError::Validation("value missing id, urn or payload".into()));
        }
        if value.timestamp.timestamp() == 0 {
            return Err(ThingsError::Validation("value has zero timestamp".into()));
        }
        let mut values = self.values.write().await;
        let key = format!("{}@{}", value.id, value.timestamp.timestamp_nanos_opt().unwrap_or_default());
        if values.iter().any(|(k, _)| k == &key) {
            return Ok(());
        }
        let _ = thing_id;
        values.push((key, value));
        Ok(())
    }
}
