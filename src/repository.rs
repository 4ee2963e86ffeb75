mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

use async_trait::async_trait;

use crate::error::ThingsResult;
use crate::query::Conditions;
use crate::thing::Thing;
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct QueryResult<T> {
    pub rows: Vec<T>,
    pub count: u64,
    pub total_count: u64,
    pub limit: u64,
    pub offset: u64,
}

#[async_trait]
pub trait Reader: Send + Sync {
    async fn query_things(&self, conditions: &Conditions) -> ThingsResult<QueryResult<Thing>>;
    async fn query_values(&self, conditions: &Conditions) -> ThingsResult<QueryResult<Value>>;
    async fn get_tags(&self, tenants: &[String]) -> ThingsResult<Vec<String>>;
    /// Things whose referenced-device list contains `device_id`; the
    /// fan-out lookup the ingestion pipeline performs per message.
    async fn things_connected_to(&self, device_id: &str) -> ThingsResult<Vec<Thing>>;
    async fn get_thing(&self, id: &str) -> ThingsResult<Option<Thing>>;
}

#[async_trait]
pub trait Writer: Send + Sync {
    async fn add_thing(&self, thing: Thing) -> ThingsResult<()>;
    async fn update_thing(&self, thing: &Thing) -> ThingsResult<()>;
    async fn delete_thing(&self, id: &str) -> ThingsResult<()>;
    async fn add_value(&self, thing_id: &str, value: Value) -> ThingsResult<()>;
}

pub trait Repository: Reader + Writer {}
impl<T: Reader + Writer> Repository for T {}
