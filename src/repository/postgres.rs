use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder, Row};

use crate::error::{ThingsError, ThingsResult};
use crate::query::{apply_thing_query, apply_value_query, Conditions};
use crate::repository::{QueryResult, Reader, Writer};
use crate::thing::Thing;
use crate::value::Value;

/// Postgres-backed repository. Things are stored with their
/// queryable columns (`id`, `type`, `tenant`, `deleted_on`) promoted
/// out of the JSON body for indexed lookups, the rest of the struct
/// serialized into `data`; this mirrors the sidecar's pattern of
/// keeping a narrow relational core and pushing flexible attributes
/// into a `jsonb` column (`sensors.config` in the teacher).
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub async fn connect(database_url: &str, max_connections: u32) -> ThingsResult<PostgresRepository> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(ThingsError::from)?;
        Ok(PostgresRepository { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_thing(row: &sqlx::postgres::PgRow) -> ThingsResult<Thing> {
        let data: serde_json::Value = row.try_get("data").map_err(ThingsError::from)?;
        serde_json::from_value(data).map_err(|e| ThingsError::Repository(e.to_string()))
    }

    fn row_to_value(row: &sqlx::postgres::PgRow) -> ThingsResult<Value> {
        Ok(Value {
            id: row.try_get("id").map_err(ThingsError::from)?,
            urn: row.try_get("urn").map_err(ThingsError::from)?,
            v: row.try_get("v").map_err(ThingsError::from)?,
            vb: row.try_get("vb").map_err(ThingsError::from)?,
            vs: row.try_get("vs").map_err(ThingsError::from)?,
            unit: row.try_get("unit").map_err(ThingsError::from)?,
            timestamp: row.try_get::<DateTime<Utc>, _>("time").map_err(ThingsError::from)?,
            reference: row.try_get("ref").map_err(ThingsError::from)?,
        })
    }
}

#[async_trait]
impl Reader for PostgresRepository {
    async fn query_things(&self, conditions: &Conditions) -> ThingsResult<QueryResult<Thing>> {
        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT id, type, location, data, tenant, created_on, modified_on, deleted_on FROM things WHERE deleted_on IS NULL");

        if !conditions.tenants.is_empty() {
            qb.push(" AND tenant = ANY(");
            qb.push_bind(conditions.tenants.clone());
            qb.push(")");
        }
        if !conditions.types.is_empty() {
            qb.push(" AND type = ANY(");
            qb.push_bind(conditions.types.clone());
            qb.push(")");
        }
        if let Some(sub_type) = &conditions.sub_type {
            qb.push(" AND data->>'subType' = ");
            qb.push_bind(sub_type.clone());
        }
        if let Some(id) = &conditions.id {
            qb.push(" AND id = ");
            qb.push_bind(id.clone());
        }
        if let Some(device) = &conditions.ref_device {
            qb.push(" AND data->'refDevices' @> to_jsonb(");
            qb.push_bind(device.clone());
            qb.push("::text)");
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(ThingsError::from)?;
        let mut things: Vec<Thing> = rows.iter().map(Self::row_to_thing).collect::<ThingsResult<_>>()?;
        if !conditions.tags.is_empty() {
            things.retain(|t| conditions.tags.iter().all(|tag| t.tags.contains(tag)));
        }
        things.retain(|t| conditions.matches_thing_attributes(t));
        Ok(apply_thing_query(conditions, things))
    }

    async fn query_values(&self, conditions: &Conditions) -> ThingsResult<QueryResult<Value>> {
        let mut qb: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT time, id, urn, v, vb, vs, unit, ref FROM things_values WHERE 1 = 1");

        if let Some(thing_id) = &conditions.thing_id {
            qb.push(" AND id LIKE ");
            qb.push_bind(format!("{thing_id}/%"));
        }
        if !conditions.urns.is_empty() {
            qb.push(" AND urn = ANY(");
            qb.push_bind(conditions.urns.clone());
            qb.push(")");
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(ThingsError::from)?;
        let values: Vec<Value> = rows
            .iter()
            .map(Self::row_to_value)
            .collect::<ThingsResult<Vec<Value>>>()?
            .into_iter()
            .filter(|v| conditions.matches_value(v))
            .collect();
        Ok(apply_value_query(conditions, values))
    }

    async fn get_tags(&self, tenants: &[String]) -> ThingsResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT jsonb_array_elements_text(data->'tags') AS tag
            FROM things
            WHERE deleted_on IS NULL AND (array_length($1::text[], 1) IS NULL OR tenant = ANY($1))
            ORDER BY tag
            "#,
        )
        .bind(tenants)
        .fetch_all(&self.pool)
        .await
        .map_err(ThingsError::from)?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("tag").map_err(ThingsError::from))
            .collect()
    }

    async fn things_connected_to(&self, device_id: &str) -> ThingsResult<Vec<Thing>> {
        let rows = sqlx::query(
            r#"
            SELECT id, type, location, data, tenant, created_on, modified_on, deleted_on
            FROM things
            WHERE deleted_on IS NULL
              AND data->'refDevices' @> to_jsonb($1::text)
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ThingsError::from)?;

        rows.iter().map(Self::row_to_thing).collect()
    }

    async fn get_thing(&self, id: &str) -> ThingsResult<Option<Thing>> {
        let row = sqlx::query(
            "SELECT id, type, location, data, tenant, created_on, modified_on, deleted_on FROM things WHERE id = $1 AND deleted_on IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ThingsError::from)?;

        row.as_ref().map(Self::row_to_thing).transpose()
    }
}

#[async_trait]
impl Writer for PostgresRepository {
    async fn add_thing(&self, thing: Thing) -> ThingsResult<()> {
        if thing.id.is_empty() || thing.tenant.is_empty() {
            return Err(ThingsError::Validation("thing id and tenant are required".into()));
        }
        let data = serde_json::to_value(&thing).map_err(|e| ThingsError::Repository(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO things (id, type, location, data, tenant, created_on, modified_on)
            VALUES ($1, $2, point($3, $4), $5, $6, $7, $7)
            "#,
        )
        .bind(&thing.id)
        .bind(thing.kind().as_str())
        .bind(thing.location.map(|l| l.0).unwrap_or_default())
        .bind(thing.location.map(|l| l.1).unwrap_or_default())
        .bind(data)
        .bind(&thing.tenant)
        .bind(thing.created_on)
        .execute(&self.pool)
        .await
        .map_err(ThingsError::from)?;
        Ok(())
    }

    async fn update_thing(&self, thing: &Thing) -> ThingsResult<()> {
        let data = serde_json::to_value(thing).map_err(|e| ThingsError::Repository(e.to_string()))?;
        let result = sqlx::query(
            r#"
            UPDATE things
            SET data = $2, modified_on = $3
            WHERE id = $1 AND deleted_on IS NULL
            "#,
        )
        .bind(&thing.id)
        .bind(data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(ThingsError::from)?;

        if result.rows_affected() == 0 {
            return Err(ThingsError::NotFound(thing.id.clone()));
        }
        Ok(())
    }

    async fn delete_thing(&self, id: &str) -> ThingsResult<()> {
        let result = sqlx::query("UPDATE things SET deleted_on = now() WHERE id = $1 AND deleted_on IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ThingsError::from)?;
        if result.rows_affected() == 0 {
            return Err(ThingsError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn add_value(&self, thing_id: &str, value: Value) -> ThingsResult<()> {
        if value.id.is_empty() || value.urn.is_empty() || !value.has_payload_for_repo() {
            return Err(ThingsError::Validation("value missing id, urn or payload".into()));
        }
        if value.timestamp.timestamp() == 0 {
            return Err(ThingsError::Validation("value has zero timestamp".into()));
        }
        let _ = thing_id;
        sqlx::query(
            r#"
            INSERT INTO things_values (time, id, urn, v, vb, vs, unit, ref)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (time, id) DO NOTHING
            "#,
        )
        .bind(value.timestamp)
        .bind(&value.id)
        .bind(&value.urn)
        .bind(value.v)
        .bind(value.vb)
        .bind(&value.vs)
        .bind(&value.unit)
        .bind(&value.reference)
        .execute(&self.pool)
        .await
        .map_err(ThingsError::from)?;
        Ok(())
    }
}
