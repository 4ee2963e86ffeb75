use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::repository::QueryResult;
use crate::thing::Thing;
use crate::value::Value;

/// A flat multi-valued query-string-shaped parameter map, the wire
/// shape the condition builder normalizes and type-checks.
pub type RawParams = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRelation {
    Before,
    After,
    Between,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Hour,
    Day,
}

#[derive(Debug, Clone)]
pub struct AttributePredicate {
    pub field: String,
    pub op: Comparator,
    pub value: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Conditions {
    pub id: Option<String>,
    pub tenants: Vec<String>,
    pub types: Vec<String>,
    pub sub_type: Option<String>,
    pub tags: Vec<String>,
    pub ref_device: Option<String>,
    pub thing_id: Option<String>,
    pub urns: Vec<String>,
    pub time_rel: Option<TimeRelation>,
    pub time_at: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time_at: Option<chrono::DateTime<chrono::Utc>>,
    pub numeric: Option<(Comparator, f64)>,
    pub boolean: Option<bool>,
    pub n: Option<String>,
    pub offset: u64,
    pub limit: u64,
    pub attributes: Vec<AttributePredicate>,
    pub time_unit: Option<TimeUnit>,
    pub latest: bool,
    pub distinct: Option<String>,
}

const DEFAULT_LIMIT: u64 = 100;
const DEFAULT_PAGE_SIZE: u64 = 10;

/// Normalizes a raw key the way the builder does: lower-cased,
/// underscores stripped, `v` aliased to `value`.
fn normalize_key(key: &str) -> String {
    let lower = key.to_lowercase().replace('_', "");
    if lower == "v" {
        "value".to_string()
    } else {
        lower
    }
}

fn first<'a>(params: &'a RawParams, key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| normalize_key(k) == key)
        .and_then(|(_, v)| v.first())
        .map(String::as_str)
}

fn list(params: &RawParams, key: &str) -> Vec<String> {
    params
        .iter()
        .find(|(k, _)| normalize_key(k) == key)
        .map(|(_, v)| {
            v.iter()
                .flat_map(|s| s.split(','))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Conditions {
    /// Parses the flat parameter map into a typed condition set,
    /// applying every normalization and default in §4.6.
    pub fn from_params(params: &RawParams) -> Conditions {
        let op_from_str = |s: &str| -> Comparator {
            match s.to_lowercase().as_str() {
                "ne" => Comparator::Ne,
                "gt" => Comparator::Gt,
                "lt" => Comparator::Lt,
                _ => Comparator::Eq,
            }
        };

        let mut offset = first(params, "offset")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let mut limit = first(params, "limit")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_LIMIT);

        if let Some(page_size) = first(params, "page[size]").and_then(|s| s.parse::<u64>().ok()) {
            limit = page_size;
            if let Some(page_number) = first(params, "page[number]").and_then(|s| s.parse::<u64>().ok()) {
                offset = page_number.saturating_sub(1) * page_size;
            }
        } else if first(params, "page[number]").is_some() {
            let page_number = first(params, "page[number]").and_then(|s| s.parse::<u64>().ok()).unwrap_or(1);
            offset = page_number.saturating_sub(1) * DEFAULT_PAGE_SIZE;
            limit = DEFAULT_PAGE_SIZE;
        }

        let numeric = match (first(params, "value"), first(params, "op")) {
            (Some(v), op) => v.parse::<f64>().ok().map(|val| {
                let comparator = op.map(op_from_str).unwrap_or(Comparator::Eq);
                (comparator, val)
            }),
            _ => None,
        };

        let attributes: Vec<AttributePredicate> = params
            .iter()
            .filter_map(|(k, v)| {
                let normalized = normalize_key(k);
                if let Some(field) = normalized.strip_prefix("v[").and_then(|s| s.strip_suffix(']')) {
                    let val = v.first()?.parse::<f64>().ok()?;
                    Some(AttributePredicate {
                        field: field.to_string(),
                        op: Comparator::Gt,
                        value: val,
                    })
                } else {
                    None
                }
            })
            .collect();

        Conditions {
            id: first(params, "id").map(str::to_string),
            tenants: list(params, "tenant"),
            types: list(params, "type"),
            sub_type: first(params, "subtype").map(str::to_string),
            tags: list(params, "tags"),
            ref_device: first(params, "refdevice").map(str::to_string),
            thing_id: first(params, "thingid").map(str::to_string),
            urns: list(params, "urn"),
            time_rel: first(params, "timerel").map(|s| match s.to_lowercase().as_str() {
                "after" => TimeRelation::After,
                "between" => TimeRelation::Between,
                _ => TimeRelation::Before,
            }),
            time_at: first(params, "timeat").and_then(|s| s.parse().ok()),
            end_time_at: first(params, "endtimeat").and_then(|s| s.parse().ok()),
            numeric,
            boolean: first(params, "vb").and_then(|s| s.parse::<bool>().ok()),
            n: first(params, "n").map(str::to_string),
            offset,
            limit,
            attributes,
            time_unit: first(params, "timeunit").map(|s| match s.to_lowercase().as_str() {
                "hour" => TimeUnit::Hour,
                _ => TimeUnit::Day,
            }),
            latest: first(params, "latest").map(|s| s == "true").unwrap_or(false),
            distinct: first(params, "distinct").map(str::to_string),
        }
    }
}

fn matches_comparator(op: Comparator, value: f64, threshold: f64) -> bool {
    match op {
        Comparator::Eq => (value - threshold).abs() < f64::EPSILON,
        Comparator::Ne => (value - threshold).abs() >= f64::EPSILON,
        Comparator::Gt => value > threshold,
        Comparator::Lt => value < threshold,
    }
}

/// String representation of a value's named scalar field, used by the
/// `distinct` transition filter to compare consecutive rows.
fn field_repr(v: &Value, field: &str) -> Option<String> {
    match field {
        "vb" => v.vb.map(|b| b.to_string()),
        "v" | "value" => v.v.map(|n| n.to_string()),
        "vs" => v.vs.clone(),
        _ => None,
    }
}

fn bucket_start(ts: DateTime<Utc>, unit: TimeUnit) -> DateTime<Utc> {
    use chrono::Timelike;
    match unit {
        TimeUnit::Hour => ts.date_naive().and_hms_opt(ts.hour(), 0, 0).unwrap().and_utc(),
        TimeUnit::Day => ts.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
    }
}

impl Conditions {
    /// Row-level predicate for a values query: everything in §4.6
    /// except pagination/ordering/special planners, which `apply_value_query` handles.
    pub fn matches_value(&self, v: &Value) -> bool {
        if let Some(thing_id) = &self.thing_id {
            if !v.id.starts_with(&format!("{thing_id}/")) {
                return false;
            }
        }
        if !self.urns.is_empty() && !self.urns.contains(&v.urn) {
            return false;
        }
        if let Some((op, threshold)) = self.numeric {
            match v.v {
                Some(val) if matches_comparator(op, val, threshold) => {}
                _ => return false,
            }
        }
        if let Some(vb) = self.boolean {
            if v.vb != Some(vb) {
                return false;
            }
        }
        if let Some(n) = &self.n {
            if !v.id.ends_with(&format!("/{n}")) {
                return false;
            }
        }
        if let Some(rel) = self.time_rel {
            match rel {
                TimeRelation::Before => {
                    if let Some(at) = self.time_at {
                        if v.timestamp >= at {
                            return false;
                        }
                    }
                }
                TimeRelation::After => {
                    if let Some(at) = self.time_at {
                        if v.timestamp <= at {
                            return false;
                        }
                    }
                }
                TimeRelation::Between => {
                    if let Some(start) = self.time_at {
                        if v.timestamp < start {
                            return false;
                        }
                    }
                    if let Some(end) = self.end_time_at {
                        if v.timestamp > end {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Row-level predicate for a things query: `v[field]` numeric
    /// predicates against the thing's own serialized JSON attributes.
    pub fn matches_thing_attributes(&self, thing: &Thing) -> bool {
        if self.attributes.is_empty() {
            return true;
        }
        let json = match serde_json::to_value(thing) {
            Ok(json) => json,
            Err(_) => return false,
        };
        self.attributes.iter().all(|pred| {
            json.get(&pred.field)
                .and_then(|v| v.as_f64())
                .map(|val| matches_comparator(pred.op, val, pred.value))
                .unwrap_or(false)
        })
    }
}

/// Applies ordering, the latest/distinct/time-bucket special planners
/// (mutually exclusive per §4.6) and pagination to an already
/// row-filtered (`matches_value`) set of values. Shared by every
/// `Reader` adapter so the filters in this module are never dead code.
pub fn apply_value_query(conditions: &Conditions, mut matched: Vec<Value>) -> QueryResult<Value> {
    matched.sort_by_key(|v| v.timestamp);

    if conditions.latest {
        let mut latest_per_id: HashMap<String, Value> = HashMap::new();
        for v in matched {
            latest_per_id
                .entry(v.id.clone())
                .and_modify(|existing| {
                    if v.timestamp > existing.timestamp {
                        *existing = v.clone();
                    }
                })
                .or_insert(v);
        }
        let rows: Vec<Value> = latest_per_id.into_values().collect();
        let count = rows.len() as u64;
        return QueryResult { rows, count, total_count: count, limit: conditions.limit, offset: 0 };
    }

    if let Some(field) = &conditions.distinct {
        let mut rows: Vec<Value> = Vec::new();
        let mut previous: Option<String> = None;
        for v in matched {
            let repr = field_repr(&v, field);
            if previous != repr {
                previous = repr.clone();
                rows.push(v);
            }
        }
        let count = rows.len() as u64;
        return QueryResult { rows, count, total_count: count, limit: conditions.limit, offset: 0 };
    }

    if let Some(unit) = conditions.time_unit {
        let mut buckets: HashMap<(DateTime<Utc>, String, Option<String>), i64> = HashMap::new();
        for v in &matched {
            let key = (bucket_start(v.timestamp, unit), v.id.clone(), v.reference.clone());
            *buckets.entry(key).or_insert(0) += 1;
        }
        let mut rows: Vec<Value> = buckets
            .into_iter()
            .map(|((bucket, id, reference), count)| Value {
                id,
                urn: String::new(),
                v: Some(count as f64),
                vb: None,
                vs: None,
                unit: None,
                timestamp: bucket,
                reference,
            })
            .collect();
        rows.sort_by_key(|v| v.timestamp);
        let count = rows.len() as u64;
        return QueryResult { rows, count, total_count: count, limit: conditions.limit, offset: 0 };
    }

    let total = matched.len() as u64;
    let page: Vec<Value> = matched
        .into_iter()
        .skip(conditions.offset as usize)
        .take(conditions.limit as usize)
        .collect();
    let count = page.len() as u64;
    QueryResult { rows: page, count, total_count: total, limit: conditions.limit, offset: conditions.offset }
}

/// Applies the `(type, subType, name)` ordering and pagination to an
/// already row-filtered (`thing_visible` + `matches_thing_attributes`)
/// set of things.
pub fn apply_thing_query(conditions: &Conditions, mut matched: Vec<Thing>) -> QueryResult<Thing> {
    matched.sort_by(|a, b| (a.kind().as_str(), &a.sub_type, &a.name).cmp(&(b.kind().as_str(), &b.sub_type, &b.name)));
    let total = matched.len() as u64;
    let page: Vec<Thing> = matched
        .into_iter()
        .skip(conditions.offset as usize)
        .take(conditions.limit as usize)
        .collect();
    let count = page.len() as u64;
    QueryResult { rows: page, count, total_count: total, limit: conditions.limit, offset: conditions.offset }
}

/// Algebraic storage-level plan a backend renders to SQL (or an
/// equivalent query language).
#[derive(Debug, Clone)]
pub enum QueryPlan {
    Filter(Conditions),
    Paginate { inner: Box<QueryPlan>, offset: u64, limit: u64 },
    OrderBy { inner: Box<QueryPlan>, by: Vec<&'static str> },
    GroupByTimeBucket { inner: Box<QueryPlan>, unit: TimeUnit },
    DistinctByColumn { inner: Box<QueryPlan>, column: String },
    LatestPerId { inner: Box<QueryPlan> },
}

/// Builds the storage plan for a thing query: filter then a stable
/// `(type, subType, name)` ordering.
pub fn plan_things(conditions: Conditions) -> QueryPlan {
    let offset = conditions.offset;
    let limit = conditions.limit;
    let filter = QueryPlan::Filter(conditions);
    QueryPlan::Paginate {
        inner: Box::new(QueryPlan::OrderBy {
            inner: Box::new(filter),
            by: vec!["type", "subType", "name"],
        }),
        offset,
        limit,
    }
}

/// Builds the storage plan for a values query, choosing among the
/// latest/distinct/time-bucket/plain-paginated planners per §4.6.
pub fn plan_values(conditions: Conditions) -> QueryPlan {
    if conditions.latest {
        return QueryPlan::LatestPerId {
            inner: Box::new(QueryPlan::Filter(conditions)),
        };
    }
    if let Some(column) = conditions.distinct.clone() {
        return QueryPlan::DistinctByColumn {
            inner: Box::new(QueryPlan::OrderBy {
                inner: Box::new(QueryPlan::Filter(conditions)),
                by: vec!["time"],
            }),
            column,
        };
    }
    if let Some(unit) = conditions.time_unit {
        return QueryPlan::GroupByTimeBucket {
            inner: Box::new(QueryPlan::Filter(conditions)),
            unit,
        };
    }
    let offset = conditions.offset;
    let limit = conditions.limit;
    QueryPlan::Paginate {
        inner: Box::new(QueryPlan::OrderBy {
            inner: Box::new(QueryPlan::Filter(conditions)),
            by: vec!["time"],
        }),
        offset,
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        let mut map: RawParams = HashMap::new();
        for (k, v) in pairs {
            map.entry(k.to_string()).or_default().push(v.to_string());
        }
        map
    }

    #[test]
    fn v_alias_maps_to_value_and_op_defaults_to_eq() {
        let p = params(&[("v", "3.5")]);
        let c = Conditions::from_params(&p);
        assert_eq!(c.numeric, Some((Comparator::Eq, 3.5)));
    }

    #[test]
    fn page_params_override_offset_and_limit() {
        let p = params(&[("page[number]", "3"), ("page[size]", "20")]);
        let c = Conditions::from_params(&p);
        assert_eq!(c.offset, 40);
        assert_eq!(c.limit, 20);
    }

    #[test]
    fn defaults_match_offset_zero_limit_hundred() {
        let p = params(&[]);
        let c = Conditions::from_params(&p);
        assert_eq!(c.offset, 0);
        assert_eq!(c.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn latest_plan_selects_latest_per_id_planner() {
        let p = params(&[("latest", "true"), ("thingid", "container-1")]);
        let c = Conditions::from_params(&p);
        let plan = plan_values(c);
        assert!(matches!(plan, QueryPlan::LatestPerId { .. }));
    }

    fn value(id: &str, urn: &str, v: Option<f64>, vb: Option<bool>, hour: u32) -> Value {
        Value {
            id: id.into(),
            urn: urn.into(),
            v,
            vb,
            vs: None,
            unit: None,
            timestamp: chrono::Utc.with_ymd_and_hms(2026, 7, 1, hour, 0, 0).unwrap(),
            reference: None,
        }
    }

    #[test]
    fn numeric_gt_predicate_rejects_below_threshold() {
        let p = params(&[("value", "5"), ("op", "gt")]);
        let c = Conditions::from_params(&p);
        assert!(!c.matches_value(&value("t-1/3303/5700", "urn:x", Some(4.0), None, 1)));
        assert!(c.matches_value(&value("t-1/3303/5700", "urn:x", Some(6.0), None, 1)));
    }

    #[test]
    fn boolean_filter_matches_only_vb_equal() {
        let p = params(&[("vb", "true")]);
        let c = Conditions::from_params(&p);
        assert!(c.matches_value(&value("t-1/3200/5500", "urn:x", None, Some(true), 1)));
        assert!(!c.matches_value(&value("t-1/3200/5500", "urn:x", None, Some(false), 1)));
    }

    #[test]
    fn n_suffix_filter_matches_trailing_resource_id() {
        let p = params(&[("n", "5500")]);
        let c = Conditions::from_params(&p);
        assert!(c.matches_value(&value("t-1/3200/5500", "urn:x", None, Some(true), 1)));
        assert!(!c.matches_value(&value("t-1/3200/5544", "urn:x", None, Some(true), 1)));
    }

    #[test]
    fn distinct_keeps_only_transitions_of_the_named_field() {
        let c = Conditions { distinct: Some("vb".into()), ..Default::default() };
        let rows = vec![
            value("t-1/3200/5500", "urn:x", None, Some(true), 1),
            value("t-1/3200/5500", "urn:x", None, Some(true), 2),
            value("t-1/3200/5500", "urn:x", None, Some(false), 3),
        ];
        let result = apply_value_query(&c, rows);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0].vb, Some(true));
        assert_eq!(result.rows[1].vb, Some(false));
    }

    #[test]
    fn time_unit_buckets_values_into_hourly_counts() {
        let c = Conditions { time_unit: Some(TimeUnit::Hour), ..Default::default() };
        let rows = vec![
            value("t-1/3303/5700", "urn:x", Some(1.0), None, 9),
            value("t-1/3303/5700", "urn:x", Some(1.0), None, 9),
            value("t-1/3303/5700", "urn:x", Some(1.0), None, 10),
        ];
        let result = apply_value_query(&c, rows);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows.iter().map(|v| v.v.unwrap() as i64).sum::<i64>(), 3);
    }
}
