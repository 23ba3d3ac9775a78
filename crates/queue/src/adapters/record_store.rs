//! Postgres-backed `RecordStore`. Stores every model's records as opaque
//! JSON in one `records` table (model-specific business rules are explicitly
//! out of scope — see SPEC_FULL.md §1 Non-goals) and applies the same
//! condition-group evaluator QUERY/FILTER already use for in-memory
//! filtering, so there is exactly one predicate language in the system.

use async_trait::async_trait;
use chrono::Utc;
use db::DbPool;
use nodes::adapters::{AdapterError, FindManyArgs, RecordModel, RecordStore};
use nodes::resolver::condition::evaluate_group;
use nodes::resolver::ResolverContext;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

pub struct PgRecordStore {
    pool: DbPool,
}

impl PgRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn model_tag(model: RecordModel) -> &'static str {
    match model {
        RecordModel::Lead => "Lead",
        RecordModel::Customer => "Customer",
        RecordModel::Project => "Project",
        RecordModel::Task => "Task",
        RecordModel::Invoice => "Invoice",
        RecordModel::Employee => "Employee",
        RecordModel::Payroll => "Payroll",
        RecordModel::TimeOff => "TimeOff",
    }
}

fn matches(fields: &Value, args: &FindManyArgs) -> bool {
    let empty_shared = HashMap::new();
    let empty_outputs = HashMap::new();
    let ctx = ResolverContext {
        module: "",
        payload: fields,
        user: None,
        organization: None,
        trigger: None,
        shared: &empty_shared,
        node_outputs: &empty_outputs,
        loop_ctx: None,
        now: Utc::now(),
    };
    let group = nodes::resolver::condition::ConditionGroup {
        conditions: args.where_conditions.clone(),
        logical_operator: args.logical_operator,
    };
    evaluate_group(&group, &ctx)
}

fn project(fields: &Value, select: &Option<Vec<String>>) -> Value {
    let Some(keys) = select else {
        return fields.clone();
    };
    let Value::Object(map) = fields else {
        return fields.clone();
    };
    let mut out = serde_json::Map::new();
    for key in keys {
        if let Some(v) = map.get(key) {
            out.insert(key.clone(), v.clone());
        }
    }
    Value::Object(out)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_many(&self, model: RecordModel, args: FindManyArgs) -> Result<Vec<Value>, AdapterError> {
        let rows = db::repository::records::find_all(&self.pool, args.organization_id, model_tag(model))
            .await
            .map_err(|e| AdapterError::Failed(e.to_string()))?;

        let mut matched: Vec<Value> = rows
            .into_iter()
            .map(|r| r.fields)
            .filter(|fields| matches(fields, &args))
            .collect();

        if let Some(order_by) = &args.order_by {
            matched.sort_by(|a, b| {
                let av = a.get(order_by).cloned().unwrap_or(Value::Null);
                let bv = b.get(order_by).cloned().unwrap_or(Value::Null);
                compare_values(&av, &bv)
            });
        }

        let offset = args.offset.unwrap_or(0).max(0) as usize;
        matched = matched.into_iter().skip(offset).collect();
        if let Some(limit) = args.limit {
            matched.truncate(limit.max(0) as usize);
        }

        Ok(matched.into_iter().map(|v| project(&v, &args.select)).collect())
    }

    async fn create(&self, model: RecordModel, fields: Value) -> Result<Value, AdapterError> {
        let organization_id = fields
            .get("organizationId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AdapterError::Failed("record is missing a valid 'organizationId' field".into()))?;

        let row = db::repository::records::create_record(&self.pool, organization_id, model_tag(model), fields)
            .await
            .map_err(|e| AdapterError::Failed(e.to_string()))?;

        Ok(row.fields)
    }

    async fn update(&self, model: RecordModel, record_id: Value, fields: Value) -> Result<Value, AdapterError> {
        let id = record_id
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AdapterError::Failed("record id did not resolve to a UUID".into()))?;
        let organization_id = fields
            .get("organizationId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AdapterError::Failed("record is missing a valid 'organizationId' field".into()))?;

        let row = db::repository::records::update_record(&self.pool, organization_id, model_tag(model), id, fields)
            .await
            .map_err(|e| AdapterError::Failed(e.to_string()))?;

        Ok(row.fields)
    }
}

fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
