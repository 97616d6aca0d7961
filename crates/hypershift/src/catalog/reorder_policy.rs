use super::{CatalogSession, QualifiedName, begin, finish, wanted};
use crate::model::ReorderPolicySpec;
use crate::{Config, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

const REORDER_POLICIES_SQL: &str = "\
SELECT j.hypertable_schema::text AS schema_name,
       j.hypertable_name::text AS table_name,
       j.job_id,
       j.config->>'index_name' AS index_name,
       j.initial_start,
       j.schedule_interval::text AS schedule_interval,
       j.max_runtime::text AS max_runtime,
       j.max_retries,
       j.retry_period::text AS retry_period
FROM timescaledb_information.jobs j
WHERE j.proc_name = 'policy_reorder'
ORDER BY j.hypertable_schema, j.hypertable_name";

/// Reorder policy of a hypertable. TimescaleDB allows at most one per table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPolicyInfo {
    pub table: QualifiedName,
    pub job_id: i32,
    pub index_name: String,
    pub initial_start: Option<DateTime<Utc>>,
    pub schedule_interval: Option<String>,
    pub max_runtime: Option<String>,
    pub max_retries: Option<i32>,
    pub retry_period: Option<String>,
}

impl ReorderPolicyInfo {
    pub fn into_spec(self) -> ReorderPolicySpec {
        ReorderPolicySpec {
            index_name: self.index_name,
            initial_start: self.initial_start,
            schedule_interval: self.schedule_interval,
            max_runtime: self.max_runtime,
            max_retries: self.max_retries,
            retry_period: self.retry_period,
        }
    }
}

/// Read the reorder policy of every user hypertable that has one.
pub async fn extract_reorder_policies<S: CatalogSession + ?Sized>(
    session: &mut S,
    config: &Config,
) -> Result<IndexMap<QualifiedName, ReorderPolicyInfo>> {
    let opened = begin(session).await?;
    let result = read(&*session, config).await;
    finish(session, opened, result).await
}

pub(super) async fn read<S: CatalogSession + ?Sized>(
    session: &S,
    config: &Config,
) -> Result<IndexMap<QualifiedName, ReorderPolicyInfo>> {
    let mut policies = IndexMap::new();

    for row in session.query(REORDER_POLICIES_SQL, &[]).await? {
        let schema: String = row.try_get("schema_name")?;
        if !wanted(config, &schema) {
            continue;
        }
        let table = QualifiedName::new(schema, row.try_get::<_, String>("table_name")?);
        let info = ReorderPolicyInfo {
            table: table.clone(),
            job_id: row.try_get("job_id")?,
            index_name: row.try_get("index_name")?,
            initial_start: row.try_get("initial_start")?,
            schedule_interval: row.try_get("schedule_interval")?,
            max_runtime: row.try_get("max_runtime")?,
            max_retries: row.try_get("max_retries")?,
            retry_period: row.try_get("retry_period")?,
        };
        policies.insert(table, info);
    }

    tracing::debug!(count = policies.len(), "extracted reorder policies");
    Ok(policies)
}
