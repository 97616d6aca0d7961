use super::{CatalogSession, QualifiedName, begin, finish, wanted};
use crate::model::ContinuousAggregatePolicySpec;
use crate::{Config, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

const REFRESH_POLICIES_SQL: &str = "\
SELECT ca.view_schema::text AS view_schema,
       ca.view_name::text AS view_name,
       j.job_id,
       j.config->>'start_offset' AS start_offset,
       j.config->>'end_offset' AS end_offset,
       j.schedule_interval::text AS schedule_interval,
       j.initial_start,
       (j.config->>'include_tiered_data')::bool AS include_tiered_data,
       (j.config->>'buckets_per_batch')::int4 AS buckets_per_batch,
       (j.config->>'max_batches_per_execution')::int4 AS max_batches_per_execution,
       (j.config->>'refresh_newest_first')::bool AS refresh_newest_first
FROM timescaledb_information.jobs j
JOIN timescaledb_information.continuous_aggregates ca
  ON ca.materialization_hypertable_schema = j.hypertable_schema
 AND ca.materialization_hypertable_name = j.hypertable_name
WHERE j.proc_name = 'policy_refresh_continuous_aggregate'
ORDER BY ca.view_schema, ca.view_name";

/// Refresh policy of a continuous aggregate, keyed by the view name.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousAggregatePolicyInfo {
    pub view: QualifiedName,
    pub job_id: i32,
    /// Offsets as stored in the job config: an interval literal, or an
    /// integer for integer-based time columns.
    pub start_offset: Option<String>,
    pub end_offset: Option<String>,
    pub schedule_interval: Option<String>,
    pub initial_start: Option<DateTime<Utc>>,
    pub include_tiered_data: Option<bool>,
    pub buckets_per_batch: Option<i32>,
    pub max_batches_per_execution: Option<i32>,
    pub refresh_newest_first: Option<bool>,
}

impl ContinuousAggregatePolicyInfo {
    pub fn into_spec(self) -> ContinuousAggregatePolicySpec {
        ContinuousAggregatePolicySpec {
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            schedule_interval: self.schedule_interval,
            initial_start: self.initial_start,
            include_tiered_data: self.include_tiered_data,
            buckets_per_batch: self.buckets_per_batch,
            max_batches_per_execution: self.max_batches_per_execution,
            refresh_newest_first: self.refresh_newest_first,
        }
    }
}

/// Read the refresh policy of every user continuous aggregate that has one.
pub async fn extract_continuous_aggregate_policies<S: CatalogSession + ?Sized>(
    session: &mut S,
    config: &Config,
) -> Result<IndexMap<QualifiedName, ContinuousAggregatePolicyInfo>> {
    let opened = begin(session).await?;
    let result = read(&*session, config).await;
    finish(session, opened, result).await
}

pub(super) async fn read<S: CatalogSession + ?Sized>(
    session: &S,
    config: &Config,
) -> Result<IndexMap<QualifiedName, ContinuousAggregatePolicyInfo>> {
    let mut policies = IndexMap::new();

    for row in session.query(REFRESH_POLICIES_SQL, &[]).await? {
        let schema: String = row.try_get("view_schema")?;
        if !wanted(config, &schema) {
            continue;
        }
        let view = QualifiedName::new(schema, row.try_get::<_, String>("view_name")?);
        let info = ContinuousAggregatePolicyInfo {
            view: view.clone(),
            job_id: row.try_get("job_id")?,
            start_offset: row.try_get("start_offset")?,
            end_offset: row.try_get("end_offset")?,
            schedule_interval: row.try_get("schedule_interval")?,
            initial_start: row.try_get("initial_start")?,
            include_tiered_data: row.try_get("include_tiered_data")?,
            buckets_per_batch: row.try_get("buckets_per_batch")?,
            max_batches_per_execution: row.try_get("max_batches_per_execution")?,
            refresh_newest_first: row.try_get("refresh_newest_first")?,
        };
        policies.insert(view, info);
    }

    tracing::debug!(count = policies.len(), "extracted refresh policies");
    Ok(policies)
}
