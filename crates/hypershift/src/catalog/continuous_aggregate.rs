use super::{CatalogSession, QualifiedName, begin, finish, wanted};
use crate::{Config, Result};
use indexmap::IndexMap;

// Chunk interval of the materialization hypertable: intervals are stored in
// microseconds for time-typed buckets and as plain integers otherwise.
const CONTINUOUS_AGGREGATES_SQL: &str = "\
SELECT ca.view_schema::text AS view_schema,
       ca.view_name::text AS view_name,
       ca.hypertable_schema::text AS source_schema,
       ca.hypertable_name::text AS source_hypertable,
       ca.materialized_only,
       ca.view_definition::text AS view_definition,
       bf.bucket_width::text AS bucket_width,
       CASE
           WHEN d.interval_length IS NULL THEN NULL
           WHEN d.column_type IN ('timestamp'::regtype, 'timestamptz'::regtype, 'date'::regtype)
               THEN justify_hours(d.interval_length * interval '1 microsecond')::text
           ELSE d.interval_length::text
       END AS chunk_interval
FROM timescaledb_information.continuous_aggregates ca
JOIN _timescaledb_catalog.continuous_agg cagg
  ON cagg.user_view_schema = ca.view_schema
 AND cagg.user_view_name = ca.view_name
LEFT JOIN _timescaledb_catalog.continuous_aggs_bucket_function bf
  ON bf.mat_hypertable_id = cagg.mat_hypertable_id
LEFT JOIN _timescaledb_catalog.dimension d
  ON d.hypertable_id = cagg.mat_hypertable_id
 AND d.interval_length IS NOT NULL
ORDER BY ca.view_schema, ca.view_name";

/// A continuous aggregate as found in the catalog.
///
/// The catalog keeps the view as a SQL definition rather than as aggregate
/// columns and grouping keys, so there is no conversion back to a
/// [`ContinuousAggregateSpec`](crate::ContinuousAggregateSpec).
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousAggregateInfo {
    pub name: QualifiedName,
    pub source: QualifiedName,
    pub materialized_only: bool,
    /// `time_bucket` width, e.g. `"1 day"`. Absent on servers that predate
    /// the bucket function catalog.
    pub bucket_width: Option<String>,
    pub chunk_interval: Option<String>,
    pub view_definition: String,
}

/// Read every user continuous aggregate.
pub async fn extract_continuous_aggregates<S: CatalogSession + ?Sized>(
    session: &mut S,
    config: &Config,
) -> Result<IndexMap<QualifiedName, ContinuousAggregateInfo>> {
    let opened = begin(session).await?;
    let result = read(&*session, config).await;
    finish(session, opened, result).await
}

pub(super) async fn read<S: CatalogSession + ?Sized>(
    session: &S,
    config: &Config,
) -> Result<IndexMap<QualifiedName, ContinuousAggregateInfo>> {
    let mut aggregates = IndexMap::new();

    for row in session.query(CONTINUOUS_AGGREGATES_SQL, &[]).await? {
        let schema: String = row.try_get("view_schema")?;
        if !wanted(config, &schema) {
            continue;
        }
        let name = QualifiedName::new(schema, row.try_get::<_, String>("view_name")?);
        let info = ContinuousAggregateInfo {
            name: name.clone(),
            source: QualifiedName::new(
                row.try_get::<_, String>("source_schema")?,
                row.try_get::<_, String>("source_hypertable")?,
            ),
            materialized_only: row.try_get("materialized_only")?,
            bucket_width: row.try_get("bucket_width")?,
            chunk_interval: row.try_get("chunk_interval")?,
            view_definition: row.try_get("view_definition")?,
        };
        aggregates.insert(name, info);
    }

    tracing::debug!(count = aggregates.len(), "extracted continuous aggregates");
    Ok(aggregates)
}
