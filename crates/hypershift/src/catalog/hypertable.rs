use super::{CatalogSession, QualifiedName, begin, finish, wanted};
use crate::model::{Dimension, DimensionKind, HypertableSpec};
use crate::{Config, Error, Result};
use indexmap::IndexMap;

const HYPERTABLES_SQL: &str = "\
SELECT hypertable_schema::text AS schema_name,
       hypertable_name::text AS table_name,
       compression_enabled
FROM timescaledb_information.hypertables
ORDER BY hypertable_schema, hypertable_name";

const DIMENSIONS_SQL: &str = "\
SELECT hypertable_schema::text AS schema_name,
       hypertable_name::text AS table_name,
       column_name::text AS column_name,
       dimension_type::text AS dimension_type,
       time_interval::text AS time_interval,
       integer_interval::text AS integer_interval,
       num_partitions::int4 AS num_partitions
FROM timescaledb_information.dimensions
ORDER BY hypertable_schema, hypertable_name, dimension_number";

const HAS_CHUNK_SKIPPING_SQL: &str =
    "SELECT to_regclass('_timescaledb_catalog.chunk_column_stats') IS NOT NULL AS present";

const CHUNK_SKIP_COLUMNS_SQL: &str = "\
SELECT h.schema_name::text AS schema_name,
       h.table_name::text AS table_name,
       s.column_name::text AS column_name
FROM _timescaledb_catalog.chunk_column_stats s
JOIN _timescaledb_catalog.hypertable h ON h.id = s.hypertable_id
WHERE s.chunk_id = 0
ORDER BY h.schema_name, h.table_name, s.column_name";

/// A hypertable as found in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct HypertableInfo {
    pub name: QualifiedName,
    pub time_column: String,
    /// Interval of the primary dimension as rendered by Postgres, e.g.
    /// `"7 days"` or `"12:00:00"`. Integer time columns yield a plain number.
    pub chunk_time_interval: Option<String>,
    pub compression_enabled: bool,
    pub chunk_skip_columns: Vec<String>,
    pub additional_dimensions: Vec<Dimension>,
}

impl HypertableInfo {
    pub fn into_spec(self) -> HypertableSpec {
        HypertableSpec {
            time_column: self.time_column,
            chunk_time_interval: self.chunk_time_interval,
            enable_compression: self.compression_enabled,
            chunk_skip_columns: self.chunk_skip_columns,
            additional_dimensions: self.additional_dimensions,
            migrate_data: None,
        }
    }
}

/// Read every user hypertable with its dimensions and chunk-skip columns.
pub async fn extract_hypertables<S: CatalogSession + ?Sized>(
    session: &mut S,
    config: &Config,
) -> Result<IndexMap<QualifiedName, HypertableInfo>> {
    let opened = begin(session).await?;
    let result = read(&*session, config).await;
    finish(session, opened, result).await
}

pub(super) async fn read<S: CatalogSession + ?Sized>(
    session: &S,
    config: &Config,
) -> Result<IndexMap<QualifiedName, HypertableInfo>> {
    let mut hypertables = IndexMap::new();

    for row in session.query(HYPERTABLES_SQL, &[]).await? {
        let schema: String = row.try_get("schema_name")?;
        if !wanted(config, &schema) {
            continue;
        }
        let name = QualifiedName::new(schema, row.try_get::<_, String>("table_name")?);
        hypertables.insert(
            name.clone(),
            HypertableInfo {
                name,
                time_column: String::new(),
                chunk_time_interval: None,
                compression_enabled: row.try_get("compression_enabled")?,
                chunk_skip_columns: Vec::new(),
                additional_dimensions: Vec::new(),
            },
        );
    }

    for row in session.query(DIMENSIONS_SQL, &[]).await? {
        let name = QualifiedName::new(
            row.try_get::<_, String>("schema_name")?,
            row.try_get::<_, String>("table_name")?,
        );
        let Some(info) = hypertables.get_mut(&name) else {
            continue;
        };

        let column_name: String = row.try_get("column_name")?;
        let dimension_type: String = row.try_get("dimension_type")?;
        let time_interval: Option<String> = row.try_get("time_interval")?;
        let integer_interval: Option<String> = row.try_get("integer_interval")?;
        let num_partitions: Option<i32> = row.try_get("num_partitions")?;
        let interval = time_interval.or(integer_interval);

        // Rows come in dimension order; the first is the primary time dimension.
        if info.time_column.is_empty() {
            info.time_column = column_name;
            info.chunk_time_interval = interval;
            continue;
        }

        let kind = match (num_partitions, interval) {
            (Some(partitions), _) => DimensionKind::Hash {
                partitions: u32::try_from(partitions).map_err(|_| Error::UnexpectedValue {
                    column: "num_partitions",
                    value: partitions.to_string(),
                })?,
            },
            (None, Some(interval)) => DimensionKind::Range { interval },
            (None, None) => {
                return Err(Error::UnexpectedValue {
                    column: "dimension_type",
                    value: dimension_type,
                });
            }
        };
        info.additional_dimensions.push(Dimension { column_name, kind });
    }

    let has_chunk_skipping: bool = session
        .query(HAS_CHUNK_SKIPPING_SQL, &[])
        .await?
        .first()
        .map(|row| row.try_get("present"))
        .transpose()?
        .unwrap_or(false);

    if has_chunk_skipping {
        for row in session.query(CHUNK_SKIP_COLUMNS_SQL, &[]).await? {
            let name = QualifiedName::new(
                row.try_get::<_, String>("schema_name")?,
                row.try_get::<_, String>("table_name")?,
            );
            if let Some(info) = hypertables.get_mut(&name) {
                info.chunk_skip_columns.push(row.try_get("column_name")?);
            }
        }
    }

    tracing::debug!(count = hypertables.len(), "extracted hypertables");
    Ok(hypertables)
}
