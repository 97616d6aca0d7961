//! Declarative schema snapshots.
//!
//! A [`Model`] is one whole-schema snapshot as produced by the upstream
//! relational differ: every table and view, with the TimescaleDB features
//! attached to them already resolved to plain strings. Two models (old and
//! new) are the only input the feature differs read.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

/// A whole-schema snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    /// Tables by name, in declaration order.
    pub tables: IndexMap<String, Table>,
    /// Views by name, in declaration order.
    pub views: IndexMap<String, View>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, replacing any table with the same name.
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Add a view, replacing any view with the same name.
    pub fn with_view(mut self, view: View) -> Self {
        self.views.insert(view.name.clone(), view);
        self
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn get_view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    /// Continuous aggregates in view declaration order.
    pub fn continuous_aggregates(&self) -> impl Iterator<Item = &ContinuousAggregateSpec> {
        self.views
            .values()
            .filter_map(|v| v.continuous_aggregate.as_ref())
    }

    /// Looks up the continuous aggregate defined on `view`.
    pub fn continuous_aggregate(&self, view: &str) -> Option<&ContinuousAggregateSpec> {
        self.views
            .get(view)
            .and_then(|v| v.continuous_aggregate.as_ref())
    }
}

/// A table and its TimescaleDB annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    /// Present if the table is a hypertable.
    pub hypertable: Option<HypertableSpec>,
    /// Reorder policies, keyed by index name.
    pub reorder_policies: Vec<ReorderPolicySpec>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hypertable: None,
            reorder_policies: Vec::new(),
        }
    }

    pub fn with_hypertable(mut self, spec: HypertableSpec) -> Self {
        self.hypertable = Some(spec);
        self
    }

    pub fn with_reorder_policy(mut self, policy: ReorderPolicySpec) -> Self {
        self.reorder_policies.push(policy);
        self
    }
}

/// A view, possibly backed by a continuous aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub name: String,
    pub continuous_aggregate: Option<ContinuousAggregateSpec>,
}

impl View {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            continuous_aggregate: None,
        }
    }

    /// Wraps a continuous aggregate in a view named after it.
    pub fn continuous_aggregate(spec: ContinuousAggregateSpec) -> Self {
        Self {
            name: spec.view_name.clone(),
            continuous_aggregate: Some(spec),
        }
    }
}

/// Hypertable annotation on a table.
#[derive(Debug, Clone, PartialEq)]
pub struct HypertableSpec {
    /// Name of the primary time dimension column.
    pub time_column: String,
    /// Chunk interval as declared, e.g. `"1 day"`.
    pub chunk_time_interval: Option<String>,
    pub enable_compression: bool,
    /// Columns with chunk skipping enabled. Order carries no meaning.
    pub chunk_skip_columns: Vec<String>,
    /// Secondary partitioning dimensions. Order is partition precedence.
    pub additional_dimensions: Vec<Dimension>,
    /// Migrate existing rows when converting a populated table.
    pub migrate_data: Option<bool>,
}

impl HypertableSpec {
    pub fn new(time_column: impl Into<String>) -> Self {
        Self {
            time_column: time_column.into(),
            chunk_time_interval: None,
            enable_compression: false,
            chunk_skip_columns: Vec::new(),
            additional_dimensions: Vec::new(),
            migrate_data: None,
        }
    }

    pub fn chunk_time_interval(mut self, interval: impl Into<String>) -> Self {
        self.chunk_time_interval = Some(interval.into());
        self
    }

    pub fn compressed(mut self) -> Self {
        self.enable_compression = true;
        self
    }

    pub fn chunk_skip_column(mut self, column: impl Into<String>) -> Self {
        self.chunk_skip_columns.push(column.into());
        self
    }

    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.additional_dimensions.push(dimension);
        self
    }

    /// Chunk-skip columns compared as a set.
    pub fn same_chunk_skip_columns(&self, other: &HypertableSpec) -> bool {
        let ours: HashSet<&str> = self.chunk_skip_columns.iter().map(String::as_str).collect();
        let theirs: HashSet<&str> = other
            .chunk_skip_columns
            .iter()
            .map(String::as_str)
            .collect();
        ours == theirs
    }
}

/// A secondary partitioning dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dimension {
    pub column_name: String,
    pub kind: DimensionKind,
}

impl Dimension {
    pub fn hash(column_name: impl Into<String>, partitions: u32) -> Self {
        Self {
            column_name: column_name.into(),
            kind: DimensionKind::Hash { partitions },
        }
    }

    pub fn range(column_name: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            kind: DimensionKind::Range {
                interval: interval.into(),
            },
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DimensionKind::Hash { partitions } => {
                write!(f, "{} hash({})", self.column_name, partitions)
            }
            DimensionKind::Range { interval } => {
                write!(f, "{} range({})", self.column_name, interval)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimensionKind {
    Hash { partitions: u32 },
    Range { interval: String },
}

/// Continuous aggregate annotation on a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousAggregateSpec {
    pub view_name: String,
    /// The hypertable (or continuous aggregate) the view reads from.
    pub source_hypertable: String,
    /// Column passed to `time_bucket`.
    pub time_column: String,
    pub time_bucket_width: String,
    pub chunk_interval: Option<String>,
    pub materialized_only: bool,
    pub with_no_data: bool,
    pub aggregate_functions: Vec<AggregateFunction>,
    pub group_by_columns: Vec<String>,
    pub where_clause: Option<String>,
    pub create_group_indexes: bool,
    pub refresh_policy: Option<ContinuousAggregatePolicySpec>,
}

impl ContinuousAggregateSpec {
    pub fn new(
        view_name: impl Into<String>,
        source_hypertable: impl Into<String>,
        time_column: impl Into<String>,
        time_bucket_width: impl Into<String>,
    ) -> Self {
        Self {
            view_name: view_name.into(),
            source_hypertable: source_hypertable.into(),
            time_column: time_column.into(),
            time_bucket_width: time_bucket_width.into(),
            chunk_interval: None,
            materialized_only: true,
            with_no_data: false,
            aggregate_functions: Vec::new(),
            group_by_columns: Vec::new(),
            where_clause: None,
            create_group_indexes: false,
            refresh_policy: None,
        }
    }

    pub fn aggregate(mut self, function: AggregateFunction) -> Self {
        self.aggregate_functions.push(function);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by_columns.push(column.into());
        self
    }

    pub fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.where_clause = Some(predicate.into());
        self
    }

    pub fn refresh_policy(mut self, policy: ContinuousAggregatePolicySpec) -> Self {
        self.refresh_policy = Some(policy);
        self
    }

    /// Returns true if going from `self` to `other` changes the physical
    /// shape of the materialization, which can only be done by dropping and
    /// recreating the view.
    pub fn requires_recreate(&self, other: &ContinuousAggregateSpec) -> bool {
        self.source_hypertable != other.source_hypertable
            || self.time_column != other.time_column
            || self.time_bucket_width != other.time_bucket_width
            || self.aggregate_functions != other.aggregate_functions
            || self.group_by_columns != other.group_by_columns
            || self.where_clause != other.where_clause
    }

    /// Returns true if any of the in-place alterable settings differ.
    pub fn settings_differ(&self, other: &ContinuousAggregateSpec) -> bool {
        self.chunk_interval != other.chunk_interval
            || self.materialized_only != other.materialized_only
            || self.create_group_indexes != other.create_group_indexes
            || self.with_no_data != other.with_no_data
    }
}

/// One aggregate column of a continuous aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateFunction {
    /// Output column name.
    pub alias: String,
    pub function: AggregateKind,
    pub source_column: String,
}

impl AggregateFunction {
    pub fn new(
        alias: impl Into<String>,
        function: AggregateKind,
        source_column: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            function,
            source_column: source_column.into(),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}({})", self.alias, self.function, self.source_column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Avg,
    Sum,
    Min,
    Max,
    Count,
    /// `first(value, time)`
    First,
    /// `last(value, time)`
    Last,
}

impl AggregateKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateKind::Avg => "avg",
            AggregateKind::Sum => "sum",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Count => "count",
            AggregateKind::First => "first",
            AggregateKind::Last => "last",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Refresh policy of a continuous aggregate. `None` fields use the server
/// default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContinuousAggregatePolicySpec {
    pub start_offset: Option<String>,
    pub end_offset: Option<String>,
    pub schedule_interval: Option<String>,
    pub initial_start: Option<DateTime<Utc>>,
    pub include_tiered_data: Option<bool>,
    pub buckets_per_batch: Option<i32>,
    pub max_batches_per_execution: Option<i32>,
    pub refresh_newest_first: Option<bool>,
}

impl ContinuousAggregatePolicySpec {
    pub fn new(
        start_offset: impl Into<String>,
        end_offset: impl Into<String>,
        schedule_interval: impl Into<String>,
    ) -> Self {
        Self {
            start_offset: Some(start_offset.into()),
            end_offset: Some(end_offset.into()),
            schedule_interval: Some(schedule_interval.into()),
            ..Self::default()
        }
    }
}

/// Reorder policy on a hypertable, keyed by `(table, index_name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderPolicySpec {
    pub index_name: String,
    pub initial_start: Option<DateTime<Utc>>,
    pub schedule_interval: Option<String>,
    pub max_runtime: Option<String>,
    pub max_retries: Option<i32>,
    pub retry_period: Option<String>,
}

impl ReorderPolicySpec {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            initial_start: None,
            schedule_interval: None,
            max_runtime: None,
            max_retries: None,
            retry_period: None,
        }
    }

    /// Returns true if any of the in-place alterable job settings differ.
    pub fn job_settings_differ(&self, other: &ReorderPolicySpec) -> bool {
        self.schedule_interval != other.schedule_interval
            || self.max_runtime != other.max_runtime
            || self.max_retries != other.max_retries
            || self.retry_period != other.retry_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_skip_columns_compare_as_set() {
        let a = HypertableSpec::new("time")
            .chunk_skip_column("a")
            .chunk_skip_column("b");
        let b = HypertableSpec::new("time")
            .chunk_skip_column("b")
            .chunk_skip_column("a");
        assert!(a.same_chunk_skip_columns(&b));

        let c = HypertableSpec::new("time").chunk_skip_column("a");
        assert!(!a.same_chunk_skip_columns(&c));
    }

    #[test]
    fn with_table_replaces_by_name() {
        let model = Model::new()
            .with_table(Table::new("metrics"))
            .with_table(Table::new("metrics").with_hypertable(HypertableSpec::new("time")));
        assert_eq!(model.tables.len(), 1);
        assert!(model.get_table("metrics").unwrap().hypertable.is_some());
    }

    #[test]
    fn recreate_vs_settings() {
        let base = ContinuousAggregateSpec::new("daily", "metrics", "time", "1 day")
            .aggregate(AggregateFunction::new("avg_value", AggregateKind::Avg, "value"));

        let mut grouped = base.clone();
        grouped.group_by_columns.push("device_id".to_string());
        assert!(base.requires_recreate(&grouped));
        assert!(!base.settings_differ(&grouped));

        let mut realtime = base.clone();
        realtime.materialized_only = false;
        assert!(!base.requires_recreate(&realtime));
        assert!(base.settings_differ(&realtime));
    }

    #[test]
    fn dimension_display() {
        assert_eq!(Dimension::hash("device_id", 4).to_string(), "device_id hash(4)");
        assert_eq!(
            Dimension::range("region", "1000").to_string(),
            "region range(1000)"
        );
    }
}
