//! Typed migration operations.
//!
//! An [`Operation`] is a tagged [`OperationKind`] plus a plain integer
//! priority. The composer orders operations by priority alone, so the
//! priority of each kind encodes which physical objects must already exist
//! (or must already be gone) when it runs. See [`priority`].
//!
//! Alter payloads carry both the old and the new value of every field they
//! cover, not only the delta, so a SQL generator can decide exactly what to
//! emit.

use crate::model::{
    ContinuousAggregatePolicySpec, ContinuousAggregateSpec, Dimension, ReorderPolicySpec,
};
use std::fmt;

/// Default priorities. Lower runs first; the baseline relational operations
/// all sit at [`priority::RELATIONAL`].
pub mod priority {
    /// Policy removals run before anything they reference can be dropped.
    pub const REMOVE_POLICY: i32 = -30;
    /// Continuous aggregates go before their source tables and before the
    /// create they are paired with.
    pub const DROP_CONTINUOUS_AGGREGATE: i32 = -20;
    pub const RELATIONAL: i32 = 0;
    /// After the table and its columns exist.
    pub const HYPERTABLE: i32 = 10;
    /// After the index the policy clusters on exists.
    pub const REORDER_POLICY: i32 = 20;
    /// After the source hypertable exists.
    pub const CONTINUOUS_AGGREGATE: i32 = 30;
    /// After the continuous aggregate exists.
    pub const ADD_REFRESH_POLICY: i32 = 40;
}

/// A single planned operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub priority: i32,
}

impl Operation {
    /// Wrap `kind` with its default priority.
    pub fn new(kind: OperationKind) -> Self {
        let priority = kind.default_priority();
        Self { kind, priority }
    }

    /// Override the priority, e.g. for baseline operations that the upstream
    /// differ wants to run before or after the feature operations.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns true for operations produced by the upstream relational differ.
    pub fn is_relational(&self) -> bool {
        matches!(self.kind, OperationKind::Relational(_))
    }
}

impl From<OperationKind> for Operation {
    fn from(kind: OperationKind) -> Self {
        Operation::new(kind)
    }
}

impl From<RelationalOperation> for Operation {
    fn from(op: RelationalOperation) -> Self {
        Operation::new(OperationKind::Relational(op))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    Relational(RelationalOperation),
    CreateHypertable(CreateHypertable),
    AlterHypertable(AlterHypertable),
    CreateContinuousAggregate(CreateContinuousAggregate),
    AlterContinuousAggregate(AlterContinuousAggregate),
    DropContinuousAggregate(DropContinuousAggregate),
    AddContinuousAggregatePolicy(AddContinuousAggregatePolicy),
    RemoveContinuousAggregatePolicy(RemoveContinuousAggregatePolicy),
    AddReorderPolicy(AddReorderPolicy),
    AlterReorderPolicy(AlterReorderPolicy),
    RemoveReorderPolicy(RemoveReorderPolicy),
}

impl OperationKind {
    pub fn default_priority(&self) -> i32 {
        match self {
            OperationKind::Relational(_) => priority::RELATIONAL,
            OperationKind::CreateHypertable(_) | OperationKind::AlterHypertable(_) => {
                priority::HYPERTABLE
            }
            OperationKind::CreateContinuousAggregate(_)
            | OperationKind::AlterContinuousAggregate(_) => priority::CONTINUOUS_AGGREGATE,
            OperationKind::DropContinuousAggregate(_) => priority::DROP_CONTINUOUS_AGGREGATE,
            OperationKind::AddContinuousAggregatePolicy(_) => priority::ADD_REFRESH_POLICY,
            OperationKind::RemoveContinuousAggregatePolicy(_)
            | OperationKind::RemoveReorderPolicy(_) => priority::REMOVE_POLICY,
            OperationKind::AddReorderPolicy(_) | OperationKind::AlterReorderPolicy(_) => {
                priority::REORDER_POLICY
            }
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Relational(op) => fmt::Display::fmt(op, f),
            OperationKind::CreateHypertable(op) => write!(
                f,
                "+ hypertable {} ({}, {})",
                op.table, op.time_column, op.chunk_time_interval
            ),
            OperationKind::AlterHypertable(op) => write!(f, "~ hypertable {}", op.table),
            OperationKind::CreateContinuousAggregate(op) => write!(
                f,
                "+ continuous aggregate {} on {} ({})",
                op.definition.view_name,
                op.definition.source_hypertable,
                op.definition.time_bucket_width
            ),
            OperationKind::AlterContinuousAggregate(op) => {
                write!(f, "~ continuous aggregate {}", op.view_name)
            }
            OperationKind::DropContinuousAggregate(op) => {
                write!(f, "- continuous aggregate {}", op.view_name)
            }
            OperationKind::AddContinuousAggregatePolicy(op) => {
                write!(f, "+ refresh policy on {}", op.view_name)
            }
            OperationKind::RemoveContinuousAggregatePolicy(op) => {
                write!(f, "- refresh policy on {}", op.view_name)
            }
            OperationKind::AddReorderPolicy(op) => write!(
                f,
                "+ reorder policy on {} using {}",
                op.table, op.policy.index_name
            ),
            OperationKind::AlterReorderPolicy(op) => write!(
                f,
                "~ reorder policy on {} using {}",
                op.table, op.index_name
            ),
            OperationKind::RemoveReorderPolicy(op) => write!(
                f,
                "- reorder policy on {} using {}",
                op.table, op.index_name
            ),
        }
    }
}

/// Baseline operations produced by the upstream table/column/index/foreign
/// key differ. This crate only orders them; it never inspects their payload
/// beyond the names needed for order validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationalOperation {
    CreateTable { name: String },
    DropTable { name: String },
    RenameTable { from: String, to: String },
    AddColumn { table: String, column: String },
    DropColumn { table: String, column: String },
    AlterColumn { table: String, column: String },
    CreateIndex { table: String, name: String },
    DropIndex { table: String, name: String },
    AddForeignKey {
        table: String,
        name: String,
        references_table: String,
    },
    DropForeignKey { table: String, name: String },
    /// Opaque SQL the upstream differ wants run verbatim.
    Sql { sql: String },
}

impl fmt::Display for RelationalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationalOperation::CreateTable { name } => write!(f, "+ table {}", name),
            RelationalOperation::DropTable { name } => write!(f, "- table {}", name),
            RelationalOperation::RenameTable { from, to } => {
                write!(f, "~ rename {} -> {}", from, to)
            }
            RelationalOperation::AddColumn { table, column } => {
                write!(f, "+ column {}.{}", table, column)
            }
            RelationalOperation::DropColumn { table, column } => {
                write!(f, "- column {}.{}", table, column)
            }
            RelationalOperation::AlterColumn { table, column } => {
                write!(f, "~ column {}.{}", table, column)
            }
            RelationalOperation::CreateIndex { table, name } => {
                write!(f, "+ index {} on {}", name, table)
            }
            RelationalOperation::DropIndex { table, name } => {
                write!(f, "- index {} on {}", name, table)
            }
            RelationalOperation::AddForeignKey {
                table,
                name,
                references_table,
            } => write!(
                f,
                "+ foreign key {} on {} -> {}",
                name, table, references_table
            ),
            RelationalOperation::DropForeignKey { table, name } => {
                write!(f, "- foreign key {} on {}", name, table)
            }
            RelationalOperation::Sql { sql } => write!(f, "! {}", sql),
        }
    }
}

/// Convert a table into a hypertable.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateHypertable {
    pub table: String,
    pub time_column: String,
    /// Resolved chunk interval; the configured default when the table declares none.
    pub chunk_time_interval: String,
    pub migrate_data: bool,
    pub enable_compression: bool,
    pub chunk_skip_columns: Vec<String>,
    pub additional_dimensions: Vec<Dimension>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterHypertable {
    pub table: String,
    pub old_chunk_time_interval: Option<String>,
    pub chunk_time_interval: Option<String>,
    pub old_enable_compression: bool,
    pub enable_compression: bool,
    pub old_chunk_skip_columns: Vec<String>,
    pub chunk_skip_columns: Vec<String>,
    pub old_additional_dimensions: Vec<Dimension>,
    pub additional_dimensions: Vec<Dimension>,
}

/// Create a continuous aggregate. The definition's refresh policy is not
/// part of this operation; it is added by its own
/// [`AddContinuousAggregatePolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateContinuousAggregate {
    pub definition: ContinuousAggregateSpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterContinuousAggregate {
    pub view_name: String,
    pub old_chunk_interval: Option<String>,
    pub chunk_interval: Option<String>,
    pub old_materialized_only: bool,
    pub materialized_only: bool,
    pub old_create_group_indexes: bool,
    pub create_group_indexes: bool,
    pub old_with_no_data: bool,
    pub with_no_data: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropContinuousAggregate {
    pub view_name: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddContinuousAggregatePolicy {
    pub view_name: String,
    pub policy: ContinuousAggregatePolicySpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveContinuousAggregatePolicy {
    pub view_name: String,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddReorderPolicy {
    pub table: String,
    pub policy: ReorderPolicySpec,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterReorderPolicy {
    pub table: String,
    pub index_name: String,
    pub old_schedule_interval: Option<String>,
    pub schedule_interval: Option<String>,
    pub old_max_runtime: Option<String>,
    pub max_runtime: Option<String>,
    pub old_max_retries: Option<i32>,
    pub max_retries: Option<i32>,
    pub old_retry_period: Option<String>,
    pub retry_period: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveReorderPolicy {
    pub table: String,
    pub index_name: String,
    pub if_exists: bool,
}
