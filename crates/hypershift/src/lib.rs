//! Schema evolution planning for TimescaleDB features.
//!
//! A relational migration tool knows how to diff tables, columns, indexes and
//! foreign keys. This crate adds the TimescaleDB layer on top:
//! - Hypertables (chunk interval, compression, chunk skipping, extra dimensions)
//! - Continuous aggregates and their refresh policies
//! - Reorder policies
//!
//! Each feature has a differ that compares two [`Model`] snapshots and emits
//! [`Operation`]s. [`plan`] merges them with the relational operations by a
//! stable sort on priority, so the baseline's own dependency order survives.
//!
//! ```ignore
//! let plan = hypershift::plan_migration(Some(&old), Some(&new), relational_ops, &config);
//! println!("{plan}");
//! ```
//!
//! The [`catalog`] module goes the other way and reads these objects back out
//! of a live database.

pub mod catalog;
pub mod config;
pub mod diff;
mod error;
pub mod model;
pub mod operation;
pub mod plan;
pub mod solver;

pub use config::{Config, ConfigError};
pub use diff::diff_features;
pub use error::Error;
pub use model::{
    AggregateFunction, AggregateKind, ContinuousAggregatePolicySpec, ContinuousAggregateSpec,
    Dimension, DimensionKind, HypertableSpec, Model, ReorderPolicySpec, Table, View,
};
pub use operation::{Operation, OperationKind, RelationalOperation};
pub use plan::{Plan, plan, plan_migration};
pub use solver::{OrderError, VirtualCatalog, validate_order};

pub type Result<T> = std::result::Result<T, Error>;
