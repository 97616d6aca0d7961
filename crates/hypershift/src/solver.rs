//! Order validation - check a planned operation list against a simulated catalog.
//!
//! The composer orders operations by priority alone. This module checks the
//! result the hard way: it replays the operations against a [`VirtualCatalog`]
//! and fails on the first one whose preconditions don't hold.
//!
//! ## Example Problem
//!
//! ```text
//! -- This fails:
//! SELECT add_reorder_policy('metrics', 'metrics_time_idx');  -- index doesn't exist yet!
//! CREATE INDEX metrics_time_idx ON metrics (time DESC);
//!
//! -- This works:
//! CREATE INDEX metrics_time_idx ON metrics (time DESC);
//! SELECT add_reorder_policy('metrics', 'metrics_time_idx');
//! ```

use crate::model::Model;
use crate::operation::{Operation, OperationKind, RelationalOperation};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// An operation whose preconditions don't hold at its position in the plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("{op}: table '{table}' does not exist")]
    TableNotFound { op: String, table: String },

    #[error("{op}: table '{table}' already exists")]
    TableAlreadyExists { op: String, table: String },

    #[error("{op}: index '{index}' does not exist on '{table}'")]
    IndexNotFound {
        op: String,
        table: String,
        index: String,
    },

    #[error("{op}: index '{index}' already exists on '{table}'")]
    IndexAlreadyExists {
        op: String,
        table: String,
        index: String,
    },

    #[error("{op}: table '{table}' is not a hypertable")]
    NotAHypertable { op: String, table: String },

    #[error("{op}: table '{table}' is already a hypertable")]
    AlreadyAHypertable { op: String, table: String },

    #[error("{op}: continuous aggregate '{view}' does not exist")]
    ViewNotFound { op: String, view: String },

    #[error("{op}: continuous aggregate '{view}' already exists")]
    ViewAlreadyExists { op: String, view: String },

    #[error("{op}: '{source_name}' is neither a hypertable nor a continuous aggregate")]
    SourceNotFound { op: String, source_name: String },

    #[error("{op}: no policy on '{target}'")]
    PolicyNotFound { op: String, target: String },

    #[error("{op}: a policy on '{target}' already exists")]
    PolicyAlreadyExists { op: String, target: String },

    #[error("{op}: '{target}' is still referenced by '{dependent}'")]
    StillReferenced {
        op: String,
        target: String,
        dependent: String,
    },
}

#[derive(Debug, Clone, Default)]
struct VirtualTable {
    indexes: HashSet<String>,
    hypertable: bool,
    /// Index names with a reorder policy.
    reorder_policies: HashSet<String>,
}

#[derive(Debug, Clone)]
struct VirtualView {
    source: String,
    refresh_policy: bool,
}

/// Simulated catalog state: just enough to check dependencies.
#[derive(Debug, Clone, Default)]
pub struct VirtualCatalog {
    tables: HashMap<String, VirtualTable>,
    views: HashMap<String, VirtualView>,
}

impl VirtualCatalog {
    /// An empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// The state described by a model. Indexes referenced by reorder
    /// policies are assumed to exist.
    pub fn from_model(model: &Model) -> Self {
        let mut catalog = Self::new();
        for table in model.tables.values() {
            let policies: HashSet<String> = table
                .reorder_policies
                .iter()
                .map(|p| p.index_name.clone())
                .collect();
            catalog.tables.insert(
                table.name.clone(),
                VirtualTable {
                    indexes: policies.clone(),
                    hypertable: table.hypertable.is_some(),
                    reorder_policies: policies,
                },
            );
        }
        for cagg in model.continuous_aggregates() {
            catalog.views.insert(
                cagg.view_name.clone(),
                VirtualView {
                    source: cagg.source_hypertable.clone(),
                    refresh_policy: cagg.refresh_policy.is_some(),
                },
            );
        }
        catalog
    }

    /// Declare an existing index.
    pub fn with_index(mut self, table: &str, index: &str) -> Self {
        self.tables
            .entry(table.to_string())
            .or_default()
            .indexes
            .insert(index.to_string());
        self
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn is_hypertable(&self, name: &str) -> bool {
        self.tables.get(name).is_some_and(|t| t.hypertable)
    }

    pub fn index_exists(&self, table: &str, index: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.indexes.contains(index))
    }

    pub fn view_exists(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }

    fn table_mut(&mut self, op: &str, name: &str) -> Result<&mut VirtualTable, OrderError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| OrderError::TableNotFound {
                op: op.to_string(),
                table: name.to_string(),
            })
    }

    fn hypertable_mut(&mut self, op: &str, name: &str) -> Result<&mut VirtualTable, OrderError> {
        let table = self.table_mut(op, name)?;
        if !table.hypertable {
            return Err(OrderError::NotAHypertable {
                op: op.to_string(),
                table: name.to_string(),
            });
        }
        Ok(table)
    }

    fn require_table(&self, op: &str, name: &str) -> Result<(), OrderError> {
        if self.table_exists(name) {
            Ok(())
        } else {
            Err(OrderError::TableNotFound {
                op: op.to_string(),
                table: name.to_string(),
            })
        }
    }

    fn dependent_view(&self, source: &str) -> Option<&str> {
        self.views
            .iter()
            .find(|(_, v)| v.source == source)
            .map(|(name, _)| name.as_str())
    }

    /// Apply an operation, validating its preconditions.
    pub fn apply(&mut self, operation: &Operation) -> Result<(), OrderError> {
        let op = operation.to_string();

        match &operation.kind {
            OperationKind::Relational(relational) => self.apply_relational(&op, relational)?,

            OperationKind::CreateHypertable(create) => {
                let table = self.table_mut(&op, &create.table)?;
                if table.hypertable {
                    return Err(OrderError::AlreadyAHypertable {
                        op,
                        table: create.table.clone(),
                    });
                }
                table.hypertable = true;
            }

            OperationKind::AlterHypertable(alter) => {
                self.hypertable_mut(&op, &alter.table)?;
            }

            OperationKind::CreateContinuousAggregate(create) => {
                let view = &create.definition.view_name;
                let source = &create.definition.source_hypertable;
                if self.view_exists(view) {
                    return Err(OrderError::ViewAlreadyExists {
                        op,
                        view: view.clone(),
                    });
                }
                if !self.is_hypertable(source) && !self.view_exists(source) {
                    return Err(OrderError::SourceNotFound {
                        op,
                        source_name: source.clone(),
                    });
                }
                self.views.insert(
                    view.clone(),
                    VirtualView {
                        source: source.clone(),
                        refresh_policy: false,
                    },
                );
            }

            OperationKind::AlterContinuousAggregate(alter) => {
                if !self.view_exists(&alter.view_name) {
                    return Err(OrderError::ViewNotFound {
                        op,
                        view: alter.view_name.clone(),
                    });
                }
            }

            OperationKind::DropContinuousAggregate(drop) => {
                if let Some(dependent) = self.dependent_view(&drop.view_name) {
                    return Err(OrderError::StillReferenced {
                        op: op.clone(),
                        target: drop.view_name.clone(),
                        dependent: dependent.to_string(),
                    });
                }
                if self.views.remove(&drop.view_name).is_none() && !drop.if_exists {
                    return Err(OrderError::ViewNotFound {
                        op,
                        view: drop.view_name.clone(),
                    });
                }
            }

            OperationKind::AddContinuousAggregatePolicy(add) => {
                let Some(view) = self.views.get_mut(&add.view_name) else {
                    return Err(OrderError::ViewNotFound {
                        op,
                        view: add.view_name.clone(),
                    });
                };
                if view.refresh_policy {
                    return Err(OrderError::PolicyAlreadyExists {
                        op,
                        target: add.view_name.clone(),
                    });
                }
                view.refresh_policy = true;
            }

            OperationKind::RemoveContinuousAggregatePolicy(remove) => {
                let removed = match self.views.get_mut(&remove.view_name) {
                    Some(view) => std::mem::replace(&mut view.refresh_policy, false),
                    None => false,
                };
                if !removed && !remove.if_exists {
                    return Err(OrderError::PolicyNotFound {
                        op,
                        target: remove.view_name.clone(),
                    });
                }
            }

            OperationKind::AddReorderPolicy(add) => {
                let index = &add.policy.index_name;
                let table = self.hypertable_mut(&op, &add.table)?;
                if !table.indexes.contains(index) {
                    return Err(OrderError::IndexNotFound {
                        op,
                        table: add.table.clone(),
                        index: index.clone(),
                    });
                }
                if !table.reorder_policies.insert(index.clone()) {
                    return Err(OrderError::PolicyAlreadyExists {
                        op,
                        target: format!("{}.{}", add.table, index),
                    });
                }
            }

            OperationKind::AlterReorderPolicy(alter) => {
                let table = self.table_mut(&op, &alter.table)?;
                if !table.reorder_policies.contains(&alter.index_name) {
                    return Err(OrderError::PolicyNotFound {
                        op,
                        target: format!("{}.{}", alter.table, alter.index_name),
                    });
                }
            }

            OperationKind::RemoveReorderPolicy(remove) => {
                let removed = self
                    .tables
                    .get_mut(&remove.table)
                    .is_some_and(|t| t.reorder_policies.remove(&remove.index_name));
                if !removed && !remove.if_exists {
                    return Err(OrderError::PolicyNotFound {
                        op,
                        target: format!("{}.{}", remove.table, remove.index_name),
                    });
                }
            }
        }

        Ok(())
    }

    fn apply_relational(
        &mut self,
        op: &str,
        relational: &RelationalOperation,
    ) -> Result<(), OrderError> {
        match relational {
            RelationalOperation::CreateTable { name } => {
                if self.table_exists(name) {
                    return Err(OrderError::TableAlreadyExists {
                        op: op.to_string(),
                        table: name.clone(),
                    });
                }
                self.tables.insert(name.clone(), VirtualTable::default());
            }

            RelationalOperation::DropTable { name } => {
                self.require_table(op, name)?;
                if let Some(dependent) = self.dependent_view(name) {
                    return Err(OrderError::StillReferenced {
                        op: op.to_string(),
                        target: name.clone(),
                        dependent: dependent.to_string(),
                    });
                }
                self.tables.remove(name);
            }

            RelationalOperation::RenameTable { from, to } => {
                if self.table_exists(to) {
                    return Err(OrderError::TableAlreadyExists {
                        op: op.to_string(),
                        table: to.clone(),
                    });
                }
                let table = self
                    .tables
                    .remove(from)
                    .ok_or_else(|| OrderError::TableNotFound {
                        op: op.to_string(),
                        table: from.clone(),
                    })?;
                self.tables.insert(to.clone(), table);
                for view in self.views.values_mut() {
                    if &view.source == from {
                        view.source = to.clone();
                    }
                }
            }

            RelationalOperation::AddColumn { table, .. }
            | RelationalOperation::DropColumn { table, .. }
            | RelationalOperation::AlterColumn { table, .. }
            | RelationalOperation::DropForeignKey { table, .. } => {
                self.require_table(op, table)?;
            }

            RelationalOperation::CreateIndex { table, name } => {
                let t = self.table_mut(op, table)?;
                if !t.indexes.insert(name.clone()) {
                    return Err(OrderError::IndexAlreadyExists {
                        op: op.to_string(),
                        table: table.clone(),
                        index: name.clone(),
                    });
                }
            }

            RelationalOperation::DropIndex { table, name } => {
                let t = self.table_mut(op, table)?;
                if t.reorder_policies.contains(name) {
                    return Err(OrderError::StillReferenced {
                        op: op.to_string(),
                        target: name.clone(),
                        dependent: format!("reorder policy on {}", table),
                    });
                }
                if !t.indexes.remove(name) {
                    return Err(OrderError::IndexNotFound {
                        op: op.to_string(),
                        table: table.clone(),
                        index: name.clone(),
                    });
                }
            }

            RelationalOperation::AddForeignKey {
                table,
                references_table,
                ..
            } => {
                self.require_table(op, table)?;
                self.require_table(op, references_table)?;
            }

            RelationalOperation::Sql { .. } => {}
        }

        Ok(())
    }
}

/// Replay `ops` in order against a copy of `catalog`.
///
/// Returns the resulting catalog, or the first operation that would fail.
pub fn validate_order(
    ops: &[Operation],
    catalog: &VirtualCatalog,
) -> Result<VirtualCatalog, OrderError> {
    let mut catalog = catalog.clone();
    for op in ops {
        catalog.apply(op)?;
    }
    Ok(catalog)
}
