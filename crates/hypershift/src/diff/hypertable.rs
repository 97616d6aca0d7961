use crate::model::{HypertableSpec, Model, Table};
use crate::operation::{AlterHypertable, CreateHypertable, Operation, OperationKind};
use crate::Config;

/// Diff the hypertable annotations of two models.
///
/// Removing a table (and with it its hypertable metadata) is left to the
/// relational differ, so a missing `new` model yields no operations.
pub fn diff_hypertables(
    old: Option<&Model>,
    new: Option<&Model>,
    config: &Config,
) -> Vec<Operation> {
    let Some(new) = new else {
        return Vec::new();
    };

    let mut ops = Vec::new();

    for table in new.tables.values() {
        let previous = old.and_then(|m| m.get_table(&table.name));

        match (previous.and_then(|t| t.hypertable.as_ref()), &table.hypertable) {
            (None, Some(spec)) => {
                ops.push(create_hypertable(table, spec, config));
            }
            (Some(old_spec), Some(new_spec)) => {
                if let Some(op) = alter_hypertable(&table.name, old_spec, new_spec) {
                    ops.push(op);
                }
            }
            (Some(_), None) => {
                tracing::warn!(
                    table = %table.name,
                    "hypertable annotation removed; hypertables cannot revert to plain tables"
                );
            }
            (None, None) => {}
        }
    }

    ops
}

fn create_hypertable(table: &Table, spec: &HypertableSpec, config: &Config) -> Operation {
    let op = CreateHypertable {
        table: table.name.clone(),
        time_column: spec.time_column.clone(),
        chunk_time_interval: spec
            .chunk_time_interval
            .clone()
            .unwrap_or_else(|| config.chunk_time_interval().to_string()),
        migrate_data: spec.migrate_data.unwrap_or_else(|| config.migrate_data()),
        enable_compression: spec.enable_compression,
        chunk_skip_columns: spec.chunk_skip_columns.clone(),
        additional_dimensions: spec.additional_dimensions.clone(),
    };
    tracing::debug!(
        table = %op.table,
        time_column = %op.time_column,
        chunk_time_interval = %op.chunk_time_interval,
        "create hypertable"
    );
    Operation::new(OperationKind::CreateHypertable(op))
}

/// Returns an alter carrying every old/new pair if any field differs.
fn alter_hypertable(table: &str, old: &HypertableSpec, new: &HypertableSpec) -> Option<Operation> {
    let changed = old.chunk_time_interval != new.chunk_time_interval
        || old.enable_compression != new.enable_compression
        || !old.same_chunk_skip_columns(new)
        || old.additional_dimensions != new.additional_dimensions;

    if !changed {
        return None;
    }

    tracing::debug!(table = %table, "alter hypertable");
    Some(Operation::new(OperationKind::AlterHypertable(AlterHypertable {
        table: table.to_string(),
        old_chunk_time_interval: old.chunk_time_interval.clone(),
        chunk_time_interval: new.chunk_time_interval.clone(),
        old_enable_compression: old.enable_compression,
        enable_compression: new.enable_compression,
        old_chunk_skip_columns: old.chunk_skip_columns.clone(),
        chunk_skip_columns: new.chunk_skip_columns.clone(),
        old_additional_dimensions: old.additional_dimensions.clone(),
        additional_dimensions: new.additional_dimensions.clone(),
    })))
}
