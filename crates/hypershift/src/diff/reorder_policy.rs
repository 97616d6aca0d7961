use crate::model::{Model, ReorderPolicySpec};
use crate::operation::{
    AddReorderPolicy, AlterReorderPolicy, Operation, OperationKind, RemoveReorderPolicy,
};

fn find_policy<'a>(
    model: Option<&'a Model>,
    table: &str,
    index: &str,
) -> Option<&'a ReorderPolicySpec> {
    model?
        .get_table(table)?
        .reorder_policies
        .iter()
        .find(|p| p.index_name == index)
}

/// Diff reorder policies, keyed by `(table, index_name)`.
///
/// The job settings (schedule interval, max runtime, max retries, retry
/// period) are altered in place. The index and initial start are fixed when
/// the job is registered, so changing either is a remove plus an add.
pub fn diff_reorder_policies(old: Option<&Model>, new: Option<&Model>) -> Vec<Operation> {
    let mut ops = Vec::new();

    if let Some(old) = old {
        for table in old.tables.values() {
            for policy in &table.reorder_policies {
                if find_policy(new, &table.name, &policy.index_name).is_none() {
                    ops.push(remove_policy(&table.name, &policy.index_name));
                }
            }
        }
    }

    let Some(new) = new else {
        return ops;
    };

    for table in new.tables.values() {
        for policy in &table.reorder_policies {
            match find_policy(old, &table.name, &policy.index_name) {
                None => ops.push(add_policy(&table.name, policy)),
                Some(previous) if previous.initial_start != policy.initial_start => {
                    ops.push(remove_policy(&table.name, &policy.index_name));
                    ops.push(add_policy(&table.name, policy));
                }
                Some(previous) if previous.job_settings_differ(policy) => {
                    ops.push(alter_policy(&table.name, previous, policy));
                }
                Some(_) => {}
            }
        }
    }

    ops
}

fn add_policy(table: &str, policy: &ReorderPolicySpec) -> Operation {
    tracing::debug!(table = %table, index = %policy.index_name, "add reorder policy");
    Operation::new(OperationKind::AddReorderPolicy(AddReorderPolicy {
        table: table.to_string(),
        policy: policy.clone(),
    }))
}

fn remove_policy(table: &str, index_name: &str) -> Operation {
    tracing::debug!(table = %table, index = %index_name, "remove reorder policy");
    Operation::new(OperationKind::RemoveReorderPolicy(RemoveReorderPolicy {
        table: table.to_string(),
        index_name: index_name.to_string(),
        if_exists: true,
    }))
}

fn alter_policy(table: &str, old: &ReorderPolicySpec, new: &ReorderPolicySpec) -> Operation {
    tracing::debug!(table = %table, index = %new.index_name, "alter reorder policy");
    Operation::new(OperationKind::AlterReorderPolicy(AlterReorderPolicy {
        table: table.to_string(),
        index_name: new.index_name.clone(),
        old_schedule_interval: old.schedule_interval.clone(),
        schedule_interval: new.schedule_interval.clone(),
        old_max_runtime: old.max_runtime.clone(),
        max_runtime: new.max_runtime.clone(),
        old_max_retries: old.max_retries,
        max_retries: new.max_retries,
        old_retry_period: old.retry_period.clone(),
        retry_period: new.retry_period.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Table;
    use chrono::{TimeZone, Utc};

    fn policy() -> ReorderPolicySpec {
        ReorderPolicySpec {
            schedule_interval: Some("1 day".to_string()),
            max_runtime: Some("1 hour".to_string()),
            max_retries: Some(3),
            retry_period: Some("5 minutes".to_string()),
            ..ReorderPolicySpec::new("metrics_time_idx")
        }
    }

    fn model(policies: Vec<ReorderPolicySpec>) -> Model {
        let table = policies
            .into_iter()
            .fold(Table::new("metrics"), Table::with_reorder_policy);
        Model::new().with_table(table)
    }

    fn kinds(ops: &[Operation]) -> Vec<&'static str> {
        ops.iter()
            .map(|op| match op.kind {
                OperationKind::AddReorderPolicy(_) => "add",
                OperationKind::AlterReorderPolicy(_) => "alter",
                OperationKind::RemoveReorderPolicy(_) => "remove",
                _ => "other",
            })
            .collect()
    }

    fn alter(old: ReorderPolicySpec, new: ReorderPolicySpec) -> AlterReorderPolicy {
        let ops = diff_reorder_policies(Some(&model(vec![old])), Some(&model(vec![new])));
        assert_eq!(kinds(&ops), vec!["alter"]);
        match ops.into_iter().next().map(|op| op.kind) {
            Some(OperationKind::AlterReorderPolicy(op)) => op,
            other => panic!("expected AlterReorderPolicy, got {:?}", other),
        }
    }

    #[test]
    fn test_unchanged_is_noop() {
        let m = model(vec![policy()]);
        assert!(diff_reorder_policies(Some(&m), Some(&m)).is_empty());
    }

    #[test]
    fn test_add_and_remove() {
        let ops = diff_reorder_policies(Some(&model(vec![])), Some(&model(vec![policy()])));
        assert_eq!(kinds(&ops), vec!["add"]);

        let ops = diff_reorder_policies(Some(&model(vec![policy()])), Some(&model(vec![])));
        assert_eq!(kinds(&ops), vec!["remove"]);
        let OperationKind::RemoveReorderPolicy(remove) = &ops[0].kind else {
            unreachable!()
        };
        assert_eq!(remove.table, "metrics");
        assert_eq!(remove.index_name, "metrics_time_idx");
        assert!(remove.if_exists);
    }

    #[test]
    fn test_null_models() {
        let m = model(vec![policy()]);
        assert_eq!(kinds(&diff_reorder_policies(None, Some(&m))), vec!["add"]);
        assert_eq!(kinds(&diff_reorder_policies(Some(&m), None)), vec!["remove"]);
        assert!(diff_reorder_policies(None, None).is_empty());
    }

    #[test]
    fn test_index_rename_is_remove_and_add() {
        let renamed = ReorderPolicySpec {
            index_name: "metrics_device_time_idx".to_string(),
            ..policy()
        };
        let ops = diff_reorder_policies(Some(&model(vec![policy()])), Some(&model(vec![renamed])));
        assert_eq!(kinds(&ops), vec!["remove", "add"]);
    }

    #[test]
    fn test_initial_start_change_is_remove_and_add() {
        let moved = ReorderPolicySpec {
            initial_start: Some(Utc.with_ymd_and_hms(2026, 3, 1, 4, 0, 0).unwrap()),
            ..policy()
        };
        let ops = diff_reorder_policies(Some(&model(vec![policy()])), Some(&model(vec![moved])));
        assert_eq!(kinds(&ops), vec!["remove", "add"]);
    }

    #[test]
    fn test_schedule_interval_alter() {
        let op = alter(
            policy(),
            ReorderPolicySpec {
                schedule_interval: Some("12 hours".to_string()),
                ..policy()
            },
        );
        assert_eq!(op.table, "metrics");
        assert_eq!(op.index_name, "metrics_time_idx");
        assert_eq!(op.old_schedule_interval.as_deref(), Some("1 day"));
        assert_eq!(op.schedule_interval.as_deref(), Some("12 hours"));
        assert_eq!(op.old_max_retries, op.max_retries);
    }

    #[test]
    fn test_max_runtime_alter() {
        let op = alter(
            policy(),
            ReorderPolicySpec {
                max_runtime: Some("2 hours".to_string()),
                ..policy()
            },
        );
        assert_eq!(op.old_max_runtime.as_deref(), Some("1 hour"));
        assert_eq!(op.max_runtime.as_deref(), Some("2 hours"));
    }

    #[test]
    fn test_max_retries_alter() {
        let op = alter(
            policy(),
            ReorderPolicySpec {
                max_retries: Some(-1),
                ..policy()
            },
        );
        assert_eq!(op.old_max_retries, Some(3));
        assert_eq!(op.max_retries, Some(-1));
    }

    #[test]
    fn test_retry_period_alter() {
        let op = alter(
            policy(),
            ReorderPolicySpec {
                retry_period: None,
                ..policy()
            },
        );
        assert_eq!(op.old_retry_period.as_deref(), Some("5 minutes"));
        assert_eq!(op.retry_period, None);
    }

    #[test]
    fn test_several_fields_in_one_alter() {
        let op = alter(
            policy(),
            ReorderPolicySpec {
                schedule_interval: Some("6 hours".to_string()),
                max_retries: Some(10),
                ..policy()
            },
        );
        assert_eq!(op.schedule_interval.as_deref(), Some("6 hours"));
        assert_eq!(op.max_retries, Some(10));
    }
}
