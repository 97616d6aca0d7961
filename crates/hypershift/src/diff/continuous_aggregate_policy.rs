use super::continuous_aggregate::recreated_views;
use crate::model::{ContinuousAggregatePolicySpec, Model};
use crate::operation::{
    AddContinuousAggregatePolicy, Operation, OperationKind, RemoveContinuousAggregatePolicy,
};

/// Diff the refresh policies of continuous aggregates.
///
/// Refresh policies are job registrations keyed only by the view, with no
/// partial update: any change re-registers the policy (remove, then add).
/// Removals use `if_exists` so they stay idempotent when the job is already
/// gone.
pub fn diff_continuous_aggregate_policies(
    old: Option<&Model>,
    new: Option<&Model>,
) -> Vec<Operation> {
    let recreated = recreated_views(old, new);
    let mut ops = Vec::new();

    if let Some(old) = old {
        for cagg in old.continuous_aggregates() {
            if cagg.refresh_policy.is_none() {
                continue;
            }
            let still_defined = new
                .and_then(|m| m.continuous_aggregate(&cagg.view_name))
                .and_then(|c| c.refresh_policy.as_ref())
                .is_some();
            if !still_defined {
                ops.push(remove_policy(&cagg.view_name));
            }
        }
    }

    let Some(new) = new else {
        return ops;
    };

    for cagg in new.continuous_aggregates() {
        let Some(policy) = &cagg.refresh_policy else {
            continue;
        };

        match old.and_then(|m| m.continuous_aggregate(&cagg.view_name)) {
            None => ops.push(add_policy(&cagg.view_name, policy)),
            // Dropping the view drops its job with it.
            Some(previous) if recreated.contains(&cagg.view_name) => {
                if previous.refresh_policy.is_some() {
                    ops.push(remove_policy(&cagg.view_name));
                }
                ops.push(add_policy(&cagg.view_name, policy));
            }
            Some(previous) => match &previous.refresh_policy {
                None => ops.push(add_policy(&cagg.view_name, policy)),
                Some(old_policy) if old_policy != policy => {
                    tracing::debug!(view = %cagg.view_name, "re-registering refresh policy");
                    ops.push(remove_policy(&cagg.view_name));
                    ops.push(add_policy(&cagg.view_name, policy));
                }
                Some(_) => {}
            },
        }
    }

    ops
}

fn add_policy(view_name: &str, policy: &ContinuousAggregatePolicySpec) -> Operation {
    tracing::debug!(view = %view_name, "add refresh policy");
    Operation::new(OperationKind::AddContinuousAggregatePolicy(
        AddContinuousAggregatePolicy {
            view_name: view_name.to_string(),
            policy: policy.clone(),
        },
    ))
}

fn remove_policy(view_name: &str) -> Operation {
    tracing::debug!(view = %view_name, "remove refresh policy");
    Operation::new(OperationKind::RemoveContinuousAggregatePolicy(
        RemoveContinuousAggregatePolicy {
            view_name: view_name.to_string(),
            if_exists: true,
        },
    ))
}
