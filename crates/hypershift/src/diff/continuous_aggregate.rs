use crate::model::{ContinuousAggregateSpec, Model};
use crate::operation::{
    AlterContinuousAggregate, CreateContinuousAggregate, DropContinuousAggregate, Operation,
    OperationKind,
};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Diff the continuous aggregates of two models.
///
/// The bucket width, aggregate list, group-by columns, filter, source and
/// time column fix the physical shape of the materialization: changing any
/// of them drops and recreates the view. The remaining settings are altered
/// in place.
///
/// A continuous aggregate can read from another one. Drops are emitted
/// dependents first and creates sources first, and recreating a view also
/// recreates every view stacked on it.
pub fn diff_continuous_aggregates(old: Option<&Model>, new: Option<&Model>) -> Vec<Operation> {
    let recreated = recreated_views(old, new);
    let mut ops = Vec::new();

    if let Some(old) = old {
        let mut drops: Vec<&ContinuousAggregateSpec> = old
            .continuous_aggregates()
            .filter(|cagg| {
                recreated.contains(&cagg.view_name)
                    || new
                        .and_then(|m| m.continuous_aggregate(&cagg.view_name))
                        .is_none()
            })
            .collect();
        drops.sort_by_key(|cagg| Reverse(stack_depth(old, cagg)));
        ops.extend(drops.into_iter().map(|cagg| drop_continuous_aggregate(&cagg.view_name)));
    }

    let Some(new) = new else {
        return ops;
    };

    let mut creates = Vec::new();
    let mut alters = Vec::new();
    for cagg in new.continuous_aggregates() {
        match old.and_then(|m| m.continuous_aggregate(&cagg.view_name)) {
            None => creates.push(cagg),
            Some(_) if recreated.contains(&cagg.view_name) => {
                tracing::debug!(view = %cagg.view_name, "recreating continuous aggregate");
                creates.push(cagg);
            }
            Some(previous) if previous.settings_differ(cagg) => {
                alters.push(alter_continuous_aggregate(previous, cagg));
            }
            Some(_) => {}
        }
    }
    creates.sort_by_key(|cagg| stack_depth(new, cagg));
    ops.extend(creates.into_iter().map(create_continuous_aggregate));
    ops.extend(alters);

    ops
}

/// Views present on both sides that must be dropped and created again:
/// those whose shape changed, plus everything stacked on one of them.
pub(super) fn recreated_views(old: Option<&Model>, new: Option<&Model>) -> HashSet<String> {
    let (Some(old), Some(new)) = (old, new) else {
        return HashSet::new();
    };

    let mut recreated: HashSet<String> = new
        .continuous_aggregates()
        .filter(|cagg| {
            old.continuous_aggregate(&cagg.view_name)
                .is_some_and(|previous| previous.requires_recreate(cagg))
        })
        .map(|cagg| cagg.view_name.clone())
        .collect();

    loop {
        let stacked: Vec<String> = new
            .continuous_aggregates()
            .filter(|cagg| {
                !recreated.contains(&cagg.view_name)
                    && recreated.contains(&cagg.source_hypertable)
                    && old.continuous_aggregate(&cagg.view_name).is_some()
            })
            .map(|cagg| cagg.view_name.clone())
            .collect();
        if stacked.is_empty() {
            return recreated;
        }
        recreated.extend(stacked);
    }
}

/// Number of continuous aggregates between `cagg` and its hypertable.
fn stack_depth(model: &Model, cagg: &ContinuousAggregateSpec) -> usize {
    let mut depth = 0;
    let mut source = cagg.source_hypertable.as_str();
    // Bounded by the view count so a cyclic model can't hang the differ.
    while depth < model.views.len() {
        let Some(parent) = model.continuous_aggregate(source) else {
            break;
        };
        depth += 1;
        source = parent.source_hypertable.as_str();
    }
    depth
}

fn create_continuous_aggregate(cagg: &ContinuousAggregateSpec) -> Operation {
    tracing::debug!(
        view = %cagg.view_name,
        source = %cagg.source_hypertable,
        bucket = %cagg.time_bucket_width,
        "create continuous aggregate"
    );
    Operation::new(OperationKind::CreateContinuousAggregate(
        CreateContinuousAggregate {
            definition: cagg.clone(),
        },
    ))
}

fn drop_continuous_aggregate(view_name: &str) -> Operation {
    tracing::debug!(view = %view_name, "drop continuous aggregate");
    Operation::new(OperationKind::DropContinuousAggregate(DropContinuousAggregate {
        view_name: view_name.to_string(),
        if_exists: true,
    }))
}

fn alter_continuous_aggregate(
    old: &ContinuousAggregateSpec,
    new: &ContinuousAggregateSpec,
) -> Operation {
    tracing::debug!(view = %new.view_name, "alter continuous aggregate");
    Operation::new(OperationKind::AlterContinuousAggregate(AlterContinuousAggregate {
        view_name: new.view_name.clone(),
        old_chunk_interval: old.chunk_interval.clone(),
        chunk_interval: new.chunk_interval.clone(),
        old_materialized_only: old.materialized_only,
        materialized_only: new.materialized_only,
        old_create_group_indexes: old.create_group_indexes,
        create_group_indexes: new.create_group_indexes,
        old_with_no_data: old.with_no_data,
        with_no_data: new.with_no_data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AggregateFunction, AggregateKind, View};

    fn daily() -> ContinuousAggregateSpec {
        ContinuousAggregateSpec::new("metrics_daily", "metrics", "time", "1 day")
            .aggregate(AggregateFunction::new("avg_value", AggregateKind::Avg, "value"))
            .aggregate(AggregateFunction::new("max_value", AggregateKind::Max, "value"))
            .group_by("device_id")
    }

    fn model(caggs: Vec<ContinuousAggregateSpec>) -> Model {
        caggs
            .into_iter()
            .map(View::continuous_aggregate)
            .fold(Model::new(), Model::with_view)
    }

    fn kinds(ops: &[Operation]) -> Vec<&'static str> {
        ops.iter()
            .map(|op| match op.kind {
                OperationKind::CreateContinuousAggregate(_) => "create",
                OperationKind::AlterContinuousAggregate(_) => "alter",
                OperationKind::DropContinuousAggregate(_) => "drop",
                _ => "other",
            })
            .collect()
    }

    fn assert_recreated(old: ContinuousAggregateSpec, new: ContinuousAggregateSpec) {
        let old_model = model(vec![old]);
        let new_model = model(vec![new.clone()]);
        let ops = diff_continuous_aggregates(Some(&old_model), Some(&new_model));
        assert_eq!(kinds(&ops), vec!["drop", "create"]);

        let OperationKind::DropContinuousAggregate(drop) = &ops[0].kind else {
            unreachable!()
        };
        assert!(drop.if_exists);
        let OperationKind::CreateContinuousAggregate(create) = &ops[1].kind else {
            unreachable!()
        };
        assert_eq!(create.definition, new);
    }

    #[test]
    fn test_identical_is_noop() {
        let m = model(vec![daily()]);
        assert!(diff_continuous_aggregates(Some(&m), Some(&m)).is_empty());
    }

    #[test]
    fn test_plain_views_are_ignored() {
        let old = Model::new().with_view(View::new("active_devices"));
        let new = Model::new();
        assert!(diff_continuous_aggregates(Some(&old), Some(&new)).is_empty());
    }

    #[test]
    fn test_create_and_drop() {
        let old = model(vec![daily()]);
        let hourly = ContinuousAggregateSpec::new("metrics_hourly", "metrics", "time", "1 hour");
        let new = model(vec![hourly]);

        let ops = diff_continuous_aggregates(Some(&old), Some(&new));
        assert_eq!(kinds(&ops), vec!["drop", "create"]);
        let OperationKind::DropContinuousAggregate(drop) = &ops[0].kind else {
            unreachable!()
        };
        assert_eq!(drop.view_name, "metrics_daily");
        assert!(drop.if_exists);
    }

    #[test]
    fn test_null_models() {
        let m = model(vec![daily()]);
        assert_eq!(kinds(&diff_continuous_aggregates(None, Some(&m))), vec!["create"]);
        let ops = diff_continuous_aggregates(Some(&m), None);
        assert_eq!(kinds(&ops), vec!["drop"]);
        let OperationKind::DropContinuousAggregate(drop) = &ops[0].kind else {
            unreachable!()
        };
        assert!(drop.if_exists);
        assert!(diff_continuous_aggregates(None, None).is_empty());
    }

    #[test]
    fn test_aggregate_list_change_recreates() {
        let mut new = daily();
        new.aggregate_functions
            .push(AggregateFunction::new("min_value", AggregateKind::Min, "value"));
        assert_recreated(daily(), new);
    }

    #[test]
    fn test_aggregate_order_change_recreates() {
        let mut new = daily();
        new.aggregate_functions.reverse();
        assert_recreated(daily(), new);
    }

    #[test]
    fn test_group_by_change_recreates() {
        assert_recreated(daily(), daily().group_by("region"));
    }

    #[test]
    fn test_where_clause_change_recreates() {
        assert_recreated(daily(), daily().filter("value > 0"));
    }

    #[test]
    fn test_bucket_width_change_recreates() {
        let mut new = daily();
        new.time_bucket_width = "12 hours".to_string();
        assert_recreated(daily(), new);
    }

    #[test]
    fn test_structural_change_wins_over_settings() {
        let mut new = daily().filter("value > 0");
        new.materialized_only = false;
        assert_recreated(daily(), new);
    }

    #[test]
    fn test_chunk_interval_change_alters() {
        let mut new = daily();
        new.chunk_interval = Some("30 days".to_string());

        let old_model = model(vec![daily()]);
        let new_model = model(vec![new]);
        let ops = diff_continuous_aggregates(Some(&old_model), Some(&new_model));
        assert_eq!(kinds(&ops), vec!["alter"]);

        let OperationKind::AlterContinuousAggregate(alter) = &ops[0].kind else {
            unreachable!()
        };
        assert_eq!(alter.view_name, "metrics_daily");
        assert_eq!(alter.old_chunk_interval, None);
        assert_eq!(alter.chunk_interval.as_deref(), Some("30 days"));
        assert_eq!(alter.old_materialized_only, alter.materialized_only);
    }

    #[test]
    fn test_settings_changes_alter() {
        let mut new = daily();
        new.materialized_only = false;
        new.create_group_indexes = true;

        let old_model = model(vec![daily()]);
        let new_model = model(vec![new]);
        let ops = diff_continuous_aggregates(Some(&old_model), Some(&new_model));
        assert_eq!(kinds(&ops), vec!["alter"]);

        let OperationKind::AlterContinuousAggregate(alter) = &ops[0].kind else {
            unreachable!()
        };
        assert!(alter.old_materialized_only);
        assert!(!alter.materialized_only);
        assert!(!alter.old_create_group_indexes);
        assert!(alter.create_group_indexes);
    }

    #[test]
    fn test_policy_change_is_not_a_view_change() {
        let new = daily().refresh_policy(crate::model::ContinuousAggregatePolicySpec::new(
            "3 days", "1 hour", "1 hour",
        ));
        let old_model = model(vec![daily()]);
        let new_model = model(vec![new]);
        assert!(diff_continuous_aggregates(Some(&old_model), Some(&new_model)).is_empty());
    }

    #[test]
    fn test_source_change_recreates() {
        let mut new = daily();
        new.source_hypertable = "metrics_v2".to_string();
        assert_recreated(daily(), new);
    }

    #[test]
    fn test_time_column_change_recreates() {
        let mut new = daily();
        new.time_column = "recorded_at".to_string();
        assert_recreated(daily(), new);
    }

    #[test]
    fn test_with_no_data_change_alters() {
        let mut new = daily();
        new.with_no_data = true;

        let old_model = model(vec![daily()]);
        let new_model = model(vec![new]);
        let ops = diff_continuous_aggregates(Some(&old_model), Some(&new_model));
        assert_eq!(kinds(&ops), vec!["alter"]);

        let OperationKind::AlterContinuousAggregate(alter) = &ops[0].kind else {
            unreachable!()
        };
        assert!(!alter.old_with_no_data);
        assert!(alter.with_no_data);
        assert_eq!(alter.old_chunk_interval, alter.chunk_interval);
    }

    fn hourly() -> ContinuousAggregateSpec {
        ContinuousAggregateSpec::new("metrics_hourly", "metrics", "time", "1 hour")
            .aggregate(AggregateFunction::new("avg_value", AggregateKind::Avg, "value"))
    }

    fn rollup() -> ContinuousAggregateSpec {
        ContinuousAggregateSpec::new("metrics_daily", "metrics_hourly", "bucket", "1 day")
            .aggregate(AggregateFunction::new("avg_value", AggregateKind::Avg, "avg_value"))
    }

    fn rendered(ops: &[Operation]) -> Vec<String> {
        ops.iter().map(|op| op.to_string()).collect()
    }

    #[test]
    fn test_stacked_views_drop_dependents_first() {
        let old = model(vec![hourly(), rollup()]);
        let ops = diff_continuous_aggregates(Some(&old), Some(&Model::new()));
        assert_eq!(
            rendered(&ops),
            vec!["- continuous aggregate metrics_daily", "- continuous aggregate metrics_hourly"]
        );
    }

    #[test]
    fn test_stacked_views_create_sources_first() {
        let new = model(vec![rollup(), hourly()]);
        let ops = diff_continuous_aggregates(None, Some(&new));
        assert_eq!(
            rendered(&ops),
            vec![
                "+ continuous aggregate metrics_hourly on metrics (1 hour)",
                "+ continuous aggregate metrics_daily on metrics_hourly (1 day)",
            ]
        );
    }

    #[test]
    fn test_recreating_a_source_recreates_dependents() {
        let old = model(vec![hourly(), rollup()]);
        let mut reshaped = hourly();
        reshaped.time_bucket_width = "30 minutes".to_string();
        let new = model(vec![reshaped, rollup()]);

        let ops = diff_continuous_aggregates(Some(&old), Some(&new));
        assert_eq!(
            rendered(&ops),
            vec![
                "- continuous aggregate metrics_daily",
                "- continuous aggregate metrics_hourly",
                "+ continuous aggregate metrics_hourly on metrics (30 minutes)",
                "+ continuous aggregate metrics_daily on metrics_hourly (1 day)",
            ]
        );

        let recreated = recreated_views(Some(&old), Some(&new));
        assert!(recreated.contains("metrics_hourly"));
        assert!(recreated.contains("metrics_daily"));
    }

    #[test]
    fn test_cyclic_sources_terminate() {
        let a = ContinuousAggregateSpec::new("a", "b", "bucket", "1 day");
        let b = ContinuousAggregateSpec::new("b", "a", "bucket", "1 day");
        let ops = diff_continuous_aggregates(None, Some(&model(vec![a, b])));
        assert_eq!(kinds(&ops), vec!["create", "create"]);
    }
}
