//! Feature differs - compare two model snapshots and produce operations.
//!
//! There is one differ per TimescaleDB feature. Each is a pure function of
//! the old and new [`Model`]; they share no state and can run in any order.
//! A `None` model stands for "nothing declared": a missing old model makes
//! everything on the new side a create/add, a missing new model makes the
//! policies and continuous aggregates on the old side removals. Hypertables
//! are the exception: a missing new model yields nothing, since dropping the
//! table is the relational differ's job.
//!
//! The output of each differ is in emission order, not execution order.
//! [`crate::plan`] sorts everything by priority.

mod continuous_aggregate;
mod continuous_aggregate_policy;
mod hypertable;
mod reorder_policy;

pub use continuous_aggregate::diff_continuous_aggregates;
pub use continuous_aggregate_policy::diff_continuous_aggregate_policies;
pub use hypertable::diff_hypertables;
pub use reorder_policy::diff_reorder_policies;

use crate::{Config, Model, Operation};

/// Run all four feature differs and concatenate their output.
pub fn diff_features(
    old: Option<&Model>,
    new: Option<&Model>,
    config: &Config,
) -> Vec<Operation> {
    let mut ops = diff_hypertables(old, new, config);
    ops.extend(diff_continuous_aggregates(old, new));
    ops.extend(diff_continuous_aggregate_policies(old, new));
    ops.extend(diff_reorder_policies(old, new));

    tracing::debug!(operations = ops.len(), "feature diff complete");
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AggregateFunction, AggregateKind, ContinuousAggregatePolicySpec, ContinuousAggregateSpec,
        Dimension, HypertableSpec, ReorderPolicySpec, Table, View,
    };
    use proptest::prelude::*;

    fn full_model() -> Model {
        Model::new()
            .with_table(
                Table::new("metrics")
                    .with_hypertable(
                        HypertableSpec::new("time")
                            .chunk_time_interval("1 day")
                            .compressed()
                            .dimension(Dimension::hash("device_id", 4)),
                    )
                    .with_reorder_policy(ReorderPolicySpec::new("metrics_device_time_idx")),
            )
            .with_view(View::continuous_aggregate(
                ContinuousAggregateSpec::new("metrics_hourly", "metrics", "time", "1 hour")
                    .aggregate(AggregateFunction::new("avg_value", AggregateKind::Avg, "value"))
                    .group_by("device_id")
                    .refresh_policy(ContinuousAggregatePolicySpec::new(
                        "1 day", "1 hour", "1 hour",
                    )),
            ))
    }

    #[test]
    fn test_self_diff_is_empty() {
        let m = full_model();
        assert!(diff_features(Some(&m), Some(&m), &Config::default()).is_empty());
    }

    #[test]
    fn test_null_old_creates_everything() {
        let ops = diff_features(None, Some(&full_model()), &Config::default());
        let rendered: Vec<String> = ops.iter().map(|op| op.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "+ hypertable metrics (time, 1 day)",
                "+ continuous aggregate metrics_hourly on metrics (1 hour)",
                "+ refresh policy on metrics_hourly",
                "+ reorder policy on metrics using metrics_device_time_idx",
            ]
        );
    }

    #[test]
    fn test_null_new_removes_policies_and_views() {
        let ops = diff_features(Some(&full_model()), None, &Config::default());
        let rendered: Vec<String> = ops.iter().map(|op| op.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "- continuous aggregate metrics_hourly",
                "- refresh policy on metrics_hourly",
                "- reorder policy on metrics using metrics_device_time_idx",
            ]
        );
    }

    fn arb_interval() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["1 hour", "6 hours", "1 day", "7 days"]).prop_map(String::from)
    }

    fn arb_model() -> impl Strategy<Value = Model> {
        let table = (
            "[a-z]{1,8}",
            prop::option::of(arb_interval()),
            any::<bool>(),
            prop::collection::vec("[a-z]{1,4}", 0..3),
            prop::option::of(arb_interval()),
        );
        prop::collection::vec(table, 0..6).prop_map(|tables| {
            let mut model = Model::new();
            for (name, interval, compressed, skip, reorder_interval) in tables {
                let mut spec = HypertableSpec::new("time");
                spec.chunk_time_interval = interval;
                spec.enable_compression = compressed;
                spec.chunk_skip_columns = skip;
                let mut policy = ReorderPolicySpec::new(format!("{}_time_idx", name));
                policy.schedule_interval = reorder_interval.clone();

                let cagg = ContinuousAggregateSpec::new(
                    format!("{}_daily", name),
                    name.clone(),
                    "time",
                    "1 day",
                )
                .refresh_policy(ContinuousAggregatePolicySpec {
                    schedule_interval: reorder_interval,
                    ..ContinuousAggregatePolicySpec::default()
                });

                model = model
                    .with_table(
                        Table::new(name)
                            .with_hypertable(spec)
                            .with_reorder_policy(policy),
                    )
                    .with_view(View::continuous_aggregate(cagg));
            }
            model
        })
    }

    proptest! {
        #[test]
        fn prop_self_diff_is_empty(model in arb_model()) {
            prop_assert!(diff_features(Some(&model), Some(&model), &Config::default()).is_empty());
        }
    }
}
