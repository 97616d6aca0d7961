//! Operation composer - splice feature operations into the baseline.
//!
//! The upstream relational differ hands us a list that is already in
//! dependency order (a table before its indexes, an index before the foreign
//! key that needs it), almost all of it at priority 0. Feature operations
//! are appended and the whole list is sorted by priority.
//!
//! The sort must be stable. With hundreds of priority-0 operations, an
//! unstable sort scrambles their relative order once the input outgrows the
//! small-slice insertion-sort path, and a table create can land after its
//! own index. `slice::sort_by_key` is stable; `sort_unstable_by_key` is not
//! and must not be used here.
//!
//! Stability also keeps equal-priority neighbours adjacent: operations that
//! share session state (a `SET` followed by the statement it affects) stay
//! together as long as they carry the same priority.

use crate::diff::diff_features;
use crate::{Config, Model, Operation};
use std::fmt;

/// Merge `baseline` and `feature` operations into execution order.
pub fn plan(baseline: Vec<Operation>, feature: Vec<Operation>) -> Vec<Operation> {
    let mut ops = baseline;
    ops.extend(feature);
    ops.sort_by_key(|op| op.priority);
    ops
}

/// Diff the features of `old` and `new` and compose them with `baseline`.
pub fn plan_migration(
    old: Option<&Model>,
    new: Option<&Model>,
    baseline: Vec<Operation>,
    config: &Config,
) -> Plan {
    let baseline_len = baseline.len();
    let feature = diff_features(old, new, config);
    let feature_len = feature.len();

    let operations = plan(baseline, feature);
    tracing::debug!(
        baseline = baseline_len,
        feature = feature_len,
        total = operations.len(),
        "planned migration"
    );

    Plan { operations }
}

/// An ordered list of operations, ready for a SQL generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// Number of operations that came from the feature differs.
    pub fn feature_count(&self) -> usize {
        self.operations.iter().filter(|op| !op.is_relational()).count()
    }
}

impl IntoIterator for Plan {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
        } else {
            for op in &self.operations {
                writeln!(f, "{}", op)?;
            }
        }
        Ok(())
    }
}
