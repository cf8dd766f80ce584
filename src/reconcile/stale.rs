use std::collections::{BTreeSet, HashSet};

use crate::reconcile::engine::TargetScope;

/// 需要清零的 bucket；None 表示该范围下不做 bucket 清理
pub fn stale_buckets(
    scope: &TargetScope,
    recorded: &HashSet<String>,
    observed: &HashSet<String>,
) -> Option<BTreeSet<String>> {
    match scope {
        TargetScope::All => Some(difference(recorded, observed)),
        TargetScope::Buckets(named) => Some(named_stale(named, recorded, observed)),
        TargetScope::Accounts(_) => None,
    }
}

/// 需要清零的 account；`observed` 应为 reported ∪ failed
pub fn stale_accounts(
    scope: &TargetScope,
    recorded: &HashSet<String>,
    observed: &HashSet<String>,
) -> Option<BTreeSet<String>> {
    match scope {
        TargetScope::All => Some(difference(recorded, observed)),
        TargetScope::Accounts(named) => Some(named_stale(named, recorded, observed)),
        TargetScope::Buckets(_) => None,
    }
}

fn difference(recorded: &HashSet<String>, observed: &HashSet<String>) -> BTreeSet<String> {
    recorded.difference(observed).cloned().collect()
}

/// (named − observed) ∩ recorded
fn named_stale(
    named: &[String],
    recorded: &HashSet<String>,
    observed: &HashSet<String>,
) -> BTreeSet<String> {
    named
        .iter()
        .filter(|n| !observed.contains(*n) && recorded.contains(*n))
        .cloned()
        .collect()
}
