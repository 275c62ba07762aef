//! Merge-rule table collapsing locally discovered cluster ids.
//!
//! Each worker of the local density pass discovers tentative cluster ids and,
//! whenever two core points with different ids meet, records "the bigger id is
//! really the smaller one". The tables are union-style: an update on a key
//! that already has a target re-points the key at the smaller of the two and
//! unifies the displaced target as well, so that every id ever linked into a
//! component resolves to the component's numeric minimum.

use rustc_hash::FxHashMap;

/// Sparse table mapping a cluster id to a smaller id it merges into.
#[derive(Debug, Default)]
pub(crate) struct Rules {
    table: FxHashMap<i64, i64>,
}

impl Rules {
    /// Record that `index` belongs to the same cluster as the smaller
    /// `target`.
    ///
    /// If `index` is already mapped, neither the old nor the new target may
    /// be dropped: both stay reachable from `index`, re-linked so every
    /// entry points at a strictly smaller id. Chains therefore always
    /// terminate at the component minimum.
    pub(crate) fn update(&mut self, mut index: i64, mut target: i64) {
        use std::collections::hash_map::Entry;

        loop {
            if index == target {
                return;
            }
            debug_assert!(index > target, "rules must point at smaller ids");
            match self.table.entry(index) {
                Entry::Vacant(slot) => {
                    slot.insert(target);
                    return;
                }
                Entry::Occupied(mut slot) => {
                    let existing = *slot.get();
                    if existing > target {
                        slot.insert(target);
                        // The displaced target merges with the new one.
                        index = existing;
                    } else if existing < target {
                        // The new target merges under the existing one.
                        index = target;
                        target = existing;
                    } else {
                        return;
                    }
                }
            }
        }
    }

    /// Look up the merge target for a cluster id, if any.
    #[inline]
    pub(crate) fn rule(&self, cluster: i64) -> Option<i64> {
        self.table.get(&cluster).copied()
    }

    /// Fold another table into this one.
    ///
    /// Replaying every entry through `update` keeps the union property, so
    /// the merge is commutative and associative up to resolution: no matter
    /// in which order worker tables are combined, chain-following ends at
    /// the same component minimum.
    pub(crate) fn merge(&mut self, other: Rules) {
        for (index, target) in other.table {
            self.update(index, target);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(rules: &Rules, mut cluster: i64) -> i64 {
        while let Some(target) = rules.rule(cluster) {
            cluster = target;
        }
        cluster
    }

    #[test]
    fn update_records_rule() {
        let mut rules = Rules::default();
        rules.update(5, 3);
        assert_eq!(rules.rule(5), Some(3));
        assert_eq!(rules.rule(3), None);
    }

    #[test]
    fn update_keeps_displaced_target_reachable() {
        let mut rules = Rules::default();
        rules.update(5, 3);
        rules.update(5, 2);
        assert_eq!(rules.rule(5), Some(2));
        // 3 was merged with 5 before, so it must now resolve to 2 as well.
        assert_eq!(resolve(&rules, 3), 2);
    }

    #[test]
    fn update_unifies_larger_new_target() {
        let mut rules = Rules::default();
        rules.update(5, 2);
        rules.update(5, 3);
        assert_eq!(rules.rule(5), Some(2));
        assert_eq!(resolve(&rules, 3), 2);
    }

    #[test]
    fn update_same_pair_twice_is_noop() {
        let mut rules = Rules::default();
        rules.update(5, 3);
        rules.update(5, 3);
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn merge_is_order_independent() {
        let mut left_first = Rules::default();
        left_first.update(5, 3);
        let mut other = Rules::default();
        other.update(5, 2);
        left_first.merge(other);

        let mut right_first = Rules::default();
        right_first.update(5, 2);
        let mut other = Rules::default();
        other.update(5, 3);
        right_first.merge(other);

        for cluster in [2, 3, 5] {
            assert_eq!(resolve(&left_first, cluster), 2);
            assert_eq!(resolve(&right_first, cluster), 2);
        }
    }

    #[test]
    fn chains_of_arbitrary_depth_resolve() {
        let mut rules = Rules::default();
        for id in (2..100).rev() {
            rules.update(id, id - 1);
        }
        assert_eq!(resolve(&rules, 99), 1);
    }
}
