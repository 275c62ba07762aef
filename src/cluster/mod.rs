//! Clustering engine: one scan over a point set.
//!
//! A scan builds the point store and the spatial grid, runs the local
//! density pass in parallel over the occupied cells (producing per-worker
//! merge-rule tables that are folded into one), resolves every label
//! through the rule table, and finally restores the caller's point order.
//!
//! Cross-worker mutation during the density pass goes exclusively through
//! the lower-only atomic label updates; the only synchronization after it
//! is the rule-table fold.


#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::grid::{CellRange, SpatialGrid};
use crate::points::{PointStore, NOISE, NOT_VISITED};
use crate::rules::Rules;
use crate::timing::Timed;

/// Run one full scan and write the signed labels, in the caller's input
/// order, into `out`.
///
/// Inputs are assumed validated: `epsilon > 0`, `min_points >= 1`,
/// `out.len()` equals the point count, and the point count is non-zero.
pub(crate) fn run(
    coords: &[f32],
    dimensions: usize,
    epsilon: f32,
    min_points: usize,
    out: &mut [i64],
) {
    let mut store = PointStore::new(coords, dimensions);
    let grid = {
        let _t = Timed::debug("grid build");
        SpatialGrid::build(&mut store, epsilon)
    };
    let rules = {
        let _t = Timed::debug("local density pass");
        local_scan(&store, &grid, epsilon * epsilon, min_points)
    };
    log::debug!("{} merge rules", rules.len());
    {
        let _t = Timed::debug("rule resolution");
        apply_rules(&store, &rules);
    }
    {
        let _t = Timed::debug("order restoration");
        store.restore_order();
    }
    store.write_into(out);
}

/// Parallel local DBSCAN pass.
///
/// Work is split per occupied cell so the candidate list is computed once
/// per cell; cells vary wildly in density, which rayon's work stealing
/// absorbs. Each worker accumulates its own rule table; the tables are
/// folded pairwise afterwards.
pub(crate) fn local_scan(
    store: &PointStore,
    grid: &SpatialGrid,
    eps_squared: f32,
    min_points: usize,
) -> Rules {
    let cells = grid.index().occupied();

    #[cfg(feature = "parallel")]
    {
        cells
            .par_iter()
            .fold(Rules::default, |mut rules, range| {
                scan_cell(store, grid, *range, eps_squared, min_points, &mut rules);
                rules
            })
            .reduce(Rules::default, |mut merged, other| {
                merged.merge(other);
                merged
            })
    }
    #[cfg(not(feature = "parallel"))]
    {
        let mut rules = Rules::default();
        for range in cells {
            scan_cell(store, grid, *range, eps_squared, min_points, &mut rules);
        }
        rules
    }
}

/// Classify every point of one cell.
fn scan_cell(
    store: &PointStore,
    grid: &SpatialGrid,
    range: CellRange,
    eps_squared: f32,
    min_points: usize,
    rules: &mut Rules,
) {
    let candidates = grid.neighbor_points(range.cell);
    let mut area = Vec::new();

    for point in range.start..range.start + range.count {
        area.clear();
        let mut cluster_id = NOISE;
        // Fewer candidates than min_points can never make a core point;
        // skip the exact distance checks entirely.
        if candidates.len() >= min_points {
            cluster_id = region_query(store, point, &candidates, eps_squared, &mut area);
        }

        if area.len() >= min_points {
            store.lower_label(point, cluster_id, true);

            for &other in &area {
                let raw = store.label_raw(other);
                if raw < 0 {
                    // Another core point with a different id: the clusters
                    // are one and the same, remember to collapse them.
                    let other_id = -raw;
                    if other_id != cluster_id {
                        let (smaller, bigger) = if other_id < cluster_id {
                            (other_id, cluster_id)
                        } else {
                            (cluster_id, other_id)
                        };
                        rules.update(bigger, smaller);
                    }
                }
                store.lower_label(other, cluster_id, false);
            }
        } else if store.label_raw(point) == NOT_VISITED {
            store.lower_label(point, NOISE, false);
        }
    }
}

/// Exact epsilon-ball scan over the candidate list.
///
/// Fills `area` with every candidate within epsilon of `point` (the point
/// itself included) and returns the tentative cluster id: the point's
/// 1-based position in the caller's ordering, lowered to the smallest id of
/// any already-core neighbor encountered.
fn region_query(
    store: &PointStore,
    point: usize,
    candidates: &[usize],
    eps_squared: f32,
    area: &mut Vec<usize>,
) -> i64 {
    let dimensions = store.dimensions();
    let center = store.coord(point);
    let mut cluster_id = store.original(point) as i64 + 1;

    for &other in candidates {
        let other_coord = store.coord(other);
        let mut dist = 0.0f32;
        for d in 0..dimensions {
            let delta = other_coord[d] - center[d];
            dist += delta * delta;
        }
        if dist <= eps_squared {
            area.push(other);
            let raw = store.label_raw(other);
            if raw < 0 {
                cluster_id = cluster_id.min(-raw);
            }
        }
    }

    cluster_id
}

/// Rewrite every label to its canonical cluster id by following the rule
/// table to its root, preserving the core sign.
///
/// Independent per point: the table is immutable by now, so the rewrite
/// needs no synchronization.
pub(crate) fn apply_rules(store: &PointStore, rules: &Rules) {
    let resolve = |point: usize| {
        let raw = store.label_raw(point);
        let core = raw < 0;
        let mut cluster = raw.abs();
        while let Some(target) = rules.rule(cluster) {
            cluster = target;
        }
        store.override_label(point, cluster, core);
    };

    #[cfg(feature = "parallel")]
    (0..store.len()).into_par_iter().for_each(resolve);
    #[cfg(not(feature = "parallel"))]
    (0..store.len()).for_each(resolve);
}
