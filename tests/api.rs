//! Public API integration tests for hpdbscan.
//!
//! The randomized cases are cross-checked against a brute-force O(N^2)
//! reference DBSCAN; the deterministic-partition cases use `min_points = 2`,
//! where no border points exist (any point within epsilon of a core point is
//! itself core), so label buffers must match exactly across permutations,
//! thread counts and repeated runs.

use std::collections::{BTreeSet, HashMap, HashSet};

use hpdbscan::{cluster_sizes, scan, scan_with, ScanConfig, ScanError, ScanSummary};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_points(n: usize, dims: usize, seed: u64, span: f32) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n * dims).map(|_| rng.gen_range(0.0..span)).collect()
}

fn run_scan(coords: &[f32], dims: usize, epsilon: f32, min_points: usize) -> Vec<i64> {
    let mut labels = vec![0i64; coords.len() / dims];
    scan(coords, dims, epsilon, min_points, &mut labels).expect("scan should succeed");
    labels
}

/// Brute-force reference: core flags plus a connected-component id per core
/// point (usize::MAX for non-core points).
fn brute_reference(coords: &[f32], dims: usize, epsilon: f32, min_points: usize) -> (Vec<bool>, Vec<usize>) {
    let n = coords.len() / dims;
    let eps2 = epsilon * epsilon;
    let dist2 = |a: usize, b: usize| -> f32 {
        (0..dims)
            .map(|d| {
                let delta = coords[a * dims + d] - coords[b * dims + d];
                delta * delta
            })
            .sum()
    };

    let balls: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..n).filter(|&j| dist2(i, j) <= eps2).collect())
        .collect();
    let core: Vec<bool> = balls.iter().map(|ball| ball.len() >= min_points).collect();

    let mut component = vec![usize::MAX; n];
    let mut next = 0;
    for start in 0..n {
        if !core[start] || component[start] != usize::MAX {
            continue;
        }
        component[start] = next;
        let mut stack = vec![start];
        while let Some(p) = stack.pop() {
            for &q in &balls[p] {
                if core[q] && component[q] == usize::MAX {
                    component[q] = next;
                    stack.push(q);
                }
            }
        }
        next += 1;
    }

    (core, component)
}

fn check_against_reference(coords: &[f32], dims: usize, epsilon: f32, min_points: usize, labels: &[i64]) {
    let n = labels.len();
    let eps2 = epsilon * epsilon;
    let (core, component) = brute_reference(coords, dims, epsilon, min_points);
    let dist2 = |a: usize, b: usize| -> f32 {
        (0..dims)
            .map(|d| {
                let delta = coords[a * dims + d] - coords[b * dims + d];
                delta * delta
            })
            .sum()
    };

    // Core points carry the negative sign, and exactly they do.
    for i in 0..n {
        assert_eq!(labels[i] < 0, core[i], "core flag mismatch at point {i}");
    }

    // Core points of one component share a label; different components never do.
    let mut label_of_component: HashMap<usize, i64> = HashMap::new();
    let mut component_of_label: HashMap<i64, usize> = HashMap::new();
    for i in 0..n {
        if !core[i] {
            continue;
        }
        let id = labels[i].abs();
        if let Some(&expected) = label_of_component.get(&component[i]) {
            assert_eq!(id, expected, "split cluster at point {i}");
        } else {
            label_of_component.insert(component[i], id);
        }
        if let Some(&owner) = component_of_label.get(&id) {
            assert_eq!(owner, component[i], "merged clusters share label {id}");
        } else {
            component_of_label.insert(id, component[i]);
        }
    }

    // Non-core points: noise without an adjacent core, otherwise a border
    // attached to one of its adjacent cores' clusters.
    for i in 0..n {
        if core[i] {
            continue;
        }
        let adjacent: Vec<usize> = (0..n)
            .filter(|&j| core[j] && dist2(i, j) <= eps2)
            .collect();
        if adjacent.is_empty() {
            assert_eq!(labels[i], 0, "expected noise at point {i}");
        } else {
            assert!(labels[i] > 0, "border point {i} must be positive");
            assert!(
                adjacent.iter().any(|&j| labels[j].abs() == labels[i]),
                "border point {i} not attached to any adjacent core cluster"
            );
        }
    }
}

#[test]
fn matches_bruteforce_reference() {
    for &(seed, n, dims, epsilon, min_points) in &[
        (1u64, 120usize, 2usize, 1.0f32, 3usize),
        (2, 200, 2, 0.8, 4),
        (3, 150, 3, 1.2, 3),
        (4, 80, 2, 2.0, 2),
        (5, 60, 1, 0.6, 2),
    ] {
        let coords = random_points(n, dims, seed, 10.0);
        let labels = run_scan(&coords, dims, epsilon, min_points);
        check_against_reference(&coords, dims, epsilon, min_points, &labels);
    }
}

#[test]
fn two_blobs_and_an_outlier() {
    let coords = [
        0.0f32, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, // blob A
        10.0, 10.0, 10.0, 11.0, 11.0, 10.0, 11.0, 11.0, // blob B
        50.0, 50.0, // outlier
    ];
    let labels = run_scan(&coords, 2, 2.0, 3);

    assert!(labels[..4].iter().all(|&l| l == labels[0] && l < 0));
    assert!(labels[4..8].iter().all(|&l| l == labels[4] && l < 0));
    assert_ne!(labels[0].abs(), labels[4].abs());
    assert_eq!(labels[8], 0);
}

#[test]
fn single_point_is_its_own_cluster() {
    let labels = run_scan(&[7.0f32, -3.0], 2, 123.0, 1);
    // Core, and the id is its own 1-based input position.
    assert_eq!(labels, vec![-1]);
}

#[test]
fn coincident_points_form_one_core_cluster() {
    let coords = [5.0f32, 5.0].repeat(10);
    let labels = run_scan(&coords, 2, 0.001, 5);
    assert!(labels.iter().all(|&l| l == -1), "labels: {labels:?}");
}

#[test]
fn epsilon_chain_merges_into_one_cluster() {
    // Each link is exactly epsilon long; only rule chaining connects the ends.
    let coords: Vec<f32> = (0..7).flat_map(|i| [i as f32, 0.0]).collect();
    let labels = run_scan(&coords, 2, 1.0, 2);
    assert!(labels.iter().all(|&l| l == -1), "labels: {labels:?}");
}

#[test]
fn noise_boundary_and_core_border_distinction() {
    // Three core points, one border reachable from the last core only, one
    // point too far from everything.
    let coords = [0.0f32, 0.0, 0.5, 0.0, 1.0, 0.0, 1.8, 0.0, 5.0, 0.0];
    let labels = run_scan(&coords, 2, 1.01, 3);

    assert!(labels[..3].iter().all(|&l| l < 0));
    assert!(labels[3] > 0, "border must be positive: {labels:?}");
    assert_eq!(labels[3], labels[2].abs(), "border joins the adjoining cluster");
    assert_eq!(labels[4], 0);
}

fn partition(labels: &[i64], to_original: impl Fn(usize) -> usize) -> HashSet<BTreeSet<usize>> {
    let mut groups: HashMap<i64, BTreeSet<usize>> = HashMap::new();
    for (pos, &label) in labels.iter().enumerate() {
        if label != 0 {
            groups.entry(label.abs()).or_default().insert(to_original(pos));
        }
    }
    groups.into_values().collect()
}

#[test]
fn partition_invariant_under_permutation() {
    let coords = random_points(150, 2, 99, 8.0);
    let labels = run_scan(&coords, 2, 0.7, 2);

    let mut order: Vec<usize> = (0..150).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(77);
    order.shuffle(&mut rng);
    let permuted: Vec<f32> = order
        .iter()
        .flat_map(|&i| [coords[i * 2], coords[i * 2 + 1]])
        .collect();
    let permuted_labels = run_scan(&permuted, 2, 0.7, 2);

    assert_eq!(
        partition(&labels, |pos| pos),
        partition(&permuted_labels, |pos| order[pos]),
    );
    // Noise must also be preserved point-for-point.
    for (pos, &original) in order.iter().enumerate() {
        assert_eq!(labels[original] == 0, permuted_labels[pos] == 0);
    }
}

#[cfg(feature = "parallel")]
#[test]
fn identical_result_for_any_thread_count() {
    let coords = random_points(300, 2, 11, 10.0);
    let base = run_scan(&coords, 2, 0.9, 2);

    for threads in [1, 2, 8] {
        let mut labels = vec![0i64; 300];
        scan_with(
            &coords,
            2,
            0.9,
            2,
            &mut labels,
            ScanConfig {
                threads: Some(threads),
            },
        )
        .expect("scan should succeed");
        assert_eq!(labels, base, "thread count {threads} changed the labels");
    }
}

#[test]
fn rescan_is_idempotent() {
    let coords = random_points(200, 2, 5, 9.0);
    let first = run_scan(&coords, 2, 0.8, 2);
    let second = run_scan(&coords, 2, 0.8, 2);
    assert_eq!(first, second);
}

#[test]
fn labels_follow_input_order() {
    // Reverse the input: classifications must travel with their points.
    let n = 120;
    let coords = random_points(n, 2, 21, 9.0);
    let labels = run_scan(&coords, 2, 0.8, 2);

    let reversed: Vec<f32> = coords
        .chunks(2)
        .rev()
        .flat_map(|row| row.to_vec())
        .collect();
    let reversed_labels = run_scan(&reversed, 2, 0.8, 2);

    for i in 0..n {
        let j = n - 1 - i;
        assert_eq!(labels[i] == 0, reversed_labels[j] == 0);
        assert_eq!(labels[i] < 0, reversed_labels[j] < 0);
    }
    for i in 0..n {
        for k in i + 1..n {
            let same = labels[i] != 0 && labels[i].abs() == labels[k].abs();
            let same_reversed = reversed_labels[n - 1 - i] != 0
                && reversed_labels[n - 1 - i].abs() == reversed_labels[n - 1 - k].abs();
            assert_eq!(same, same_reversed, "pair ({i}, {k})");
        }
    }
}

#[test]
fn empty_input_is_a_noop() {
    let mut labels: Vec<i64> = Vec::new();
    scan(&[], 3, 1.0, 4, &mut labels).expect("empty input is not an error");
    assert!(labels.is_empty());
}

#[test]
fn rejects_invalid_parameters() {
    let coords = [0.0f32, 0.0];
    let mut labels = [0i64];

    assert!(matches!(
        scan(&coords, 2, 0.0, 3, &mut labels),
        Err(ScanError::InvalidEpsilon(_))
    ));
    assert!(matches!(
        scan(&coords, 2, -1.0, 3, &mut labels),
        Err(ScanError::InvalidEpsilon(_))
    ));
    assert!(matches!(
        scan(&coords, 2, f32::NAN, 3, &mut labels),
        Err(ScanError::InvalidEpsilon(_))
    ));
    assert!(matches!(
        scan(&coords, 2, 1.0, 0, &mut labels),
        Err(ScanError::InvalidMinPoints(0))
    ));
    assert!(matches!(
        scan(&coords, 0, 1.0, 3, &mut labels),
        Err(ScanError::InvalidDimensions)
    ));
    assert!(matches!(
        scan(&coords[..1], 2, 1.0, 3, &mut labels),
        Err(ScanError::CoordinateLength { .. })
    ));
    let mut short: [i64; 0] = [];
    assert!(matches!(
        scan(&coords, 2, 1.0, 3, &mut short),
        Err(ScanError::LabelLength {
            expected: 1,
            len: 0
        })
    ));
}

#[test]
fn sizes_and_summary_helpers() {
    let coords = [
        0.0f32, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, // one blob
        50.0, 50.0, // noise
    ];
    let labels = run_scan(&coords, 2, 2.0, 3);

    let sizes = cluster_sizes(&labels);
    assert_eq!(sizes[&0], 1);
    assert_eq!(sizes[&labels[0].abs()], 4);

    let summary = ScanSummary::from_labels(&labels);
    assert_eq!(
        summary,
        ScanSummary {
            clusters: 1,
            noise: 1,
            core_points: 4,
        }
    );
}
