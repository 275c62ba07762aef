//! Highly parallel DBSCAN density clustering over a spatial cell grid.
//!
//! Partitions N points in D dimensions into density-connected clusters
//! under a neighborhood radius `epsilon` and a minimum neighbor count
//! `min_points`, avoiding the O(N^2) cost of naive DBSCAN: the bounding
//! box is cut into cells of side length epsilon, so every point measures
//! distances only against candidates from the 3^D surrounding cells.
//!
//! Output labels are signed integers. The magnitude is the cluster id (the
//! 1-based input position of some representative core point, stable for a
//! given input but not sequential), `0` marks noise, and a negative sign
//! marks a core point. Taking absolute values yields plain cluster
//! membership.
//!
//! # Example
//!
//! ```
//! use hpdbscan::scan;
//!
//! // Two tight 2-D blobs and one isolated point.
//! let coords = [
//!     0.0f32, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, // blob A
//!     10.0, 10.0, 10.0, 11.0, 11.0, 10.0, 11.0, 11.0, // blob B
//!     50.0, 50.0, // isolated
//! ];
//! let mut labels = vec![0i64; 9];
//! scan(&coords, 2, 2.0, 3, &mut labels).expect("valid parameters");
//!
//! assert!(labels[..4].iter().all(|&l| l == labels[0] && l < 0));
//! assert!(labels[4..8].iter().all(|&l| l == labels[4] && l < 0));
//! assert_ne!(labels[0], labels[4]);
//! assert_eq!(labels[8], 0);
//! ```

mod cluster;
mod error;
mod grid;
mod points;
mod rules;
mod timing;

use std::collections::HashMap;

use rustc_hash::FxHashSet;

pub use error::ScanError;

/// Configuration for a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Worker count for the parallel phases. `None` runs on all available
    /// hardware threads (the global rayon pool). Ignored when the crate is
    /// built without the `parallel` feature.
    pub threads: Option<usize>,
}

/// Cluster a point set with default settings.
///
/// `coords` is a flat row-major array of `N * dimensions` values. On
/// success `labels[i]` holds the signed cluster label of the i-th input
/// point as described in the crate docs. An empty input is a no-op that
/// leaves `labels` untouched.
///
/// The scan is synchronous and runs to completion; the only errors are
/// input-contract violations, reported before any work starts.
pub fn scan(
    coords: &[f32],
    dimensions: usize,
    epsilon: f32,
    min_points: usize,
    labels: &mut [i64],
) -> Result<(), ScanError> {
    scan_with(
        coords,
        dimensions,
        epsilon,
        min_points,
        labels,
        ScanConfig::default(),
    )
}

/// Cluster a point set with explicit configuration.
pub fn scan_with(
    coords: &[f32],
    dimensions: usize,
    epsilon: f32,
    min_points: usize,
    labels: &mut [i64],
    config: ScanConfig,
) -> Result<(), ScanError> {
    if dimensions == 0 {
        return Err(ScanError::InvalidDimensions);
    }
    if coords.len() % dimensions != 0 {
        return Err(ScanError::CoordinateLength {
            len: coords.len(),
            dimensions,
        });
    }
    if !(epsilon > 0.0) {
        return Err(ScanError::InvalidEpsilon(epsilon));
    }
    if min_points == 0 {
        return Err(ScanError::InvalidMinPoints(min_points));
    }
    let num_points = coords.len() / dimensions;
    if labels.len() != num_points {
        return Err(ScanError::LabelLength {
            expected: num_points,
            len: labels.len(),
        });
    }
    if num_points == 0 {
        return Ok(());
    }

    #[cfg(feature = "parallel")]
    if let Some(threads) = config.threads {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| ScanError::ThreadPool(err.to_string()))?;
        pool.install(|| cluster::run(coords, dimensions, epsilon, min_points, labels));
        return Ok(());
    }
    #[cfg(not(feature = "parallel"))]
    let _ = config;

    cluster::run(coords, dimensions, epsilon, min_points, labels);
    Ok(())
}

/// Number of points per cluster id in a label buffer.
///
/// Keys are absolute cluster ids; noise points are collected under key 0 so
/// the caller decides how to treat them.
pub fn cluster_sizes(labels: &[i64]) -> HashMap<i64, usize> {
    let mut sizes = HashMap::new();
    for &label in labels {
        *sizes.entry(label.abs()).or_insert(0) += 1;
    }
    sizes
}

/// Aggregate counts derived from a label buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Distinct non-noise clusters.
    pub clusters: usize,
    /// Points labeled as noise.
    pub noise: usize,
    /// Core points (negative labels).
    pub core_points: usize,
}

impl ScanSummary {
    pub fn from_labels(labels: &[i64]) -> Self {
        let mut ids = FxHashSet::default();
        let mut summary = ScanSummary::default();
        for &label in labels {
            if label == 0 {
                summary.noise += 1;
                continue;
            }
            if label < 0 {
                summary.core_points += 1;
            }
            ids.insert(label.abs());
        }
        summary.clusters = ids.len();
        summary
    }
}
