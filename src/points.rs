//! Arena of owned per-point buffers: coordinates, grid cell, cluster label
//! and the point's position in the caller's input.
//!
//! The store is rebuilt for every scan. Points are physically permuted twice:
//! into cell order before the density pass (so each grid cell owns a
//! contiguous range) and back to input order before labels are handed to the
//! caller. The caller's ordering survives both moves in `original`.
//!
//! Labels live in atomic slots because the density pass lowers them from many
//! workers at once. A label is a join on a small lattice: the magnitude only
//! ever decreases, and the core flag (the sign bit) only ever turns on.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::grid::CellIndex;

/// Sentinel for a point that no worker has classified yet. Larger than any
/// valid label so the lower-only update can always replace it.
pub(crate) const NOT_VISITED: i64 = i64::MAX;

/// Internal noise sentinel. Kept above every valid label so a core neighbor
/// can still claim a provisionally-noise point as border; packed to 0 at the
/// interface boundary.
pub(crate) const NOISE: i64 = i64::MAX - 1;

/// Radix-sort base for order restoration.
const RADIX: usize = 10;

pub(crate) struct PointStore {
    dimensions: usize,
    coords: Vec<f32>,
    cells: Vec<u64>,
    labels: Vec<AtomicI64>,
    /// Position of each point in the caller-supplied array.
    original: Vec<usize>,
}

/// Destination pointers for the cell-order scatter.
///
/// The atomic per-cell cursors hand every point a distinct slot inside its
/// cell's range, so concurrent writes through these pointers never alias.
#[derive(Clone, Copy)]
struct ScatterDest {
    coords: *mut f32,
    cells: *mut u64,
    original: *mut usize,
}

unsafe impl Send for ScatterDest {}
unsafe impl Sync for ScatterDest {}

impl PointStore {
    pub(crate) fn new(coords: &[f32], dimensions: usize) -> Self {
        debug_assert!(dimensions > 0);
        debug_assert_eq!(coords.len() % dimensions, 0);
        let n = coords.len() / dimensions;
        // Labels carry 1-based point positions, so the count must stay signed.
        let _ = i64::try_from(n).expect("point count must fit in i64");

        PointStore {
            dimensions,
            coords: coords.to_vec(),
            cells: vec![0; n],
            labels: (0..n).map(|_| AtomicI64::new(NOT_VISITED)).collect(),
            original: (0..n).collect(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub(crate) fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[inline]
    pub(crate) fn coord(&self, index: usize) -> &[f32] {
        &self.coords[index * self.dimensions..(index + 1) * self.dimensions]
    }

    #[inline]
    pub(crate) fn coords(&self) -> &[f32] {
        &self.coords
    }

    #[inline]
    pub(crate) fn cell(&self, index: usize) -> u64 {
        self.cells[index]
    }

    #[inline]
    pub(crate) fn original(&self, index: usize) -> usize {
        self.original[index]
    }

    /// Split borrow for cell assignment: coordinates read-only, cells written.
    pub(crate) fn coords_and_cells_mut(&mut self) -> (&[f32], &mut [u64]) {
        (&self.coords, &mut self.cells)
    }

    /// Raw signed label: negative magnitude for core points, positive for
    /// border/noise, `NOT_VISITED` before classification.
    #[inline]
    pub(crate) fn label_raw(&self, index: usize) -> i64 {
        self.labels[index].load(Ordering::SeqCst)
    }

    /// Lower-only label update.
    ///
    /// The magnitude moves down to `cluster` if that is smaller than what is
    /// stored; the core sign turns on when `core` is set and is never turned
    /// off. Sequentially consistent so that of two core points discovering
    /// each other concurrently, at least one observes the other's core mark
    /// and records the merge rule.
    pub(crate) fn lower_label(&self, index: usize, cluster: i64, core: bool) {
        debug_assert!(cluster > 0);
        let slot = &self.labels[index];
        let mut current = slot.load(Ordering::SeqCst);
        loop {
            let magnitude = cluster.min(current.abs());
            let next = if core || current < 0 {
                -magnitude
            } else {
                magnitude
            };
            if next == current {
                return;
            }
            match slot.compare_exchange_weak(current, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Unconditional label rewrite, used once per point by rule resolution
    /// after the density pass has finished.
    #[inline]
    pub(crate) fn override_label(&self, index: usize, cluster: i64, core: bool) {
        let value = if core { -cluster } else { cluster };
        self.labels[index].store(value, Ordering::Relaxed);
    }

    /// Permute points into cell order: afterwards every cell of `index` owns
    /// its points in one contiguous range.
    ///
    /// Off-place scatter driven by per-cell atomic cursors seeded at each
    /// cell's offset. Labels are not moved; all of them still hold
    /// `NOT_VISITED` at this stage.
    pub(crate) fn sort_by_cell(&mut self, index: &CellIndex) {
        let n = self.len();
        let dims = self.dimensions;
        let mut coord_buf = vec![0.0f32; n * dims];
        let mut cell_buf = vec![0u64; n];
        let mut order_buf = vec![0usize; n];
        let cursors: Vec<AtomicUsize> = (0..index.num_slots()).map(|_| AtomicUsize::new(0)).collect();

        let dest = ScatterDest {
            coords: coord_buf.as_mut_ptr(),
            cells: cell_buf.as_mut_ptr(),
            original: order_buf.as_mut_ptr(),
        };
        let scatter = |i: usize| {
            let dest = dest;
            let cell = self.cells[i];
            let slot = index.slot(cell);
            let range = index.range_at(slot);
            let offset = cursors[slot].fetch_add(1, Ordering::Relaxed);
            debug_assert!(offset < range.count, "cell range overflow during scatter");
            let pos = range.start + offset;
            // SAFETY: `pos` is unique per point (each fetch_add returns a
            // distinct offset and cell ranges partition 0..n), so no two
            // writes touch the same slot; the buffers were sized to n.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.coords.as_ptr().add(i * dims),
                    dest.coords.add(pos * dims),
                    dims,
                );
                *dest.cells.add(pos) = cell;
                *dest.original.add(pos) = self.original[i];
            }
        };

        #[cfg(feature = "parallel")]
        (0..n).into_par_iter().for_each(scatter);
        #[cfg(not(feature = "parallel"))]
        (0..n).for_each(scatter);

        self.coords = coord_buf;
        self.cells = cell_buf;
        self.original = order_buf;
    }

    /// Restore the caller's input order via an LSD radix sort keyed on
    /// `original`, base 10, `ceil(log10(n))` digit passes.
    ///
    /// Every pass histograms, prefix-sums and stably scatters coordinates,
    /// labels and order keys; the digit histograms for all passes are taken
    /// in a single parallel sweep up front.
    pub(crate) fn restore_order(&mut self) {
        let n = self.len();
        if n <= 1 {
            return;
        }
        let digits = (n as f64).log10().ceil() as usize;

        let buckets: Vec<[AtomicUsize; RADIX]> = (0..digits)
            .map(|_| std::array::from_fn(|_| AtomicUsize::new(0)))
            .collect();
        let histogram = |i: usize| {
            let key = self.original[i];
            let mut base = 1usize;
            for row in &buckets {
                row[key / base % RADIX].fetch_add(1, Ordering::Relaxed);
                base *= RADIX;
            }
        };

        #[cfg(feature = "parallel")]
        (0..n).into_par_iter().for_each(histogram);
        #[cfg(not(feature = "parallel"))]
        (0..n).for_each(histogram);

        // Exclusive-to-inclusive bucket boundaries per pass.
        let mut bounds: Vec<[usize; RADIX]> = buckets
            .iter()
            .map(|row| {
                let mut acc = [0usize; RADIX];
                let mut sum = 0;
                for (digit, count) in row.iter().enumerate() {
                    sum += count.load(Ordering::Relaxed);
                    acc[digit] = sum;
                }
                acc
            })
            .collect();

        let dims = self.dimensions;
        let mut coord_buf = vec![0.0f32; n * dims];
        let mut label_buf = vec![0i64; n];
        let mut order_buf = vec![0usize; n];

        let mut base = 1usize;
        for bound in bounds.iter_mut() {
            // Descending scan keeps equal digits in their prior order, which
            // is what makes the LSD passes compose into a full sort.
            for i in (0..n).rev() {
                let digit = self.original[i] / base % RADIX;
                bound[digit] -= 1;
                let pos = bound[digit];
                coord_buf[pos * dims..(pos + 1) * dims]
                    .copy_from_slice(&self.coords[i * dims..(i + 1) * dims]);
                label_buf[pos] = self.labels[i].load(Ordering::Relaxed);
                order_buf[pos] = self.original[i];
            }
            self.coords.copy_from_slice(&coord_buf);
            self.original.copy_from_slice(&order_buf);
            for (slot, value) in label_buf.iter().enumerate() {
                *self.labels[slot].get_mut() = *value;
            }
            base *= RADIX;
        }

        debug_assert!(
            self.original.iter().enumerate().all(|(i, &key)| i == key),
            "radix passes must restore the identity permutation"
        );
    }

    /// Pack labels into the caller's buffer: internal sentinels become 0,
    /// everything else keeps its magnitude and core sign.
    pub(crate) fn write_into(&self, out: &mut [i64]) {
        debug_assert_eq!(out.len(), self.len());
        for (slot, label) in out.iter_mut().zip(&self.labels) {
            let raw = label.load(Ordering::Relaxed);
            *slot = if raw.abs() >= NOISE { 0 } else { raw };
        }
    }
}
