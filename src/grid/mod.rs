//! Epsilon-cell spatial grid over the point bounding box.
//!
//! The bounding box of all points is cut into a regular D-dimensional grid
//! with cell side length equal to epsilon, so every epsilon-neighbor of a
//! point lies in its own cell or one of the 3^D - 1 adjacent cells. Cell ids
//! are a mixed-radix encoding of the per-dimension bucket indices; the
//! dimension order is permuted ascending by cell count so the narrowest
//! dimensions are expanded first during neighbor enumeration, keeping the
//! intermediate candidate-cell list short.
//!
//! Only occupied cells are materialized: a sparse, sorted index maps a cell
//! id to the contiguous range of the cell-sorted point arrays it owns.


#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::points::PointStore;

/// Contiguous slice of the cell-sorted point arrays owned by one grid cell.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CellRange {
    pub(crate) cell: u64,
    pub(crate) start: usize,
    pub(crate) count: usize,
}

/// Sorted cell-id -> point-range index, immutable for the scan's duration.
///
/// The final entry is a sentinel for "one past the last real cell" that
/// bounds the range arithmetic.
#[derive(Debug, Default)]
pub(crate) struct CellIndex {
    ranges: Vec<CellRange>,
    lookup: FxHashMap<u64, usize>,
}

impl CellIndex {
    pub(crate) fn from_counts(
        counter: FxHashMap<u64, usize>,
        total_cells: u64,
        num_points: usize,
    ) -> Self {
        let mut cells: Vec<u64> = counter.keys().copied().collect();
        cells.sort_unstable();

        let mut ranges = Vec::with_capacity(cells.len() + 1);
        let mut lookup =
            FxHashMap::with_capacity_and_hasher(cells.len() + 1, Default::default());
        let mut start = 0usize;
        for cell in cells {
            let count = counter[&cell];
            lookup.insert(cell, ranges.len());
            ranges.push(CellRange { cell, start, count });
            start += count;
        }
        debug_assert_eq!(start, num_points, "cell counts must cover every point");

        lookup.insert(total_cells, ranges.len());
        ranges.push(CellRange {
            cell: total_cells,
            start: num_points,
            count: 0,
        });

        CellIndex { ranges, lookup }
    }

    #[inline]
    pub(crate) fn get(&self, cell: u64) -> Option<CellRange> {
        self.lookup.get(&cell).map(|&slot| self.ranges[slot])
    }

    /// Slot of an occupied cell. Panics on an unknown id; callers only pass
    /// ids previously assigned to a point.
    #[inline]
    pub(crate) fn slot(&self, cell: u64) -> usize {
        self.lookup[&cell]
    }

    #[inline]
    pub(crate) fn range_at(&self, slot: usize) -> CellRange {
        self.ranges[slot]
    }

    #[inline]
    pub(crate) fn num_slots(&self) -> usize {
        self.ranges.len()
    }

    /// Occupied cells in ascending id order, without the trailing sentinel.
    #[inline]
    pub(crate) fn occupied(&self) -> &[CellRange] {
        &self.ranges[..self.ranges.len() - 1]
    }
}

pub(crate) struct SpatialGrid {
    dimensions: usize,
    epsilon: f32,
    minimum: Vec<f32>,
    /// Cell count along each input dimension.
    cells_per_dim: Vec<u64>,
    /// Dimension processing order, ascending by cell count. Shared between
    /// cell-id encoding and neighbor enumeration; the two must agree on the
    /// stride of every dimension.
    dim_order: Vec<usize>,
    total_cells: u64,
    index: CellIndex,
}

impl SpatialGrid {
    /// Decompose the point set into epsilon cells and permute the store into
    /// cell order.
    pub(crate) fn build(store: &mut PointStore, epsilon: f32) -> Self {
        let dimensions = store.dimensions();
        let (minimum, maximum) = bounds(store);

        let mut total_cells = 1u64;
        let mut cells_per_dim = Vec::with_capacity(dimensions);
        for d in 0..dimensions {
            let count = ((maximum[d] - minimum[d]) / epsilon).ceil() as u64 + 1;
            total_cells = total_cells
                .checked_mul(count)
                .expect("cell id space exceeds u64");
            cells_per_dim.push(count);
        }

        let mut dim_order: Vec<usize> = (0..dimensions).collect();
        dim_order.sort_by_key(|&d| cells_per_dim[d]);

        let mut grid = SpatialGrid {
            dimensions,
            epsilon,
            minimum,
            cells_per_dim,
            dim_order,
            total_cells,
            index: CellIndex::default(),
        };
        let counter = grid.assign_cells(store);
        grid.index = CellIndex::from_counts(counter, grid.total_cells, store.len());
        store.sort_by_cell(&grid.index);
        grid
    }

    #[inline]
    pub(crate) fn index(&self) -> &CellIndex {
        &self.index
    }

    /// Flattened cell id for a point, mixed-radix over the reordered
    /// dimensions.
    pub(crate) fn cell_of(&self, point: &[f32]) -> u64 {
        let mut cell = 0u64;
        let mut stride = 1u64;
        for &d in &self.dim_order {
            let bucket = ((point[d] - self.minimum[d]) / self.epsilon).floor() as u64;
            cell += bucket * stride;
            stride *= self.cells_per_dim[d];
        }
        cell
    }

    /// Assign every point its cell id and count points per occupied cell.
    fn assign_cells(&self, store: &mut PointStore) -> FxHashMap<u64, usize> {
        let dimensions = self.dimensions;
        let (coords, cells) = store.coords_and_cells_mut();

        #[cfg(feature = "parallel")]
        {
            cells
                .par_iter_mut()
                .enumerate()
                .fold(FxHashMap::default, |mut counter, (i, cell)| {
                    let id = self.cell_of(&coords[i * dimensions..(i + 1) * dimensions]);
                    *cell = id;
                    *counter.entry(id).or_insert(0usize) += 1;
                    counter
                })
                .reduce(FxHashMap::default, |mut counter, other| {
                    for (cell, count) in other {
                        *counter.entry(cell).or_insert(0) += count;
                    }
                    counter
                })
        }
        #[cfg(not(feature = "parallel"))]
        {
            let mut counter = FxHashMap::default();
            for (i, cell) in cells.iter_mut().enumerate() {
                let id = self.cell_of(&coords[i * dimensions..(i + 1) * dimensions]);
                *cell = id;
                *counter.entry(id).or_insert(0usize) += 1;
            }
            counter
        }
    }

    /// Candidate neighbor points for a cell: every point in the cell itself
    /// and in each cell reachable by a +-1 step along any dimension (the 3^D
    /// box), flattened into one index list.
    ///
    /// The result is a superset of any epsilon ball centered in the cell;
    /// exact membership is decided later by the squared-distance check.
    /// Empty neighbor cells are absent from the index and contribute nothing.
    pub(crate) fn neighbor_points(&self, cell: u64) -> Vec<usize> {
        let mut cells = vec![cell];
        let mut lower: u64 = 1;
        let mut current: u64 = 1;
        for &d in &self.dim_order {
            current *= self.cells_per_dim[d];
            // Expand only the cells present before this dimension's pass.
            let end = cells.len();
            for i in 0..end {
                let id = cells[i];
                // Boundary checks: no wrapping across the grid faces.
                if id % current >= lower {
                    cells.push(id - lower);
                }
                if id % current < current - lower {
                    cells.push(id + lower);
                }
            }
            lower = current;
        }

        let mut points = Vec::new();
        for id in cells {
            if let Some(range) = self.index.get(id) {
                points.extend(range.start..range.start + range.count);
            }
        }
        points
    }
}

/// Per-dimension coordinate minima and maxima across all points.
///
/// Parallel reduction: each worker folds a running min/max vector over its
/// share of the points, partial vectors combine element-wise.
fn bounds(store: &PointStore) -> (Vec<f32>, Vec<f32>) {
    let dimensions = store.dimensions();
    let fold = |(mut lo, mut hi): (Vec<f32>, Vec<f32>), point: &[f32]| {
        for d in 0..dimensions {
            lo[d] = lo[d].min(point[d]);
            hi[d] = hi[d].max(point[d]);
        }
        (lo, hi)
    };

    #[cfg(feature = "parallel")]
    {
        let init = || {
            (
                vec![f32::INFINITY; dimensions],
                vec![f32::NEG_INFINITY; dimensions],
            )
        };
        store
            .coords()
            .par_chunks(dimensions)
            .fold(init, fold)
            .reduce(init, |(mut lo, mut hi), (other_lo, other_hi)| {
                for d in 0..dimensions {
                    lo[d] = lo[d].min(other_lo[d]);
                    hi[d] = hi[d].max(other_hi[d]);
                }
                (lo, hi)
            })
    }
    #[cfg(not(feature = "parallel"))]
    {
        store.coords().chunks(dimensions).fold(
            (
                vec![f32::INFINITY; dimensions],
                vec![f32::NEG_INFINITY; dimensions],
            ),
            fold,
        )
    }
}
