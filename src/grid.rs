use nalgebra::Vector3;
use tracing::info_span;

use crate::error::{Error, Result};
use crate::simbox::SimBox;

/// Cell list over a periodic box.
///
/// The box is partitioned into a regular grid with at most `floor(width /
/// cutoff)` cells per axis. An axis that cannot fit at least 3 cells collapses
/// to a single cell, and neighbor enumeration along it degenerates to a
/// full-axis scan; with 3 or more cells the cell width is at least the cutoff,
/// so the 3-wide neighbor block around any cell covers every candidate within
/// the cutoff.
///
/// Particle indices are stored in CSR form: `cell_starts[c]..cell_starts[c+1]`
/// bounds cell `c`'s slice of `particles`. The index is rebuilt from scratch
/// for every frame; there is no incremental update.
pub struct PeriodicGrid {
    dims: Vector3<usize>,
    cell_starts: Vec<usize>,
    particles: Vec<usize>,
    simbox: SimBox,
}

impl PeriodicGrid {
    /// Builds the grid and assigns every point to a cell. O(N), deterministic.
    pub fn build(simbox: &SimBox, cutoff: f64, points: &[Vector3<f64>]) -> Result<Self> {
        if !cutoff.is_finite() || cutoff <= 0.0 {
            return Err(Error::InvalidCutoff(cutoff));
        }
        let _span = info_span!("PeriodicGrid::build", n_points = points.len()).entered();

        let widths = simbox.nearest_plane_distance();
        let dims = Vector3::new(
            axis_dim(widths.x, cutoff),
            axis_dim(widths.y, cutoff),
            if simbox.is_2d() {
                1
            } else {
                axis_dim(widths.z, cutoff)
            },
        );
        let total_cells = dims.x * dims.y * dims.z;

        let cells: Vec<usize> = points.iter().map(|p| bin_of(simbox, &dims, p)).collect();

        let mut counts = vec![0usize; total_cells];
        for &c in &cells {
            counts[c] += 1;
        }

        let mut cell_starts = vec![0usize; total_cells + 1];
        let mut accum = 0;
        for c in 0..total_cells {
            cell_starts[c] = accum;
            accum += counts[c];
        }
        cell_starts[total_cells] = accum;

        let mut particles = vec![0usize; points.len()];
        let mut fill = cell_starts.clone();
        for (i, &c) in cells.iter().enumerate() {
            particles[fill[c]] = i;
            fill[c] += 1;
        }

        Ok(Self {
            dims,
            cell_starts,
            particles,
            simbox: simbox.clone(),
        })
    }

    /// Cells per axis.
    pub fn dims(&self) -> Vector3<usize> {
        self.dims
    }

    pub fn num_cells(&self) -> usize {
        self.dims.x * self.dims.y * self.dims.z
    }

    /// Linear index of the cell containing `point` (wrapped into the box).
    pub fn cell_of(&self, point: &Vector3<f64>) -> usize {
        bin_of(&self.simbox, &self.dims, point)
    }

    /// The ordered set of cells to scan for neighbors of `cell`, including
    /// `cell` itself. The size depends only on the grid dimensions, never on
    /// occupancy.
    pub fn neighbors_of(&self, cell: usize) -> Vec<usize> {
        let (cx, cy, cz) = self.coords_of(cell);
        let xs = axis_offsets(self.dims.x);
        let ys = axis_offsets(self.dims.y);
        let zs = axis_offsets(self.dims.z);

        let mut out = Vec::with_capacity(xs.len() * ys.len() * zs.len());
        for &dz in zs {
            let nz = (cz as i64 + dz).rem_euclid(self.dims.z as i64) as usize;
            for &dy in ys {
                let ny = (cy as i64 + dy).rem_euclid(self.dims.y as i64) as usize;
                for &dx in xs {
                    let nx = (cx as i64 + dx).rem_euclid(self.dims.x as i64) as usize;
                    out.push(nx + self.dims.x * (ny + self.dims.y * nz));
                }
            }
        }
        out
    }

    /// Particle indices assigned to `cell`, in insertion order. Each call
    /// returns a fresh iterator over the same finite sequence.
    pub fn particles_in(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        self.particles[self.cell_starts[cell]..self.cell_starts[cell + 1]]
            .iter()
            .copied()
    }

    fn coords_of(&self, cell: usize) -> (usize, usize, usize) {
        let cx = cell % self.dims.x;
        let cy = (cell / self.dims.x) % self.dims.y;
        let cz = cell / (self.dims.x * self.dims.y);
        (cx, cy, cz)
    }
}

fn axis_dim(width: f64, cutoff: f64) -> usize {
    let d = (width / cutoff).floor() as usize;
    if d < 3 { 1 } else { d }
}

/// Neighbor offsets along one axis: the 3-wide block when the axis has at
/// least 3 cells, otherwise the whole (single-cell) axis.
fn axis_offsets(dim: usize) -> &'static [i64] {
    if dim >= 3 { &[-1, 0, 1] } else { &[0] }
}

fn bin_of(simbox: &SimBox, dims: &Vector3<usize>, point: &Vector3<f64>) -> usize {
    let frac = simbox.to_fractional(point);
    let ux = frac.x - frac.x.floor();
    let uy = frac.y - frac.y.floor();
    let uz = frac.z - frac.z.floor();
    let cx = ((ux * dims.x as f64) as usize).min(dims.x - 1);
    let cy = ((uy * dims.y as f64) as usize).min(dims.y - 1);
    let cz = ((uz * dims.z as f64) as usize).min(dims.z - 1);
    cx + dims.x * (cy + dims.y * cz)
}

/// O(N²) pair enumeration under the minimum image, for cross-checks.
pub fn brute_force_pairs(
    simbox: &SimBox,
    points: &[Vector3<f64>],
    cutoff: f64,
) -> Vec<(usize, usize)> {
    let cutoff_sq = cutoff * cutoff;
    let mut pairs = Vec::new();
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let disp = simbox.wrap(&(points[j] - points[i]));
            if disp.norm_squared() < cutoff_sq {
                pairs.push((i, j));
            }
        }
    }
    pairs
}
