use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::Vector3;
use rayon::prelude::*;
use tracing::{info_span, warn};

use crate::config;
use crate::error::{Error, Result};
use crate::grid::PeriodicGrid;
use crate::simbox::SimBox;

/// Sentinel candidate index marking an unfilled neighbor rank.
pub const NO_NEIGHBOR: usize = usize::MAX;

const PADDING_RSQ: f64 = -1.0;
// Largest usable fraction of the nearest-plane distance once the growth loop
// overshoots what the box can support.
const CLAMP_FRACTION: f64 = 0.4999;

/// Terminal state of an adaptive search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchStatus {
    /// Every reference point received its target neighbor count (or the
    /// strict cutoff accepted fewer).
    Converged,
    /// The growth loop hit the box-imposed radius limit; results are
    /// best-effort and may retain sentinel ranks.
    ClampedByBoxSize,
}

/// Neighbor table for one `NearestNeighbors::compute` call.
///
/// Flat row-major storage: rank `r` of reference point `i` lives at
/// `i * num_neighbors + r`. Unfilled ranks carry `NO_NEIGHBOR`, a squared
/// distance of -1 and a displacement of (-1, -1, -1).
#[derive(Clone, Debug)]
pub struct NeighborList {
    num_reference: usize,
    num_neighbors: usize,
    rsq: Vec<f64>,
    indices: Vec<usize>,
    displacements: Vec<Vector3<f64>>,
    status: SearchStatus,
}

impl NeighborList {
    fn padded(num_reference: usize, num_neighbors: usize) -> Self {
        let n = num_reference * num_neighbors;
        Self {
            num_reference,
            num_neighbors,
            rsq: vec![PADDING_RSQ; n],
            indices: vec![NO_NEIGHBOR; n],
            displacements: vec![Vector3::new(-1.0, -1.0, -1.0); n],
            status: SearchStatus::Converged,
        }
    }

    pub fn num_reference(&self) -> usize {
        self.num_reference
    }

    pub fn num_neighbors(&self) -> usize {
        self.num_neighbors
    }

    pub fn status(&self) -> SearchStatus {
        self.status
    }

    pub fn rsq(&self) -> &[f64] {
        &self.rsq
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn displacements(&self) -> &[Vector3<f64>] {
        &self.displacements
    }

    /// Squared distances for reference point `i`, ascending over filled ranks.
    pub fn rsq_of(&self, i: usize) -> &[f64] {
        &self.rsq[i * self.num_neighbors..(i + 1) * self.num_neighbors]
    }

    /// Candidate indices for reference point `i`.
    pub fn indices_of(&self, i: usize) -> &[usize] {
        &self.indices[i * self.num_neighbors..(i + 1) * self.num_neighbors]
    }

    /// Wrapped displacement vectors for reference point `i`.
    pub fn displacements_of(&self, i: usize) -> &[Vector3<f64>] {
        &self.displacements[i * self.num_neighbors..(i + 1) * self.num_neighbors]
    }
}

/// Adaptive k-nearest-neighbor search over a periodic box.
///
/// Starts at the configured cutoff and grows it by `scale` until every
/// reference point has `num_neighbors` candidates, clamping at the largest
/// radius the box supports. With `strict_cut` the cutoff is taken as-is and
/// reference points keep however many candidates fall inside it.
///
/// A reference point never pairs with the candidate sharing its index, so a
/// point cloud can be queried against itself without self-matches.
pub struct NearestNeighbors {
    r_max: f64,
    num_neighbors: usize,
    scale: f64,
    strict_cut: bool,
}

impl NearestNeighbors {
    pub fn new(r_max: f64, num_neighbors: usize, scale: f64, strict_cut: bool) -> Result<Self> {
        if !r_max.is_finite() || r_max <= 0.0 {
            return Err(Error::InvalidCutoff(r_max));
        }
        if num_neighbors == 0 {
            return Err(Error::ZeroNeighborCount);
        }
        if !scale.is_finite() || scale <= 1.0 {
            return Err(Error::InvalidScale(scale));
        }
        Ok(Self {
            r_max,
            num_neighbors,
            scale,
            strict_cut,
        })
    }

    pub fn set_strict_cut(&mut self, strict_cut: bool) {
        self.strict_cut = strict_cut;
    }

    pub fn r_max(&self) -> f64 {
        self.r_max
    }

    pub fn num_neighbors(&self) -> usize {
        self.num_neighbors
    }

    /// Finds the `num_neighbors` nearest candidates for every reference
    /// point. The search state (including the grown cutoff) is local to the
    /// call; the result fully replaces any prior one.
    pub fn compute(
        &self,
        simbox: &SimBox,
        ref_points: &[Vector3<f64>],
        points: &[Vector3<f64>],
    ) -> Result<NeighborList> {
        let _span = info_span!(
            "NearestNeighbors::compute",
            num_ref = ref_points.len(),
            num_points = points.len()
        )
        .entered();

        let k = self.num_neighbors;
        let num_ref = ref_points.len();
        let mut list = NeighborList::padded(num_ref, k);
        let mut cutoff = self.r_max;
        let mut force_last = false;

        loop {
            let grid = PeriodicGrid::build(simbox, cutoff, points)?;
            let deficits = AtomicUsize::new(0);
            // Strict and forced-final passes commit whatever they find;
            // ordinary passes only commit when no reference point ran short.
            let committing = self.strict_cut || force_last;
            let cutoff_sq = cutoff * cutoff;

            let search_one = |i: usize| -> Option<Vec<(f64, usize, Vector3<f64>)>> {
                // Once a deficit is seen, the pass will be retried at a
                // larger radius; remaining reference points stop early.
                if !committing && deficits.load(Ordering::Relaxed) > 0 {
                    return None;
                }
                let mut found = Vec::new();
                for cell in grid.neighbors_of(grid.cell_of(&ref_points[i])) {
                    for j in grid.particles_in(cell) {
                        if j == i {
                            continue;
                        }
                        let rij = simbox.wrap(&(points[j] - ref_points[i]));
                        let rsq = rij.norm_squared();
                        if rsq < cutoff_sq {
                            found.push((rsq, j, rij));
                        }
                    }
                }
                if !committing && found.len() < k {
                    deficits.fetch_add(k - found.len(), Ordering::Relaxed);
                    return None;
                }
                found.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                found.truncate(k);
                Some(found)
            };

            let rows: Vec<Option<Vec<(f64, usize, Vector3<f64>)>>> =
                if num_ref >= config::get_parallel_threshold() {
                    (0..num_ref)
                        .into_par_iter()
                        .with_min_len(config::min_len_for(num_ref))
                        .map(&search_one)
                        .collect()
                } else {
                    (0..num_ref).map(&search_one).collect()
                };

            if committing || deficits.load(Ordering::Relaxed) == 0 {
                for (i, row) in rows.into_iter().enumerate() {
                    let Some(row) = row else { continue };
                    for (rank, (rsq, j, rij)) in row.into_iter().enumerate() {
                        let slot = i * k + rank;
                        list.rsq[slot] = rsq;
                        list.indices[slot] = j;
                        list.displacements[slot] = rij;
                    }
                }
                if force_last {
                    list.status = SearchStatus::ClampedByBoxSize;
                }
                return Ok(list);
            }

            // Deficient pass: grow the cutoff. If it outgrows the box, clamp
            // it and force one last pass at the clamped radius.
            cutoff *= self.scale;
            let widths = simbox.nearest_plane_distance();
            let mut limit = widths.x.min(widths.y);
            if !simbox.is_2d() {
                limit = limit.min(widths.z);
            }
            if cutoff > 0.5 * limit {
                cutoff = CLAMP_FRACTION * limit;
                warn!(
                    cutoff,
                    "cutoff grew past what the box supports; forcing a final pass"
                );
                force_last = true;
            }
        }
    }
}
