use std::f64::consts::TAU;

use nalgebra::{Rotation2, Vector2, Vector3};
use rayon::prelude::*;
use tracing::info_span;

use crate::config;
use crate::error::{Error, Result};
use crate::grid::PeriodicGrid;
use crate::histogram::{Axis, LocalHistograms};
use crate::simbox::SimBox;

// Pairs closer than this (squared) are a particle against its own image and
// are skipped.
const SELF_PAIR_RSQ: f64 = 1e-6;

/// Potential of mean force and torque over (x, y, θ).
///
/// Bins the displacement of each near pair, rotated into the reference
/// particle's local frame, together with the relative orientation angle.
/// Counts accumulate across `accumulate` calls until `reset`; the normalized
/// statistic is recomputed lazily whenever the counts changed.
///
/// Count and statistic arrays are row-major over (x bin, y bin, t bin) with
/// the t index fastest; see [`PmftXyt::bin_index`].
pub struct PmftXyt {
    x_axis: Axis,
    y_axis: Axis,
    t_axis: Axis,
    jacobian: f64,
    r_cut: f64,
    locals: LocalHistograms,
    bin_counts: Vec<u64>,
    pcf: Vec<f64>,
    frame_count: usize,
    num_reference: usize,
    num_points: usize,
    box_volume: f64,
    reduce_pending: bool,
}

impl PmftXyt {
    /// x and y span `[-max, max)`; the angle axis spans `[0, 2π)`.
    pub fn new(
        max_x: f64,
        max_y: f64,
        n_bins_x: usize,
        n_bins_y: usize,
        n_bins_t: usize,
    ) -> Result<Self> {
        if !max_x.is_finite() || max_x <= 0.0 {
            return Err(Error::InvalidExtent(max_x));
        }
        if !max_y.is_finite() || max_y <= 0.0 {
            return Err(Error::InvalidExtent(max_y));
        }
        let x_axis = Axis::new(-max_x, max_x, n_bins_x)?;
        let y_axis = Axis::new(-max_y, max_y, n_bins_y)?;
        let t_axis = Axis::new(0.0, TAU, n_bins_t)?;
        if x_axis.width() > max_x {
            return Err(Error::BinWiderThanExtent {
                width: x_axis.width(),
                max: max_x,
            });
        }
        if y_axis.width() > max_y {
            return Err(Error::BinWiderThanExtent {
                width: y_axis.width(),
                max: max_y,
            });
        }

        let num_bins = n_bins_x * n_bins_y * n_bins_t;
        Ok(Self {
            jacobian: x_axis.width() * y_axis.width() * t_axis.width(),
            r_cut: max_x.hypot(max_y),
            x_axis,
            y_axis,
            t_axis,
            locals: LocalHistograms::new(num_bins),
            bin_counts: vec![0; num_bins],
            pcf: vec![0.0; num_bins],
            frame_count: 0,
            num_reference: 0,
            num_points: 0,
            box_volume: 0.0,
            reduce_pending: false,
        })
    }

    /// Bins every near pair of one frame into the worker-local counters.
    ///
    /// Orientations are in radians and share index space with their point
    /// sets; mismatched lengths fail before any work happens. Pair
    /// enumeration is restricted to the cutoff implied by the histogram
    /// extents, so candidates whose rotated displacement falls outside the
    /// axes are simply dropped.
    pub fn accumulate(
        &mut self,
        simbox: &SimBox,
        ref_points: &[Vector3<f64>],
        ref_orientations: &[f64],
        points: &[Vector3<f64>],
        orientations: &[f64],
    ) -> Result<()> {
        if ref_orientations.len() != ref_points.len() {
            return Err(Error::ShapeMismatch {
                what: "reference orientations",
                expected: ref_points.len(),
                got: ref_orientations.len(),
            });
        }
        if orientations.len() != points.len() {
            return Err(Error::ShapeMismatch {
                what: "orientations",
                expected: points.len(),
                got: orientations.len(),
            });
        }
        let _span = info_span!(
            "PmftXyt::accumulate",
            num_ref = ref_points.len(),
            num_points = points.len()
        )
        .entered();

        let grid = PeriodicGrid::build(simbox, self.r_cut, points)?;
        let num_ref = ref_points.len();

        let locals = &self.locals;
        let x_axis = &self.x_axis;
        let y_axis = &self.y_axis;
        let t_axis = &self.t_axis;

        let bin_one = |i: usize| {
            locals.with_local(|bins| {
                let ref_point = ref_points[i];
                let to_local = Rotation2::new(-ref_orientations[i]);
                for cell in grid.neighbors_of(grid.cell_of(&ref_point)) {
                    for j in grid.particles_in(cell) {
                        let delta = simbox.wrap(&(points[j] - ref_point));
                        if delta.norm_squared() < SELF_PAIR_RSQ {
                            continue;
                        }
                        let local = to_local * Vector2::new(delta.x, delta.y);
                        let angle =
                            (orientations[j] - (-delta.y).atan2(-delta.x)).rem_euclid(TAU);
                        let (Some(bx), Some(by), Some(bt)) = (
                            x_axis.bin_index(local.x),
                            y_axis.bin_index(local.y),
                            t_axis.bin_index(angle),
                        ) else {
                            continue;
                        };
                        bins[(bx * y_axis.bins() + by) * t_axis.bins() + bt] += 1;
                    }
                }
            });
        };

        if num_ref >= config::get_parallel_threshold() {
            (0..num_ref)
                .into_par_iter()
                .with_min_len(config::min_len_for(num_ref))
                .for_each(bin_one);
        } else {
            (0..num_ref).for_each(bin_one);
        }

        self.frame_count += 1;
        self.num_reference = num_ref;
        self.num_points = points.len();
        self.box_volume = simbox.volume();
        self.reduce_pending = true;
        Ok(())
    }

    /// Merged bin counts, reduced from the worker-local counters on demand.
    pub fn bin_counts(&mut self) -> &[u64] {
        if self.reduce_pending {
            self.reduce();
        }
        &self.bin_counts
    }

    /// The normalized pair statistic. A pure function of the counts, the
    /// accumulated frame count and the last frame's box volume and particle
    /// counts; cached until the next `accumulate`.
    pub fn pcf(&mut self) -> &[f64] {
        if self.reduce_pending {
            self.reduce();
        }
        &self.pcf
    }

    /// Zeroes all counters and the frame counter. Worker-local storage is
    /// kept for reuse.
    pub fn reset(&mut self) {
        self.locals.reset();
        self.frame_count = 0;
        self.reduce_pending = true;
    }

    fn reduce(&mut self) {
        self.locals.reduce_into(&mut self.bin_counts);

        let norm = if self.frame_count == 0 || self.num_reference == 0 || self.num_points == 0 {
            0.0
        } else {
            (self.box_volume / self.num_points as f64)
                / (self.jacobian * self.frame_count as f64 * self.num_reference as f64)
        };
        let counts = &self.bin_counts;
        self.pcf
            .par_iter_mut()
            .enumerate()
            .for_each(|(bin, value)| *value = counts[bin] as f64 * norm);
        self.reduce_pending = false;
    }

    /// Linear index of bin (bx, by, bt) in the count/statistic arrays.
    pub fn bin_index(&self, bx: usize, by: usize, bt: usize) -> usize {
        (bx * self.y_axis.bins() + by) * self.t_axis.bins() + bt
    }

    pub fn n_bins_x(&self) -> usize {
        self.x_axis.bins()
    }

    pub fn n_bins_y(&self) -> usize {
        self.y_axis.bins()
    }

    pub fn n_bins_t(&self) -> usize {
        self.t_axis.bins()
    }

    pub fn x_centers(&self) -> Vec<f64> {
        self.x_axis.centers()
    }

    pub fn y_centers(&self) -> Vec<f64> {
        self.y_axis.centers()
    }

    pub fn t_centers(&self) -> Vec<f64> {
        self.t_axis.centers()
    }

    /// Neighbor-enumeration cutoff implied by the histogram extents.
    pub fn r_cut(&self) -> f64 {
        self.r_cut
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_validation() {
        assert!(PmftXyt::new(0.0, 1.0, 4, 4, 4).is_err());
        assert!(PmftXyt::new(1.0, -1.0, 4, 4, 4).is_err());
        assert!(PmftXyt::new(1.0, 1.0, 0, 4, 4).is_err());
        assert!(PmftXyt::new(1.0, 1.0, 4, 0, 4).is_err());
        assert!(PmftXyt::new(1.0, 1.0, 4, 4, 0).is_err());
        // A single x bin would be 2*max wide.
        assert!(PmftXyt::new(1.0, 1.0, 1, 4, 4).is_err());
        assert!(PmftXyt::new(1.0, 1.0, 4, 4, 4).is_ok());
    }

    #[test]
    fn test_r_cut_and_shape() {
        let pmft = PmftXyt::new(3.0, 4.0, 6, 8, 4).unwrap();
        assert!((pmft.r_cut() - 5.0).abs() < 1e-12);
        assert_eq!(pmft.n_bins_x(), 6);
        assert_eq!(pmft.n_bins_y(), 8);
        assert_eq!(pmft.n_bins_t(), 4);
        assert_eq!(pmft.x_centers().len(), 6);
        assert_eq!(pmft.bin_index(5, 7, 3), 6 * 8 * 4 - 1);
    }

    #[test]
    fn test_known_bin_location() {
        let b = SimBox::square(10.0).unwrap();
        let mut pmft = PmftXyt::new(2.0, 2.0, 4, 4, 4).unwrap();

        // Reference at the origin facing +x, candidate one unit to the right
        // also facing +x: local displacement (1, 0), relative angle
        // θ_j - atan2(0, -1) = -π which wraps to π.
        let refs = [Vector3::new(5.0, 5.0, 0.0)];
        let ref_orients = [0.0];
        let cands = [Vector3::new(6.0, 5.0, 0.0)];
        let cand_orients = [0.0];

        pmft.accumulate(&b, &refs, &ref_orients, &cands, &cand_orients)
            .unwrap();

        let idx = pmft.bin_index(3, 2, 2);
        let counts = pmft.bin_counts();
        assert_eq!(counts[idx], 1);
        assert_eq!(counts.iter().sum::<u64>(), 1);
    }
}
