use std::f64::consts::TAU;

use approx::assert_relative_eq;
use nalgebra::Vector3;
use pairstat_rs::{PmftXyt, SimBox};

#[test]
fn test_normalization_of_single_pair() {
    let b = SimBox::square(10.0).unwrap();
    let mut pmft = PmftXyt::new(1.0, 1.0, 8, 8, 4).unwrap();

    let refs = [Vector3::new(2.0, 2.0, 0.0)];
    let ref_orients = [0.3];
    let cands = [Vector3::new(2.4, 2.3, 0.0)];
    let cand_orients = [1.0];

    pmft.accumulate(&b, &refs, &ref_orients, &cands, &cand_orients)
        .unwrap();

    assert_eq!(pmft.bin_counts().iter().sum::<u64>(), 1);

    // One count normalizes to (volume / n_points) / (jacobian * frames * n_ref).
    let jacobian = 0.25 * 0.25 * (TAU / 4.0);
    let sum: f64 = pmft.pcf().iter().sum();
    assert_relative_eq!(sum, 100.0 / jacobian, max_relative = 1e-12);
}

#[test]
fn test_statistic_reads_are_idempotent() {
    let b = SimBox::square(10.0).unwrap();
    let mut pmft = PmftXyt::new(1.5, 1.5, 6, 6, 8).unwrap();

    let points = [
        Vector3::new(1.0, 1.0, 0.0),
        Vector3::new(1.8, 1.2, 0.0),
        Vector3::new(0.6, 1.9, 0.0),
    ];
    let orients = [0.0, 1.2, -0.4];
    pmft.accumulate(&b, &points, &orients, &points, &orients)
        .unwrap();

    let counts_first = pmft.bin_counts().to_vec();
    let pcf_first = pmft.pcf().to_vec();
    assert!(counts_first.iter().sum::<u64>() > 0);

    // No intervening accumulate: repeated reads must be bit-identical.
    assert_eq!(pmft.bin_counts(), counts_first.as_slice());
    assert_eq!(pmft.pcf(), pcf_first.as_slice());
}

#[test]
fn test_counts_grow_across_frames() {
    let b = SimBox::square(10.0).unwrap();
    let mut pmft = PmftXyt::new(1.0, 1.0, 4, 4, 4).unwrap();

    let refs = [Vector3::new(5.0, 5.0, 0.0)];
    let cands = [Vector3::new(5.5, 5.0, 0.0)];

    pmft.accumulate(&b, &refs, &[0.0], &cands, &[0.0]).unwrap();
    pmft.accumulate(&b, &refs, &[0.0], &cands, &[0.0]).unwrap();

    assert_eq!(pmft.frame_count(), 2);
    assert_eq!(pmft.bin_counts().iter().sum::<u64>(), 2);
}

#[test]
fn test_zero_pair_frame_only_bumps_counter() {
    let b = SimBox::square(10.0).unwrap();
    let mut pmft = PmftXyt::new(1.0, 1.0, 4, 4, 4).unwrap();

    // Far beyond r_cut = sqrt(2): no pair lands in the histogram.
    let refs = [Vector3::new(1.0, 1.0, 0.0)];
    let cands = [Vector3::new(6.0, 6.0, 0.0)];

    pmft.accumulate(&b, &refs, &[0.0], &cands, &[0.0]).unwrap();
    pmft.accumulate(&b, &refs, &[0.0], &cands, &[0.0]).unwrap();

    assert_eq!(pmft.frame_count(), 2);
    assert!(pmft.bin_counts().iter().all(|&c| c == 0));
    assert!(pmft.pcf().iter().all(|&v| v == 0.0));
}

#[test]
fn test_self_pair_is_skipped() {
    let b = SimBox::square(10.0).unwrap();
    let mut pmft = PmftXyt::new(1.0, 1.0, 4, 4, 4).unwrap();

    let p = [Vector3::new(3.0, 3.0, 0.0)];
    pmft.accumulate(&b, &p, &[0.4], &p, &[0.4]).unwrap();

    assert_eq!(pmft.frame_count(), 1);
    assert!(pmft.bin_counts().iter().all(|&c| c == 0));
}

#[test]
fn test_reset_round_trip() {
    let b = SimBox::square(10.0).unwrap();
    let mut pmft = PmftXyt::new(1.0, 1.0, 5, 5, 6).unwrap();

    let refs = [Vector3::new(5.0, 5.0, 0.0)];
    let cands = [Vector3::new(5.4, 5.1, 0.0)];
    pmft.accumulate(&b, &refs, &[0.0], &cands, &[0.7]).unwrap();
    assert!(pmft.bin_counts().iter().sum::<u64>() > 0);

    pmft.reset();
    assert_eq!(pmft.frame_count(), 0);
    let counts = pmft.bin_counts();
    assert_eq!(counts.len(), 5 * 5 * 6);
    assert!(counts.iter().all(|&c| c == 0));

    // The accumulator is reusable after a reset.
    pmft.accumulate(&b, &refs, &[0.0], &cands, &[0.7]).unwrap();
    assert_eq!(pmft.frame_count(), 1);
    assert_eq!(pmft.bin_counts().iter().sum::<u64>(), 1);
}

#[test]
fn test_shape_mismatch_rejected_up_front() {
    let b = SimBox::square(10.0).unwrap();
    let mut pmft = PmftXyt::new(1.0, 1.0, 4, 4, 4).unwrap();

    let points = [Vector3::new(1.0, 1.0, 0.0), Vector3::new(1.5, 1.0, 0.0)];
    let short = [0.0];
    let ok = [0.0, 0.0];

    assert!(pmft.accumulate(&b, &points, &short, &points, &ok).is_err());
    assert!(pmft.accumulate(&b, &points, &ok, &points, &short).is_err());

    // The failed calls left no trace.
    assert_eq!(pmft.frame_count(), 0);
    assert!(pmft.bin_counts().iter().all(|&c| c == 0));
}

#[test]
fn test_bin_centers() {
    let pmft = PmftXyt::new(2.0, 2.0, 4, 4, 4).unwrap();
    let x = pmft.x_centers();
    assert_eq!(x.len(), 4);
    assert_relative_eq!(x[0], -1.5);
    assert_relative_eq!(x[3], 1.5);

    let t = pmft.t_centers();
    assert_relative_eq!(t[0], TAU / 8.0);
}
