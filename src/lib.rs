//! Spatial pair statistics for periodic particle systems.
//!
//! Given one frame of particle positions (and, where relevant, orientations)
//! in a periodic 2D/3D box, this crate answers near-neighbor queries and
//! accumulates binned pair statistics:
//!
//! - [`PeriodicGrid`] buckets particles into a cell list sized to a cutoff
//!   radius and enumerates the cells that must be scanned around any point,
//!   with periodic wrap-around.
//! - [`NearestNeighbors`] finds the k nearest candidates per reference point,
//!   growing its cutoff until every point has enough neighbors or the box
//!   cannot support a larger radius.
//! - [`PmftXyt`] accumulates a normalized histogram of relative pair geometry
//!   (displacement in the reference particle's frame plus relative
//!   orientation) across frames.
//!
//! All passes run data-parallel on the global rayon pool; inputs smaller than
//! the configured threshold (see [`config`]) stay serial.

pub mod config;
pub mod error;
pub mod grid;
pub mod histogram;
pub mod neighbors;
pub mod pmft;
pub mod simbox;

pub use crate::error::{Error, Result};
pub use crate::grid::PeriodicGrid;
pub use crate::histogram::{Axis, LocalHistograms};
pub use crate::neighbors::{NO_NEIGHBOR, NearestNeighbors, NeighborList, SearchStatus};
pub use crate::pmft::PmftXyt;
pub use crate::simbox::SimBox;

use tracing_subscriber::EnvFilter;

pub fn get_num_threads() -> usize {
    rayon::current_num_threads()
}

/// Sizes the global rayon pool. Has no effect once the pool is initialized.
pub fn set_num_threads(n: usize) {
    let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
}

/// Installs a fmt subscriber honoring `RUST_LOG`, falling back to `level`
/// (or "info"). Safe to call more than once; later calls are no-ops.
pub fn init_logging(level: Option<String>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or_else(|| "info".to_string())));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(true)
        .try_init();
}
