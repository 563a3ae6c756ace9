use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported before any computation starts.
///
/// Search non-convergence is deliberately not represented here: an adaptive
/// search that cannot satisfy its neighbor count returns a best-effort,
/// sentinel-padded result tagged `SearchStatus::ClampedByBoxSize` instead of
/// failing.
#[derive(Debug, Error)]
pub enum Error {
    /// Box side lengths must be positive.
    #[error("box is degenerate: side lengths must be positive")]
    DegenerateBox,

    /// Cutoff radii must be positive and finite.
    #[error("cutoff must be positive and finite, got {0}")]
    InvalidCutoff(f64),

    /// The target neighbor count of an adaptive search must be at least 1.
    #[error("neighbor count must be at least 1")]
    ZeroNeighborCount,

    /// The adaptive search growth factor must strictly exceed 1.
    #[error("growth scale must be greater than 1, got {0}")]
    InvalidScale(f64),

    /// Histogram axes must have at least one bin.
    #[error("bin count must be at least 1")]
    ZeroBinCount,

    /// Histogram axis extents must be positive and finite.
    #[error("axis extent must be positive and finite, got {0}")]
    InvalidExtent(f64),

    /// A histogram bin must not be wider than its axis extent.
    #[error("bin width {width} exceeds the axis extent {max}")]
    BinWiderThanExtent { width: f64, max: f64 },

    /// Paired input buffers disagree on length.
    #[error("{what}: expected {expected} entries, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = Error::InvalidCutoff(-2.0);
        assert!(format!("{e}").contains("-2"));

        let e = Error::ShapeMismatch {
            what: "orientations",
            expected: 4,
            got: 3,
        };
        let msg = format!("{e}");
        assert!(msg.contains("orientations"));
        assert!(msg.contains("4"));
        assert!(msg.contains("3"));
    }
}
