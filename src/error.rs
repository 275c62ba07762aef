use std::fmt;

/// Errors reported by [`scan`](crate::scan) before any clustering work starts.
///
/// All variants are input-contract violations; once a scan begins it runs to
/// completion. An empty input is not an error, it is a successful no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Epsilon was zero, negative or NaN.
    InvalidEpsilon(f32),
    /// The minimum neighbor count was zero.
    InvalidMinPoints(usize),
    /// The dimension count was zero.
    InvalidDimensions,
    /// The coordinate buffer length is not a multiple of the dimension count.
    CoordinateLength { len: usize, dimensions: usize },
    /// The output label buffer does not hold exactly one slot per point.
    LabelLength { expected: usize, len: usize },
    /// The requested worker pool could not be constructed.
    ThreadPool(String),
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::InvalidEpsilon(epsilon) => {
                write!(f, "epsilon must be a positive number, got {epsilon}")
            }
            ScanError::InvalidMinPoints(min_points) => {
                write!(f, "minPoints must be at least 1, got {min_points}")
            }
            ScanError::InvalidDimensions => write!(f, "dimension count must be at least 1"),
            ScanError::CoordinateLength { len, dimensions } => write!(
                f,
                "coordinate buffer of length {len} is not a multiple of {dimensions} dimensions"
            ),
            ScanError::LabelLength { expected, len } => write!(
                f,
                "label buffer holds {len} entries but the input has {expected} points"
            ),
            ScanError::ThreadPool(reason) => write!(f, "failed to build worker pool: {reason}"),
        }
    }
}

impl std::error::Error for ScanError {}
