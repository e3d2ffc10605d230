use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Contract violations detected by the clustering and enclosing circle calculations.
///
/// None of these are recoverable in the sense of a retry, they mean the caller handed over data
/// that should have been filtered before the call.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterError {
    /// The distance threshold was negative, NaN, or infinite.
    InvalidThreshold(f64),
    /// A record had a latitude or longitude that was NaN or infinite.
    NonFiniteCoordinate {
        /// Position of the record in the input slice.
        index: usize,
        /// The id of the offending record.
        id: String,
        lat: f64,
        lon: f64,
    },
    /// A point handed to the enclosing circle calculation was NaN or infinite.
    NonFinitePoint { index: usize, x: f64, y: f64 },
    /// The enclosing circle of nothing was requested.
    EmptyPointSet,
}

impl Display for ClusterError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        match self {
            Self::InvalidThreshold(threshold) => write!(
                f,
                "invalid clustering threshold: {} km (must be finite and >= 0)",
                threshold
            ),
            Self::NonFiniteCoordinate { index, id, lat, lon } => write!(
                f,
                "record {} (id '{}') has a non-finite coordinate: lat={} lon={}",
                index, id, lat, lon
            ),
            Self::NonFinitePoint { index, x, y } => {
                write!(f, "point {} is not finite: x={} y={}", index, x, y)
            }
            Self::EmptyPointSet => write!(f, "cannot enclose an empty set of points"),
        }
    }
}

impl Error for ClusterError {}
