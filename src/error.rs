//! Error types for Derivar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch in {op}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("Invalid argument to {op}: {reason}")]
    InvalidArgument { op: &'static str, reason: String },

    #[error("Axis {axis} out of range in {op} for tensor of rank {rank}")]
    AxisOutOfRange {
        op: &'static str,
        axis: isize,
        rank: usize,
    },

    #[error("Unknown tensor id {0}")]
    UnknownTensor(usize),

    #[error("Backward requires a scalar root, got shape {shape:?}")]
    NonScalarRoot { shape: Vec<usize> },

    #[error("Non-finite gradient produced by {op}")]
    NonFiniteGradient { op: &'static str },

    #[error("Backward operation failed: {0}")]
    BackwardFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),
}

impl Error {
    pub(crate) fn invalid(op: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            op,
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(op: &'static str, lhs: &[usize], rhs: &[usize]) -> Self {
        Error::ShapeMismatch {
            op,
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
