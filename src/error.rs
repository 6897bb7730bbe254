//! Error types for sabr-surface.
//!
//! Every fallible operation returns `Result<T, SurfaceError>`. The three
//! numerical kinds mirror where a tenor can fail: bad input slices,
//! out-of-domain model evaluation, and a solver that cannot start.

use thiserror::Error;

/// Convenience type alias for results in this crate.
pub type Result<T> = std::result::Result<T, SurfaceError>;

/// Errors raised while loading market data, evaluating SABR or calibrating.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SurfaceError {
    /// Malformed or incomplete input slice (non-monotonic strikes, missing
    /// tenor, mismatched lengths, non-positive quotes).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A parameter or market value lies outside the region where the Hagan
    /// expansion is defined.
    #[error("domain error: {message}")]
    Domain { message: String },

    /// Fitted smile admits a butterfly arbitrage.
    #[error("arbitrage detected: {message}")]
    Arbitrage { message: String },

    /// The solver could not start on this slice.
    #[error("calibration error: {message}")]
    Calibration {
        message: String,
        /// RMS of the objective residuals at the point of failure, if known.
        rms_error: Option<f64>,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Coarse classification used when reporting failed tenors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    Validation,
    Domain,
    Calibration,
    Arbitrage,
    Input,
}

impl SurfaceError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn domain(message: impl Into<String>) -> Self {
        Self::Domain {
            message: message.into(),
        }
    }

    pub(crate) fn calibration(message: impl Into<String>, rms_error: Option<f64>) -> Self {
        Self::Calibration {
            message: message.into(),
            rms_error,
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Domain { .. } => ErrorKind::Domain,
            Self::Calibration { .. } => ErrorKind::Calibration,
            Self::Arbitrage { .. } => ErrorKind::Arbitrage,
            Self::Io(_) | Self::Csv(_) => ErrorKind::Input,
        }
    }
}
