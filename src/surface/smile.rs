//! Single-tenor smile: the quoted strikes with market and fitted vols, plus a
//! dense evaluation of the fitted model for plotting.

use crate::calibration::types::CalibrationResult;
use crate::error::Result;
use crate::models::sabr::SabrSlice;
use crate::models::utils::linspace;

/// Fitted smile for one tenor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Smile {
    pub tenor: f64,
    pub forward: f64,
    pub atm_vol: f64,
    pub strikes: Vec<f64>,
    pub fitted_vols: Vec<f64>,
    pub market_vols: Vec<f64>,
    pub calibration: CalibrationResult,
}

impl Smile {
    /// Borrowed `(strikes, fitted_vols, market_vols)` view.
    pub fn as_arrays(&self) -> (&[f64], &[f64], &[f64]) {
        (&self.strikes, &self.fitted_vols, &self.market_vols)
    }

    /// Whether the fit met its tolerance; false marks a tentative fit.
    pub fn converged(&self) -> bool {
        self.calibration.converged
    }

    /// The fitted model as a [`SabrSlice`].
    pub fn model(&self) -> Result<SabrSlice> {
        SabrSlice::new(self.forward, self.tenor, self.calibration.parameters)
    }

    /// Evaluates the fitted model at `points` evenly spaced strikes from the
    /// first to the last quoted strike, both included.
    pub fn curve(&self, points: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let (Some(&lo), Some(&hi)) = (self.strikes.first(), self.strikes.last()) else {
            return Ok((Vec::new(), Vec::new()));
        };
        let strikes = linspace(lo, hi, points);
        let vols = self.model()?.implied_vols(&strikes)?;
        Ok((strikes, vols))
    }

    /// Largest absolute gap between fitted and market vols.
    pub fn max_abs_error(&self) -> f64 {
        self.fitted_vols
            .iter()
            .zip(&self.market_vols)
            .map(|(f, m)| (f - m).abs())
            .fold(0.0, f64::max)
    }
}
