use crate::model_params::SabrModelParams;
use crate::models::sabr::{SABRParamBounds, SABRParams};

/// Seed for the SABR search, shared unchanged by every tenor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InitialGuess {
    pub alpha: f64,
    pub nu: f64,
    pub rho: f64,
}

impl Default for InitialGuess {
    fn default() -> Self {
        Self {
            alpha: 0.15,
            nu: 0.87,
            rho: -0.5,
        }
    }
}

/// Per-call model settings for SABR calibration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CalibrationParams {
    /// CEV exponent held fixed during the fit
    pub beta: f64,
    pub initial_guess: InitialGuess,
    /// Custom box constraints (None for the defaults)
    pub param_bounds: Option<SABRParamBounds>,
    pub model_params: SabrModelParams,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            beta: 0.5,
            initial_guess: InitialGuess::default(),
            param_bounds: None,
            model_params: SabrModelParams::default(),
        }
    }
}

impl CalibrationParams {
    /// Default settings with a different fixed `beta`.
    pub fn with_beta(beta: f64) -> Self {
        Self {
            beta,
            ..Self::default()
        }
    }
}

/// Least-squares problem seen by the solvers.
///
/// The optimisation vector lives inside [`param_bounds`](Self::param_bounds);
/// implementations must return finite residuals for every point in that box.
pub trait ModelCalibrator: Send + Sync {
    /// Returns the name of the model (e.g., "sabr")
    fn model_name(&self) -> &str;

    /// How many parameters are in the model's optimization vector
    fn param_count(&self) -> usize;

    /// Returns the vector of (min, max) bounds for each parameter
    fn param_bounds(&self) -> &[(f64, f64)];

    /// Returns parameter names in the order they appear in the optimization vector
    fn param_names(&self) -> Vec<&str>;

    /// Length of the residual vector
    fn residual_count(&self) -> usize;

    /// Writes the residuals at `x` into `out` (length [`residual_count`](Self::residual_count)).
    fn residuals(&self, x: &[f64], out: &mut [f64]);

    /// Sum of squared residuals at `x`
    fn evaluate_objective(&self, x: &[f64]) -> f64 {
        let mut r = vec![0.0; self.residual_count()];
        self.residuals(x, &mut r);
        r.iter().map(|v| v * v).sum()
    }
}

/// Raw output of a local solver, in optimisation-vector space.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`
    pub objective: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Objective after the start and after every accepted step
    pub history: Vec<f64>,
}

/// Result of fitting one tenor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationResult {
    pub parameters: SABRParams,
    /// Model vols aligned with the slice's strikes
    pub fitted_vols: Vec<f64>,
    /// Euclidean norm of the residual vector at the solution
    pub residual_norm: f64,
    /// False when the iteration cap or damping limit was hit first
    pub converged: bool,
    pub iterations: usize,
    /// Sum of squared residuals at the start and after each accepted step;
    /// non-increasing
    pub residual_history: Vec<f64>,
}

impl CalibrationResult {
    /// Root-mean-square error of the fitted vols against `market_vols`.
    pub fn rms_error(&self, market_vols: &[f64]) -> f64 {
        let n = self.fitted_vols.len().min(market_vols.len());
        if n == 0 {
            return 0.0;
        }
        let sse: f64 = self
            .fitted_vols
            .iter()
            .zip(market_vols)
            .map(|(f, m)| (f - m) * (f - m))
            .sum();
        (sse / n as f64).sqrt()
    }
}
