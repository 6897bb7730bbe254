//! # sabr-surface: SABR Smile Calibration and Volatility Surfaces
//!
//! `sabr-surface` fits the SABR stochastic-volatility model to market implied
//! vols one tenor at a time, then evaluates the fitted models to produce
//! smooth smiles and a tenor × strike vol surface. Results are plain arrays of
//! floats for an external plotting or pricing layer to consume.
//!
//! ## Core Features
//!
//! - **Hagan SABR evaluator**: lognormal implied vol with a dedicated ATM branch
//! - **Calibration**: bound-projected Levenberg-Marquardt (or L-BFGS-B) over
//!   `(alpha, nu, rho)` with `beta` fixed
//! - **Surface building**: independent per-tenor fits, optionally parallel and
//!   cancellable, with failed tenors reported instead of aborting the build
//! - **Ingestion**: CSV tables with percent-formatted cells and named columns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sabr_surface::{
//!     default_configs, get_full_surface, get_smile, load_dataset, CalibrationParams,
//!     DatasetSchema,
//! };
//!
//! let dataset = load_dataset("black_vol.csv", &DatasetSchema::percent_points())?;
//! let config = default_configs::production();
//! let calib_params = CalibrationParams::default();
//!
//! // One smile for the plot's 2-D view
//! let smile = get_smile(&dataset, 5.0, &calib_params, &config)?;
//! let (strikes, fitted, market) = smile.as_arrays();
//!
//! // The whole surface for the 3-D view
//! let build = get_full_surface(&dataset, &dataset.tenors(), &calib_params, &config);
//! for failure in &build.failures {
//!     eprintln!("tenor {} failed: {:?}", failure.tenor, failure.kind);
//! }
//! # Ok::<(), sabr_surface::SurfaceError>(())
//! ```
//!
//! ## Configuration Presets
//!
//! - `production()`: default tolerances, parallel surface builds
//! - `fast()`: looser tolerances and a smaller iteration cap
//! - `research()`: tighter tolerances and a larger iteration cap
//! - `minimal()`: quick, sequential, low-precision checks

// ================================================================================================
// MODULES
// ================================================================================================

pub mod calibration;
pub mod data;
pub mod error;
pub mod model_params;
pub mod models;
pub mod surface;

mod validate;

// ================================================================================================
// IMPORTS
// ================================================================================================

use calibration::{pipeline::CalibrationProcess, types::ModelCalibrator};

// ================================================================================================
// PUBLIC RE-EXPORTS
// ================================================================================================

// Core types for market data and configuration
pub use calibration::{
    config::{LbfgsbConfig, LevenbergMarquardtConfig, OptimizationConfig, SolverKind},
    types::{CalibrationParams, CalibrationResult, InitialGuess},
};
pub use data::{
    load_dataset, load_dataset_from_reader, same_tenor, CellUnit, Dataset, DatasetSchema,
    MarketSlice,
};
pub use error::{ErrorKind, Result, SurfaceError};

// SABR model types and parameters
pub use models::sabr::{implied_vol, SABRModelCalibrator, SABRParamBounds, SABRParams, SabrSlice};

// Model parameter types
pub use model_params::{AlphaMode, SabrModelParams};

// Surface types
pub use surface::{SabrSurface, Smile, SurfaceBuild, SurfaceGrid, TenorFailure};

// ================================================================================================
// DEFAULT CONFIGURATIONS
// ================================================================================================

/// Pre-configured optimization settings for common use cases.
///
/// - [`production()`]: default tolerances for live use
/// - [`fast()`]: development settings
/// - [`research()`]: high-precision settings
/// - [`minimal()`]: quick validation settings
pub mod default_configs {
    use crate::calibration::config::OptimizationConfig;

    /// Production configuration.
    ///
    /// **Characteristics:**
    /// - Maximum iterations: 200
    /// - Objective tolerances: 1e-14 absolute, 1e-10 relative
    /// - Parallel surface builds
    ///
    /// # Example
    ///
    /// ```rust
    /// use sabr_surface::default_configs;
    ///
    /// let config = default_configs::production();
    /// assert_eq!(config.max_iterations, 200);
    /// ```
    pub fn production() -> OptimizationConfig {
        OptimizationConfig::production()
    }

    /// Fast configuration for development and testing.
    ///
    /// **Characteristics:**
    /// - Maximum iterations: 100
    /// - Relative and step tolerances: 1e-8
    pub fn fast() -> OptimizationConfig {
        OptimizationConfig::fast()
    }

    /// High-precision configuration for research and backtesting.
    ///
    /// **Characteristics:**
    /// - Maximum iterations: 1,000
    /// - Relative tolerance: 1e-12
    /// - Higher damping ceiling before a fit is declared stalled
    pub fn research() -> OptimizationConfig {
        OptimizationConfig::research()
    }

    /// Minimal configuration for quick validation and debugging.
    ///
    /// **Characteristics:**
    /// - Maximum iterations: 20
    /// - Relative tolerance: 1e-6
    /// - Sequential surface builds
    pub fn minimal() -> OptimizationConfig {
        OptimizationConfig::minimal()
    }
}

/// Calibrate SABR parameters to one tenor's market smile.
///
/// `beta` is held at `calib_params.beta`; the search runs over
/// `(alpha, nu, rho)` from `calib_params.initial_guess`, or from
/// `initial_guess` when given (in optimisation-vector order).
///
/// # Errors
///
/// * [`SurfaceError::Domain`] for `beta` outside `[0, 1]` or bounds leaving the SABR domain
/// * [`SurfaceError::Calibration`] for a slice with too few quotes or a flat smile
///
/// Hitting the iteration cap is not an error: the best iterate is returned
/// with `converged == false`.
///
/// # Example
///
/// ```rust
/// use sabr_surface::{calibrate_sabr, default_configs, CalibrationParams, MarketSlice};
///
/// let slice = MarketSlice::new(
///     1.0,
///     0.04,
///     0.20,
///     vec![0.02, 0.03, 0.04, 0.05, 0.06],
///     vec![0.32, 0.245, 0.20, 0.183, 0.186],
/// )?;
/// let result = calibrate_sabr(slice, default_configs::production(), CalibrationParams::default(), None)?;
/// assert!(result.converged);
/// assert_eq!(result.fitted_vols.len(), 5);
/// # Ok::<(), sabr_surface::SurfaceError>(())
/// ```
pub fn calibrate_sabr(
    slice: MarketSlice,
    config: OptimizationConfig,
    calib_params: CalibrationParams,
    initial_guess: Option<Vec<f64>>,
) -> Result<CalibrationResult> {
    let mut process = CalibrationProcess::new(slice, &calib_params, config)?;
    if let Some(guess) = initial_guess {
        process = process.with_initial_guess(guess);
    }
    process.run()
}

/// Evaluate the SABR calibration objective for a fixed parameter set.
///
/// Produces exactly the sum of squares that [`calibrate_sabr`] minimises,
/// including the weighted ATM residual. `beta` is taken from `params`. In
/// [`AlphaMode::AtmImplied`] the given `alpha` is ignored and solved from
/// the ATM quote, as during calibration.
pub fn evaluate_sabr(
    slice: &MarketSlice,
    params: SABRParams,
    calib_params: &CalibrationParams,
) -> Result<f64> {
    params.validate()?;
    let calibrator = SABRModelCalibrator::new(
        slice.clone(),
        params.beta,
        calib_params.param_bounds,
        calib_params.model_params.clone(),
    )?;
    let x = calibrator.vector_from_params(&params);
    Ok(calibrator.evaluate_objective(&x))
}

/// Fitted smile for one tenor of `dataset`.
///
/// Returns strikes, fitted vols and market vols through [`Smile::as_arrays`].
///
/// # Errors
///
/// * [`SurfaceError::Validation`] if the tenor is absent or its slice is malformed
/// * [`SurfaceError::Calibration`] if the slice is degenerate
pub fn get_smile(
    dataset: &Dataset,
    tenor: f64,
    calib_params: &CalibrationParams,
    config: &OptimizationConfig,
) -> Result<Smile> {
    SabrSurface::new(dataset, calib_params.clone(), config.clone()).smile(tenor)
}

/// Fitted surface over `tenors` of `dataset`.
///
/// Never fails as a whole: tenors that cannot be calibrated are listed in
/// [`SurfaceBuild::failures`] and left out of the grid.
pub fn get_full_surface(
    dataset: &Dataset,
    tenors: &[f64],
    calib_params: &CalibrationParams,
    config: &OptimizationConfig,
) -> SurfaceBuild {
    SabrSurface::new(dataset, calib_params.clone(), config.clone()).full_surface(tenors)
}
