//! Per-tenor calibration across a dataset and assembly of the tenor × strike
//! vol matrix.
//!
//! Every tenor is fitted independently from the same seed, so rows can be
//! computed in any order or concurrently. Results are placed by tenor index,
//! never by completion order. A failing tenor is reported in
//! [`SurfaceBuild::failures`] and never aborts the rest of the build.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::calibration::config::OptimizationConfig;
use crate::calibration::pipeline::calibrate_slice;
use crate::calibration::types::{CalibrationParams, CalibrationResult};
use crate::data::dataset::{same_tenor, Dataset};
use crate::error::{ErrorKind, Result};
use crate::models::sabr::SABRParams;
use crate::models::utils::unit_axis;
use crate::surface::smile::Smile;

/// Fitted vol matrix over the tenors that calibrated successfully.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfaceGrid {
    /// Ascending tenors (years), one per row
    pub tenors: Vec<f64>,
    /// Ascending strikes, one per column
    pub strikes: Vec<f64>,
    /// `vol_matrix[i][j]` is the fitted vol at `tenors[i]`, `strikes[j]`
    pub vol_matrix: Vec<Vec<f64>>,
    /// Row index mapped linearly onto [0, 1]
    pub normalized_tenor_axis: Vec<f64>,
    /// Column index mapped linearly onto [0, 1]
    pub normalized_strike_axis: Vec<f64>,
    /// Fitted parameters of each row
    pub params: Vec<SABRParams>,
    /// Convergence flag of each row; false marks a tentative fit
    pub converged: Vec<bool>,
}

impl SurfaceGrid {
    pub fn rows(&self) -> usize {
        self.tenors.len()
    }

    pub fn columns(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenors.is_empty()
    }

    /// Fitted vols of the row at `tenor`, if present.
    pub fn row(&self, tenor: f64) -> Option<&[f64]> {
        self.tenors
            .iter()
            .position(|&t| same_tenor(t, tenor))
            .map(|i| self.vol_matrix[i].as_slice())
    }
}

/// A tenor that could not be calibrated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TenorFailure {
    pub tenor: f64,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a surface build.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfaceBuild {
    pub grid: SurfaceGrid,
    /// Tenors whose slice or fit failed, ascending
    pub failures: Vec<TenorFailure>,
    /// Tenors never started because the build was cancelled, ascending
    pub skipped: Vec<f64>,
}

impl SurfaceBuild {
    /// True when every requested tenor produced a row.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

enum TenorOutcome {
    Fitted(CalibrationResult),
    Failed(TenorFailure),
    Skipped,
}

/// Calibration front end over a loaded [`Dataset`].
///
/// Holds no mutable state; every call recomputes from the dataset.
#[derive(Debug, Clone)]
pub struct SabrSurface<'a> {
    dataset: &'a Dataset,
    calib_params: CalibrationParams,
    config: OptimizationConfig,
}

impl<'a> SabrSurface<'a> {
    pub fn new(
        dataset: &'a Dataset,
        calib_params: CalibrationParams,
        config: OptimizationConfig,
    ) -> Self {
        Self {
            dataset,
            calib_params,
            config,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        self.dataset
    }

    pub fn calib_params(&self) -> &CalibrationParams {
        &self.calib_params
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Loads and fits the slice at `tenor`.
    pub fn calibrate_tenor(&self, tenor: f64) -> Result<CalibrationResult> {
        let slice = self.dataset.load_slice(tenor)?;
        calibrate_slice(slice, &self.calib_params, &self.config)
    }

    /// Fitted smile for one tenor, with the market quotes alongside.
    pub fn smile(&self, tenor: f64) -> Result<Smile> {
        let slice = self.dataset.load_slice(tenor)?;
        let strikes = slice.strikes().to_vec();
        let market_vols = slice.market_vols().to_vec();
        let (forward, atm_vol, expiry) = (slice.forward(), slice.atm_vol(), slice.expiry());

        let calibration = calibrate_slice(slice, &self.calib_params, &self.config)?;
        Ok(Smile {
            tenor: expiry,
            forward,
            atm_vol,
            strikes,
            fitted_vols: calibration.fitted_vols.clone(),
            market_vols,
            calibration,
        })
    }

    /// Builds the surface over `tenors`.
    ///
    /// Tenors are sorted and de-duplicated first. Rows are fitted on the
    /// rayon pool when `config.parallel` is set.
    pub fn full_surface(&self, tenors: &[f64]) -> SurfaceBuild {
        self.build(tenors, None)
    }

    /// Builds the surface over every tenor in the dataset.
    pub fn full_surface_all(&self) -> SurfaceBuild {
        self.build(&self.dataset.tenors(), None)
    }

    /// Like [`full_surface`](Self::full_surface), but checks `cancel` before
    /// each tenor starts. Fits already running finish normally; tenors not
    /// yet started are reported in [`SurfaceBuild::skipped`].
    pub fn full_surface_with_cancel(&self, tenors: &[f64], cancel: &AtomicBool) -> SurfaceBuild {
        self.build(tenors, Some(cancel))
    }

    fn fit_one(&self, tenor: f64, cancel: Option<&AtomicBool>) -> TenorOutcome {
        if cancel.is_some_and(|flag| flag.load(Ordering::Acquire)) {
            return TenorOutcome::Skipped;
        }
        match self.calibrate_tenor(tenor) {
            Ok(result) => TenorOutcome::Fitted(result),
            Err(e) => {
                warn!(tenor, error = %e, "tenor failed; omitted from surface");
                TenorOutcome::Failed(TenorFailure {
                    tenor,
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn build(&self, tenors: &[f64], cancel: Option<&AtomicBool>) -> SurfaceBuild {
        let mut requested = tenors.to_vec();
        requested.sort_by(f64::total_cmp);
        requested.dedup_by(|a, b| same_tenor(*a, *b));

        info!(
            tenors = requested.len(),
            parallel = self.config.parallel,
            "building SABR surface"
        );

        let outcomes: Vec<TenorOutcome> = if self.config.parallel {
            requested
                .par_iter()
                .map(|&tenor| self.fit_one(tenor, cancel))
                .collect()
        } else {
            requested
                .iter()
                .map(|&tenor| self.fit_one(tenor, cancel))
                .collect()
        };

        let mut grid_tenors = Vec::new();
        let mut vol_matrix = Vec::new();
        let mut params = Vec::new();
        let mut converged = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        for (tenor, outcome) in requested.into_iter().zip(outcomes) {
            match outcome {
                TenorOutcome::Fitted(result) => {
                    grid_tenors.push(tenor);
                    params.push(result.parameters);
                    converged.push(result.converged);
                    vol_matrix.push(result.fitted_vols);
                }
                TenorOutcome::Failed(failure) => failures.push(failure),
                TenorOutcome::Skipped => skipped.push(tenor),
            }
        }

        debug!(
            rows = grid_tenors.len(),
            failed = failures.len(),
            skipped = skipped.len(),
            "surface assembled"
        );

        let strikes = self.dataset.strikes().to_vec();
        SurfaceBuild {
            grid: SurfaceGrid {
                normalized_tenor_axis: unit_axis(grid_tenors.len()),
                normalized_strike_axis: unit_axis(strikes.len()),
                tenors: grid_tenors,
                strikes,
                vol_matrix,
                params,
                converged,
            },
            failures,
            skipped,
        }
    }
}
