// src/models/sabr/sabr_calibrator.rs

//! SABR model calibrator
//!
//! Exposes one expiry's least-squares problem to the solvers in
//! [`crate::calibration`]. The optimisation vector is `[alpha, nu, rho]`, or
//! `[nu, rho]` when alpha is implied from the ATM quote; `beta` is fixed.

use tracing::debug;

use crate::calibration::types::ModelCalibrator;
use crate::data::MarketSlice;
use crate::error::{Result, SurfaceError};
use crate::model_params::{AlphaMode, SabrModelParams};
use crate::models::sabr::sabr_model::{
    alpha_from_atm_vol, hagan_lognormal_vol, implied_vol, SABRParams,
};

/// Residual reported for a strike whose model vol is not finite, so the
/// solver backs away from that region instead of failing.
const PENALTY_RESIDUAL: f64 = 1e6;

/// Relative spread below which a smile counts as flat.
const FLAT_SMILE_TOLERANCE: f64 = 1e-12;

/// Box constraints for the SABR search
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SABRParamBounds {
    /// Vol level bounds; lower bound must be > 0
    pub alpha: (f64, f64),
    /// Vol-of-vol bounds; lower bound must be >= 0
    pub nu: (f64, f64),
    /// Correlation bounds; kept strictly inside (-1, 1)
    pub rho: (f64, f64),
}

impl Default for SABRParamBounds {
    fn default() -> Self {
        Self {
            alpha: (1e-6, 5.0),
            nu: (0.0, 5.0),
            rho: (-0.999, 0.999),
        }
    }
}

impl SABRParamBounds {
    fn validate(&self) -> Result<()> {
        for (name, (lo, hi)) in [("alpha", self.alpha), ("nu", self.nu), ("rho", self.rho)] {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(SurfaceError::validation(format!(
                    "{name} bounds must be finite with lower <= upper, got ({lo}, {hi})"
                )));
            }
        }
        if self.alpha.0 <= 0.0 {
            return Err(SurfaceError::domain(format!(
                "alpha lower bound must be positive, got {}",
                self.alpha.0
            )));
        }
        if self.nu.0 < 0.0 {
            return Err(SurfaceError::domain(format!(
                "nu lower bound must be non-negative, got {}",
                self.nu.0
            )));
        }
        if self.rho.0 <= -1.0 || self.rho.1 >= 1.0 {
            return Err(SurfaceError::domain(format!(
                "rho bounds must lie inside (-1, 1), got ({}, {})",
                self.rho.0, self.rho.1
            )));
        }
        Ok(())
    }
}

/// Calibrator for one expiry of the SABR model.
#[derive(Debug, Clone)]
pub struct SABRModelCalibrator {
    slice: MarketSlice,
    beta: f64,
    bounds: SABRParamBounds,
    /// Bounds of the optimisation vector, in vector order
    param_bounds: Vec<(f64, f64)>,
    params: SabrModelParams,
}

impl SABRModelCalibrator {
    /// Builds a calibrator, rejecting inputs on which a fit cannot start.
    ///
    /// # Errors
    /// * [`SurfaceError::Domain`] if `beta` is outside `[0, 1]` or the bounds
    ///   leave the SABR domain.
    /// * [`SurfaceError::Validation`] for malformed bounds or a negative ATM weight.
    /// * [`SurfaceError::Calibration`] if the slice has fewer quotes than
    ///   free parameters or the market smile is flat.
    pub fn new(
        slice: MarketSlice,
        beta: f64,
        param_bounds_opt: Option<SABRParamBounds>,
        model_params: SabrModelParams,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&beta) {
            return Err(SurfaceError::domain(format!(
                "beta must be in [0, 1], got {beta}"
            )));
        }
        let bounds = param_bounds_opt.unwrap_or_default();
        bounds.validate()?;
        if !(model_params.atm_weight.is_finite() && model_params.atm_weight >= 0.0) {
            return Err(SurfaceError::validation(format!(
                "atm_weight must be finite and non-negative, got {}",
                model_params.atm_weight
            )));
        }

        let free = model_params.free_parameter_count();
        if slice.len() < free {
            return Err(SurfaceError::calibration(
                format!(
                    "{} quotes cannot determine {free} free parameters",
                    slice.len()
                ),
                None,
            ));
        }

        let vols = slice.market_vols();
        let (lo, hi) = vols
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if hi - lo <= FLAT_SMILE_TOLERANCE * hi {
            return Err(SurfaceError::calibration(
                format!("market smile is flat at {hi}; objective has no gradient to follow"),
                None,
            ));
        }

        let param_bounds = match model_params.alpha_mode {
            AlphaMode::Calibrated => vec![bounds.alpha, bounds.nu, bounds.rho],
            AlphaMode::AtmImplied => vec![bounds.nu, bounds.rho],
        };

        debug!(
            expiry = slice.expiry(),
            quotes = slice.len(),
            beta,
            alpha_mode = ?model_params.alpha_mode,
            "SABR calibrator ready"
        );

        Ok(Self {
            slice,
            beta,
            bounds,
            param_bounds,
            params: model_params,
        })
    }

    pub fn slice(&self) -> &MarketSlice {
        &self.slice
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn bounds(&self) -> &SABRParamBounds {
        &self.bounds
    }

    pub fn model_params(&self) -> &SabrModelParams {
        &self.params
    }

    /// Optimisation vector for a seed `(alpha, nu, rho)`, projected into the box.
    pub fn initial_vector(&self, alpha: f64, nu: f64, rho: f64) -> Vec<f64> {
        let mut x = match self.params.alpha_mode {
            AlphaMode::Calibrated => vec![alpha, nu, rho],
            AlphaMode::AtmImplied => vec![nu, rho],
        };
        self.project(&mut x);
        x
    }

    /// Clamps `x` into the parameter box in place.
    pub fn project(&self, x: &mut [f64]) {
        for (v, &(lo, hi)) in x.iter_mut().zip(&self.param_bounds) {
            *v = v.clamp(lo, hi);
        }
    }

    /// Optimisation vector for a full parameter set, as seen by this calibrator.
    pub fn vector_from_params(&self, params: &SABRParams) -> Vec<f64> {
        match self.params.alpha_mode {
            AlphaMode::Calibrated => vec![params.alpha, params.nu, params.rho],
            AlphaMode::AtmImplied => vec![params.nu, params.rho],
        }
    }

    /// Resolves `alpha` for a vector, solving it from the ATM quote if needed.
    fn resolve(&self, x: &[f64]) -> Result<(f64, f64, f64)> {
        match self.params.alpha_mode {
            AlphaMode::Calibrated => Ok((x[0], x[1], x[2])),
            AlphaMode::AtmImplied => {
                let (nu, rho) = (x[0], x[1]);
                let alpha = alpha_from_atm_vol(
                    self.slice.forward(),
                    self.slice.expiry(),
                    self.slice.atm_vol(),
                    self.beta,
                    rho,
                    nu,
                )?;
                Ok((alpha, nu, rho))
            }
        }
    }

    /// Turns an optimisation vector into validated SABR parameters.
    pub fn to_params(&self, x: &[f64]) -> Result<SABRParams> {
        if x.len() != self.param_bounds.len() {
            return Err(SurfaceError::validation(format!(
                "expected {} parameters, got {}",
                self.param_bounds.len(),
                x.len()
            )));
        }
        let (alpha, nu, rho) = self.resolve(x)?;
        SABRParams::new(alpha, self.beta, rho, nu)
    }

    /// Model vols on the slice's strikes.
    pub fn fitted_vols(&self, params: &SABRParams) -> Result<Vec<f64>> {
        let f = self.slice.forward();
        let t = self.slice.expiry();
        self.slice
            .strikes()
            .iter()
            .map(|&k| implied_vol(k, f, t, params.alpha, params.beta, params.rho, params.nu))
            .collect()
    }
}

impl ModelCalibrator for SABRModelCalibrator {
    fn model_name(&self) -> &str {
        "sabr"
    }

    fn param_count(&self) -> usize {
        self.param_bounds.len()
    }

    fn param_bounds(&self) -> &[(f64, f64)] {
        &self.param_bounds
    }

    fn param_names(&self) -> Vec<&str> {
        match self.params.alpha_mode {
            AlphaMode::Calibrated => vec!["alpha", "nu", "rho"],
            AlphaMode::AtmImplied => vec!["nu", "rho"],
        }
    }

    fn residual_count(&self) -> usize {
        self.slice.len() + usize::from(self.params.atm_weight > 0.0)
    }

    fn residuals(&self, x: &[f64], out: &mut [f64]) {
        let Ok((alpha, nu, rho)) = self.resolve(x) else {
            out.fill(PENALTY_RESIDUAL);
            return;
        };
        let f = self.slice.forward();
        let t = self.slice.expiry();
        let beta = self.beta;

        let quotes = self.slice.strikes().iter().zip(self.slice.market_vols());
        for (r, (&k, &market)) in out.iter_mut().zip(quotes) {
            let model = hagan_lognormal_vol(k, f, t, alpha, beta, rho, nu);
            *r = if model.is_finite() {
                model - market
            } else {
                PENALTY_RESIDUAL
            };
        }

        if self.params.atm_weight > 0.0 {
            let model = hagan_lognormal_vol(f, f, t, alpha, beta, rho, nu);
            if let Some(r) = out.get_mut(self.slice.len()) {
                *r = if model.is_finite() {
                    self.params.atm_weight * (model - self.slice.atm_vol())
                } else {
                    PENALTY_RESIDUAL
                };
            }
        }
    }
}
