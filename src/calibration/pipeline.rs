use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cmaes_lbfgsb::lbfgsb_optimize::{lbfgsb_optimize, LbfgsbConfig as DriverConfig};
use tracing::{debug, trace, warn};

use crate::calibration::config::{OptimizationConfig, SolverKind};
use crate::calibration::levenberg_marquardt;
use crate::calibration::types::{
    CalibrationParams, CalibrationResult, ModelCalibrator, SolverOutcome,
};
use crate::data::MarketSlice;
use crate::error::{Result, SurfaceError};
use crate::models::sabr::SABRModelCalibrator;

/// One tenor's calibration: the calibrator, solver settings and seed.
pub struct CalibrationProcess {
    calibrator: SABRModelCalibrator,
    config: OptimizationConfig,
    initial_guess: Vec<f64>,
}

impl CalibrationProcess {
    /// Builds the calibrator for `slice` and projects the shared seed into
    /// its box.
    pub fn new(
        slice: MarketSlice,
        calib_params: &CalibrationParams,
        config: OptimizationConfig,
    ) -> Result<Self> {
        let calibrator = SABRModelCalibrator::new(
            slice,
            calib_params.beta,
            calib_params.param_bounds,
            calib_params.model_params.clone(),
        )?;
        let seed = calib_params.initial_guess;
        let initial_guess = calibrator.initial_vector(seed.alpha, seed.nu, seed.rho);
        Ok(Self {
            calibrator,
            config,
            initial_guess,
        })
    }

    /// Set initial guess for optimization (in optimisation-vector order)
    pub fn with_initial_guess(mut self, mut guess: Vec<f64>) -> Self {
        self.calibrator.project(&mut guess);
        self.initial_guess = guess;
        self
    }

    pub fn calibrator(&self) -> &SABRModelCalibrator {
        &self.calibrator
    }

    /// Run the fit and assemble the tenor's result.
    pub fn run(&self) -> Result<CalibrationResult> {
        let outcome = calibrate_model(&self.calibrator, &self.config, &self.initial_guess)?;
        let parameters = self.calibrator.to_params(&outcome.params)?;
        let fitted_vols = self.calibrator.fitted_vols(&parameters)?;
        let expiry = self.calibrator.slice().expiry();

        if outcome.converged {
            debug!(
                tenor = expiry,
                iterations = outcome.iterations,
                objective = outcome.objective,
                alpha = parameters.alpha,
                nu = parameters.nu,
                rho = parameters.rho,
                "tenor calibrated"
            );
        } else {
            warn!(
                tenor = expiry,
                iterations = outcome.iterations,
                objective = outcome.objective,
                "calibration stopped before reaching tolerance; returning best iterate"
            );
        }

        Ok(CalibrationResult {
            parameters,
            fitted_vols,
            residual_norm: outcome.objective.sqrt(),
            converged: outcome.converged,
            iterations: outcome.iterations,
            residual_history: outcome.history,
        })
    }
}

/// Runs the configured local solver on `model` from `initial_guess`.
///
/// # Errors
/// [`SurfaceError::Calibration`] if the objective cannot be evaluated at the
/// start point.
pub fn calibrate_model(
    model: &dyn ModelCalibrator,
    config: &OptimizationConfig,
    initial_guess: &[f64],
) -> Result<SolverOutcome> {
    match config.solver {
        SolverKind::LevenbergMarquardt => {
            levenberg_marquardt::minimize(model, initial_guess, config)
        }
        SolverKind::Lbfgsb => calibrate_with_lbfgsb(model, config, initial_guess),
    }
}

/// Variable and objective scaling for one L-BFGS-B round.
///
/// Coordinates are multiplied by the Jacobian column norms at the round's
/// start point, so the Gauss-Newton Hessian of the scaled problem has a unit
/// diagonal. The objective is scaled to unit curvature, and scaled down
/// further when far from the minimum so the driver's first steepest-descent
/// step stays short.
struct RoundScaling {
    columns: Vec<f64>,
    objective_scale: f64,
}

/// Smallest column scale; dead coordinates keep a finite scaling.
const MIN_COLUMN_SCALE: f64 = 1e-8;

impl RoundScaling {
    fn at(model: &dyn ModelCalibrator, x: &[f64], config: &OptimizationConfig) -> Self {
        let m = model.residual_count();
        let mut r = vec![0.0; m];
        let mut rp = vec![0.0; m];
        let mut rm = vec![0.0; m];
        model.residuals(x, &mut r);
        let jac = levenberg_marquardt::jacobian(
            model,
            x,
            model.param_bounds(),
            config.lm.fd_relative_step,
            &mut rp,
            &mut rm,
        );

        let columns: Vec<f64> = jac
            .column_iter()
            .map(|c| c.norm().max(MIN_COLUMN_SCALE))
            .collect();
        let half_gradient = jac
            .column_iter()
            .zip(&columns)
            .map(|(c, s)| {
                let g: f64 = c.iter().zip(&r).map(|(j, res)| j * res).sum();
                (g / s).abs()
            })
            .fold(0.0, f64::max);
        let objective_scale = if half_gradient.is_finite() && half_gradient > 1.0 {
            0.5 / half_gradient
        } else {
            0.5
        };
        Self {
            columns,
            objective_scale,
        }
    }

    fn to_scaled(&self, x: &[f64]) -> Vec<f64> {
        x.iter().zip(&self.columns).map(|(v, s)| v * s).collect()
    }

    fn from_scaled(&self, u: &[f64]) -> Vec<f64> {
        u.iter().zip(&self.columns).map(|(v, s)| v / s).collect()
    }

    fn bounds(&self, bounds: &[(f64, f64)]) -> Vec<(f64, f64)> {
        bounds
            .iter()
            .zip(&self.columns)
            .map(|(&(lo, hi), s)| (lo * s, hi * s))
            .collect()
    }
}

/// Box-constrained L-BFGS-B on the sum of squared residuals.
///
/// The driver runs in rounds of at most `lbfgsb.restart_iterations`
/// iterations. Each round rescales the problem at the best point so far and
/// restarts with a fresh curvature memory; the fit ends once the point is
/// stationary, a round brings no improvement, or the iteration budget is
/// spent. Convergence is judged on the returned point with the same
/// stationarity test the Levenberg-Marquardt solver uses.
fn calibrate_with_lbfgsb(
    model: &dyn ModelCalibrator,
    config: &OptimizationConfig,
    initial_guess: &[f64],
) -> Result<SolverOutcome> {
    let bounds = model.param_bounds();
    if initial_guess.len() != model.param_count() {
        return Err(SurfaceError::calibration(
            format!(
                "initial guess has {} entries, model has {}",
                initial_guess.len(),
                model.param_count()
            ),
            None,
        ));
    }

    let mut x = initial_guess.to_vec();
    for (v, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *v = v.clamp(lo, hi);
    }
    let mut best = model.evaluate_objective(&x);
    if !best.is_finite() {
        return Err(SurfaceError::calibration(
            format!(
                "{} objective is not finite at the initial guess",
                model.model_name()
            ),
            None,
        ));
    }

    let settings = &config.lbfgsb;
    let counter = Arc::new(AtomicUsize::new(0));
    let mut history = vec![best];
    let mut converged = levenberg_marquardt::is_stationary_at(model, &x, config);
    let mut round = 0;

    while !converged {
        let used = counter.load(Ordering::Relaxed);
        if used >= config.max_iterations {
            break;
        }
        let budget = settings.restart_iterations.max(1).min(config.max_iterations - used);
        round += 1;

        let scaling = RoundScaling::at(model, &x, config);
        let scaled_bounds = scaling.bounds(bounds);
        let obj_fn = |u: &[f64]| {
            scaling.objective_scale * model.evaluate_objective(&scaling.from_scaled(u))
        };
        let driver = DriverConfig {
            memory_size: settings.memory_size,
            obj_tol: settings.obj_tol,
            step_size_tol: settings.step_size_tol,
            fd_epsilon: settings.fd_epsilon,
            ..DriverConfig::default()
        };
        let callback_counter = Arc::clone(&counter);
        let mut refined_solution = scaling.to_scaled(&x);

        let refine_res = lbfgsb_optimize(
            &mut refined_solution,
            &scaled_bounds,
            &obj_fn,
            budget,
            settings.tolerance,
            Some(move |_current_x: &[f64], current_obj: f64| {
                let iteration = callback_counter.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(iteration, objective = current_obj, "lbfgsb iteration");
            }),
            Some(driver),
        );

        let mut candidate = match refine_res {
            Ok((_, loc_sol)) => scaling.from_scaled(&loc_sol),
            Err(e) => {
                warn!(round, error = ?e, "lbfgsb failed; keeping the best point so far");
                break;
            }
        };
        for (v, &(lo, hi)) in candidate.iter_mut().zip(bounds) {
            *v = v.clamp(lo, hi);
        }
        let candidate_obj = model.evaluate_objective(&candidate);
        trace!(round, objective = candidate_obj, best, "lbfgsb round finished");
        if !(candidate_obj.is_finite() && candidate_obj < best) {
            break;
        }
        x = candidate;
        best = candidate_obj;
        history.push(best);
        converged = levenberg_marquardt::is_stationary_at(model, &x, config);
    }

    Ok(SolverOutcome {
        params: x,
        objective: best,
        iterations: counter.load(Ordering::Relaxed),
        converged,
        history,
    })
}

/// Calibrates one slice with the given settings.
pub fn calibrate_slice(
    slice: MarketSlice,
    calib_params: &CalibrationParams,
    config: &OptimizationConfig,
) -> Result<CalibrationResult> {
    CalibrationProcess::new(slice, calib_params, config.clone())?.run()
}
