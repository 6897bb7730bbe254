//! Bound-projected Levenberg-Marquardt least-squares solver.
//!
//! Each iteration builds a central-difference Jacobian `J` of the residual
//! vector, then solves the Marquardt-scaled normal equations
//!
//! ```text
//! (JᵀJ + λ·diag(max(JᵀJ_jj, ε))) δ = -Jᵀr
//! ```
//!
//! with a Cholesky factorisation. The trial point `x + δ` is clamped into the
//! parameter box; it is accepted only if the sum of squares strictly drops,
//! so the accepted objective sequence is monotone. λ shrinks after accepted
//! steps and grows after rejected ones.

use nalgebra::{DMatrix, DVector};
use tracing::trace;

use crate::calibration::config::OptimizationConfig;
use crate::calibration::types::{ModelCalibrator, SolverOutcome};
use crate::error::{Result, SurfaceError};

/// Floor on the scaled diagonal, so a dead parameter still gets damped.
const DIAGONAL_FLOOR: f64 = 1e-12;

/// Smallest coordinate scale used for finite-difference steps.
const FD_MIN_SCALE: f64 = 1e-3;

fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (v, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *v = v.clamp(lo, hi);
    }
}

fn sum_of_squares(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn norm(x: &[f64]) -> f64 {
    sum_of_squares(x).sqrt()
}

/// Central-difference Jacobian at `x`. Bumped points are kept inside the box;
/// a coordinate pinned on a degenerate interval gets a zero column.
pub(crate) fn jacobian(
    model: &dyn ModelCalibrator,
    x: &[f64],
    bounds: &[(f64, f64)],
    relative_step: f64,
    rp: &mut [f64],
    rm: &mut [f64],
) -> DMatrix<f64> {
    let m = rp.len();
    let n = x.len();
    let mut jac = DMatrix::zeros(m, n);
    let mut xp = x.to_vec();
    let mut xm = x.to_vec();

    for j in 0..n {
        let (lo, hi) = bounds[j];
        let h = relative_step * x[j].abs().max(FD_MIN_SCALE);
        xp[j] = (x[j] + h).min(hi);
        xm[j] = (x[j] - h).max(lo);
        let width = xp[j] - xm[j];
        if width > 0.0 {
            model.residuals(&xp, rp);
            model.residuals(&xm, rm);
            for i in 0..m {
                jac[(i, j)] = (rp[i] - rm[i]) / width;
            }
        }
        xp[j] = x[j];
        xm[j] = x[j];
    }
    jac
}

/// True when no meaningful descent is left at `x` inside the box.
///
/// Coordinates sitting on a bound with the gradient pointing outwards are
/// fixed. On the remaining free coordinates the point is stationary if the
/// largest gradient component is below `gradient_tolerance`, or if the
/// Gauss-Newton decrement `gᵀ(JᵀJ)⁻¹g` is at most `rel_tolerance` times the
/// objective. An objective at or below `abs_tolerance` is always stationary.
pub(crate) fn is_stationary(
    jac: &DMatrix<f64>,
    r: &[f64],
    x: &[f64],
    bounds: &[(f64, f64)],
    config: &OptimizationConfig,
) -> bool {
    let sse = sum_of_squares(r);
    if sse <= config.abs_tolerance {
        return true;
    }
    let gradient = jac.tr_mul(&DVector::from_column_slice(r));
    let free: Vec<usize> = (0..x.len())
        .filter(|&j| {
            let (lo, hi) = bounds[j];
            !((x[j] <= lo && gradient[j] > 0.0) || (x[j] >= hi && gradient[j] < 0.0))
        })
        .collect();
    let free_gradient = free.iter().map(|&j| gradient[j].abs()).fold(0.0, f64::max);
    if free_gradient < config.gradient_tolerance {
        return true;
    }

    let jtj = jac.tr_mul(jac);
    let k = free.len();
    let mut reduced = DMatrix::<f64>::zeros(k, k);
    let mut g = DVector::<f64>::zeros(k);
    for (a, &p) in free.iter().enumerate() {
        g[a] = gradient[p];
        for (b, &q) in free.iter().enumerate() {
            reduced[(a, b)] = jtj[(p, q)];
        }
        reduced[(a, a)] += config.lm.min_damping * jtj[(p, p)].max(DIAGONAL_FLOOR);
    }
    match reduced.cholesky() {
        Some(cholesky) => g.dot(&cholesky.solve(&g)) <= config.rel_tolerance * sse,
        None => false,
    }
}

/// [`is_stationary`] for an arbitrary point, building the Jacobian there.
pub(crate) fn is_stationary_at(
    model: &dyn ModelCalibrator,
    x: &[f64],
    config: &OptimizationConfig,
) -> bool {
    let bounds = model.param_bounds();
    let m = model.residual_count();
    let mut r = vec![0.0; m];
    model.residuals(x, &mut r);
    if !sum_of_squares(&r).is_finite() {
        return false;
    }
    let mut rp = vec![0.0; m];
    let mut rm = vec![0.0; m];
    let jac = jacobian(model, x, bounds, config.lm.fd_relative_step, &mut rp, &mut rm);
    is_stationary(&jac, &r, x, bounds, config)
}

/// Minimises the sum of squared residuals of `model` starting from `x0`.
///
/// Returns the best iterate found; `converged` is false if the iteration cap
/// or the damping ceiling was reached before any tolerance was met. A
/// rejected step too small to move the point ends the fit, converged only if
/// the point passes [`is_stationary`].
///
/// # Errors
/// [`SurfaceError::Calibration`] if the objective at the (projected) start is
/// not finite or `x0` has the wrong length.
pub fn minimize(
    model: &dyn ModelCalibrator,
    x0: &[f64],
    config: &OptimizationConfig,
) -> Result<SolverOutcome> {
    let bounds = model.param_bounds();
    let n = model.param_count();
    let m = model.residual_count();
    if x0.len() != n {
        return Err(SurfaceError::calibration(
            format!("initial guess has {} entries, model has {n}", x0.len()),
            None,
        ));
    }

    let lm = &config.lm;
    let mut x = x0.to_vec();
    project(&mut x, bounds);

    let mut r = vec![0.0; m];
    model.residuals(&x, &mut r);
    let mut sse = sum_of_squares(&r);
    if !sse.is_finite() {
        return Err(SurfaceError::calibration(
            format!("{} objective is not finite at the initial guess", model.model_name()),
            None,
        ));
    }

    let mut rp = vec![0.0; m];
    let mut rm = vec![0.0; m];
    let mut r_trial = vec![0.0; m];
    let mut x_trial = vec![0.0; n];

    let mut lambda = lm.initial_damping;
    let mut history = vec![sse];
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;

        let jac = jacobian(model, &x, bounds, lm.fd_relative_step, &mut rp, &mut rm);
        let residual = DVector::from_column_slice(&r);
        let gradient = jac.tr_mul(&residual);
        if gradient.amax() < config.gradient_tolerance {
            converged = true;
            break;
        }

        let jtj = jac.tr_mul(&jac);
        let mut damped = jtj.clone();
        for j in 0..n {
            damped[(j, j)] += lambda * jtj[(j, j)].max(DIAGONAL_FLOOR);
        }

        let Some(cholesky) = damped.cholesky() else {
            lambda *= lm.damping_increase;
            if lambda > lm.max_damping {
                break;
            }
            continue;
        };
        let delta = cholesky.solve(&(-gradient));

        for j in 0..n {
            x_trial[j] = x[j] + delta[j];
        }
        project(&mut x_trial, bounds);
        let step_norm = x_trial
            .iter()
            .zip(&x)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        let step_small =
            step_norm <= config.step_tolerance * (norm(&x) + config.step_tolerance);

        model.residuals(&x_trial, &mut r_trial);
        let sse_trial = sum_of_squares(&r_trial);

        if sse_trial.is_finite() && sse_trial < sse {
            let rel_decrease = (sse - sse_trial) / sse;
            std::mem::swap(&mut x, &mut x_trial);
            std::mem::swap(&mut r, &mut r_trial);
            sse = sse_trial;
            history.push(sse);
            lambda = (lambda * lm.damping_decrease).max(lm.min_damping);
            trace!(
                iteration = iterations,
                objective = sse,
                damping = lambda,
                "lm step accepted"
            );
            if sse <= config.abs_tolerance || rel_decrease < config.rel_tolerance || step_small {
                converged = true;
                break;
            }
        } else {
            trace!(
                iteration = iterations,
                objective = sse_trial,
                damping = lambda,
                "lm step rejected"
            );
            if step_small {
                converged = is_stationary(&jac, &r, &x, bounds, config);
                break;
            }
            lambda *= lm.damping_increase;
            if lambda > lm.max_damping {
                break;
            }
        }
    }

    Ok(SolverOutcome {
        params: x,
        objective: sse,
        iterations,
        converged,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::config::LevenbergMarquardtConfig;

    /// r_i = a·exp(b·t_i) - y_i, fitted to exact data.
    struct ExpFit {
        t: Vec<f64>,
        y: Vec<f64>,
        bounds: Vec<(f64, f64)>,
    }

    impl ExpFit {
        fn new(a: f64, b: f64) -> Self {
            let t: Vec<f64> = (0..8).map(|i| i as f64 * 0.25).collect();
            let y = t.iter().map(|&t| a * (b * t).exp()).collect();
            Self {
                t,
                y,
                bounds: vec![(0.0, 10.0), (-5.0, 5.0)],
            }
        }
    }

    impl ModelCalibrator for ExpFit {
        fn model_name(&self) -> &str {
            "exp"
        }
        fn param_count(&self) -> usize {
            2
        }
        fn param_bounds(&self) -> &[(f64, f64)] {
            &self.bounds
        }
        fn param_names(&self) -> Vec<&str> {
            vec!["a", "b"]
        }
        fn residual_count(&self) -> usize {
            self.t.len()
        }
        fn residuals(&self, x: &[f64], out: &mut [f64]) {
            for ((r, &t), &y) in out.iter_mut().zip(&self.t).zip(&self.y) {
                *r = x[0] * (x[1] * t).exp() - y;
            }
        }
    }

    #[test]
    fn recovers_exact_parameters() {
        let model = ExpFit::new(2.0, -0.7);
        let out = minimize(&model, &[1.0, 0.0], &OptimizationConfig::default()).unwrap();
        assert!(out.converged);
        assert!((out.params[0] - 2.0).abs() < 1e-6, "{:?}", out.params);
        assert!((out.params[1] + 0.7).abs() < 1e-6, "{:?}", out.params);
    }

    #[test]
    fn history_is_strictly_decreasing() {
        let model = ExpFit::new(2.0, -0.7);
        let out = minimize(&model, &[1.0, 0.0], &OptimizationConfig::default()).unwrap();
        assert!(out.history.len() >= 2);
        for pair in out.history.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        assert_eq!(*out.history.last().unwrap(), out.objective);
    }

    #[test]
    fn respects_bounds_when_optimum_is_outside() {
        let mut model = ExpFit::new(2.0, -0.7);
        model.bounds = vec![(0.0, 1.5), (-5.0, 5.0)];
        let out = minimize(&model, &[1.0, 0.0], &OptimizationConfig::default()).unwrap();
        assert!(out.params[0] <= 1.5);
        assert!(out.params[1] >= -5.0 && out.params[1] <= 5.0);
    }

    #[test]
    fn iteration_cap_reports_not_converged() {
        let model = ExpFit::new(2.0, -0.7);
        let config = OptimizationConfig {
            max_iterations: 1,
            ..OptimizationConfig::default()
        };
        let out = minimize(&model, &[1.0, 0.0], &config).unwrap();
        assert_eq!(out.iterations, 1);
        assert!(!out.converged);
    }

    /// Any move away from the start adds a constant offset to the residual,
    /// so every trial is rejected although the gradient is far from zero.
    struct OffsetAwayFromStart {
        start: f64,
        bounds: Vec<(f64, f64)>,
    }

    impl ModelCalibrator for OffsetAwayFromStart {
        fn model_name(&self) -> &str {
            "offset"
        }
        fn param_count(&self) -> usize {
            1
        }
        fn param_bounds(&self) -> &[(f64, f64)] {
            &self.bounds
        }
        fn param_names(&self) -> Vec<&str> {
            vec!["x"]
        }
        fn residual_count(&self) -> usize {
            1
        }
        fn residuals(&self, x: &[f64], out: &mut [f64]) {
            let offset = if x[0] == self.start { 0.0 } else { 5.0 };
            out[0] = x[0] - 2.0 + offset;
        }
    }

    #[test]
    fn rejected_tiny_steps_are_not_convergence() {
        let model = OffsetAwayFromStart {
            start: 0.5,
            bounds: vec![(-10.0, 10.0)],
        };
        // Damping may grow until the step is below the step tolerance
        let config = OptimizationConfig {
            lm: LevenbergMarquardtConfig {
                max_damping: 1e20,
                ..LevenbergMarquardtConfig::default()
            },
            ..OptimizationConfig::default()
        };
        let out = minimize(&model, &[0.5], &config).unwrap();
        assert!(!out.converged);
        assert_eq!(out.params, vec![0.5]);
        assert_eq!(out.history.len(), 1);
        assert!(out.iterations < config.max_iterations);
    }

    /// r = x - 2 with x capped at 1.5
    struct Capped {
        bounds: Vec<(f64, f64)>,
    }

    impl ModelCalibrator for Capped {
        fn model_name(&self) -> &str {
            "capped"
        }
        fn param_count(&self) -> usize {
            1
        }
        fn param_bounds(&self) -> &[(f64, f64)] {
            &self.bounds
        }
        fn param_names(&self) -> Vec<&str> {
            vec!["x"]
        }
        fn residual_count(&self) -> usize {
            1
        }
        fn residuals(&self, x: &[f64], out: &mut [f64]) {
            out[0] = x[0] - 2.0;
        }
    }

    #[test]
    fn stationarity_respects_active_bounds() {
        let model = Capped {
            bounds: vec![(0.0, 1.5)],
        };
        let config = OptimizationConfig::default();
        assert!(is_stationary_at(&model, &[1.5], &config));
        assert!(!is_stationary_at(&model, &[1.0], &config));

        let exp = ExpFit::new(2.0, -0.7);
        assert!(is_stationary_at(&exp, &[2.0, -0.7], &config));
        assert!(!is_stationary_at(&exp, &[1.0, 0.0], &config));
    }

    #[test]
    fn wrong_length_start_is_an_error() {
        let model = ExpFit::new(2.0, -0.7);
        assert!(minimize(&model, &[1.0], &OptimizationConfig::default()).is_err());
    }
}
