#[cfg(feature = "serde")]
use serde::Deserialize;

/// Local solver used for each tenor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SolverKind {
    /// Damped Gauss-Newton on the residual vector
    #[default]
    LevenbergMarquardt,
    /// Box-constrained quasi-Newton on the sum of squares
    Lbfgsb,
}

/// Levenberg-Marquardt specific configuration parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LevenbergMarquardtConfig {
    /// Starting damping factor λ
    pub initial_damping: f64,
    /// Floor for λ after successful steps
    pub min_damping: f64,
    /// λ above this means no step can reduce the objective; the fit stops
    pub max_damping: f64,
    /// Multiplier applied to λ after a rejected step
    pub damping_increase: f64,
    /// Multiplier applied to λ after an accepted step
    pub damping_decrease: f64,
    /// Central-difference step, relative to max(|x|, 1e-3)
    pub fd_relative_step: f64,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            initial_damping: 1e-3,
            min_damping: 1e-12,
            max_damping: 1e10,
            damping_increase: 10.0,
            damping_decrease: 0.3,
            fd_relative_step: 1e-6,
        }
    }
}

/// L-BFGS-B specific configuration parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LbfgsbConfig {
    /// Projected-gradient tolerance handed to the L-BFGS-B driver
    pub tolerance: f64,
    /// Number of correction pairs kept by the driver
    pub memory_size: usize,
    /// Driver stops when the objective changes by less than this between iterations
    pub obj_tol: f64,
    /// Driver stops when the step norm falls below this
    pub step_size_tol: f64,
    /// Base finite-difference step of the driver's gradient
    pub fd_epsilon: f64,
    /// Driver iterations per round before rescaling and restarting from the best point
    pub restart_iterations: usize,
}

impl Default for LbfgsbConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            memory_size: 5,
            obj_tol: 1e-20,
            step_size_tol: 1e-14,
            fd_epsilon: 1e-12,
            restart_iterations: 25,
        }
    }
}

/// Main configuration struct for optimization
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize))]
pub struct OptimizationConfig {
    /// Hard cap on solver iterations per tenor
    #[cfg_attr(feature = "serde", serde(default = "default_max_iterations"))]
    pub max_iterations: usize,

    /// Converged once the sum of squared residuals is at or below this
    #[cfg_attr(feature = "serde", serde(default = "default_abs_tolerance"))]
    pub abs_tolerance: f64,

    /// Converged once an accepted step reduces the objective by less than this fraction
    #[cfg_attr(feature = "serde", serde(default = "default_rel_tolerance"))]
    pub rel_tolerance: f64,

    /// Converged once the largest gradient component falls below this
    #[cfg_attr(feature = "serde", serde(default = "default_gradient_tolerance"))]
    pub gradient_tolerance: f64,

    /// Converged once the step is this small relative to the parameter norm
    #[cfg_attr(feature = "serde", serde(default = "default_step_tolerance"))]
    pub step_tolerance: f64,

    #[cfg_attr(feature = "serde", serde(default))]
    pub solver: SolverKind,

    #[cfg_attr(feature = "serde", serde(default))]
    pub lm: LevenbergMarquardtConfig,

    #[cfg_attr(feature = "serde", serde(default))]
    pub lbfgsb: LbfgsbConfig,

    /// Fit tenors of a surface on the rayon pool
    #[cfg_attr(feature = "serde", serde(default = "default_parallel"))]
    pub parallel: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            abs_tolerance: default_abs_tolerance(),
            rel_tolerance: default_rel_tolerance(),
            gradient_tolerance: default_gradient_tolerance(),
            step_tolerance: default_step_tolerance(),
            solver: SolverKind::default(),
            lm: LevenbergMarquardtConfig::default(),
            lbfgsb: LbfgsbConfig::default(),
            parallel: default_parallel(),
        }
    }
}

impl OptimizationConfig {
    /// Default configuration for production calibration with high accuracy
    pub fn production() -> Self {
        Self::default()
    }

    /// Fast configuration for development and testing
    pub fn fast() -> Self {
        Self {
            max_iterations: 100,
            rel_tolerance: 1e-8,
            step_tolerance: 1e-8,
            ..Self::default()
        }
    }

    /// High-precision configuration for research and backtesting
    pub fn research() -> Self {
        Self {
            max_iterations: 1000,
            abs_tolerance: 1e-16,
            rel_tolerance: 1e-12,
            gradient_tolerance: 1e-14,
            step_tolerance: 1e-12,
            lm: LevenbergMarquardtConfig {
                max_damping: 1e12,
                ..LevenbergMarquardtConfig::default()
            },
            lbfgsb: LbfgsbConfig {
                tolerance: 1e-14,
                ..LbfgsbConfig::default()
            },
            ..Self::default()
        }
    }

    /// Minimal configuration for quick validation and debugging
    pub fn minimal() -> Self {
        Self {
            max_iterations: 20,
            abs_tolerance: 1e-10,
            rel_tolerance: 1e-6,
            gradient_tolerance: 1e-8,
            step_tolerance: 1e-6,
            lbfgsb: LbfgsbConfig {
                tolerance: 1e-8,
                ..LbfgsbConfig::default()
            },
            parallel: false,
            ..Self::default()
        }
    }
}

#[cfg(feature = "serde")]
impl OptimizationConfig {
    /// Parses a configuration from TOML; missing keys take their defaults.
    ///
    /// ```toml
    /// max_iterations = 100
    /// solver = "lbfgsb"
    ///
    /// [lm]
    /// initial_damping = 1e-2
    /// ```
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        toml::from_str(text).context("invalid optimization config")
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text)
    }
}

fn default_max_iterations() -> usize {
    200
}

fn default_abs_tolerance() -> f64 {
    1e-14
}

fn default_rel_tolerance() -> f64 {
    1e-10
}

fn default_gradient_tolerance() -> f64 {
    1e-12
}

fn default_step_tolerance() -> f64 {
    1e-10
}

fn default_parallel() -> bool {
    true
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(
            OptimizationConfig::from_toml_str("").unwrap(),
            OptimizationConfig::default()
        );
    }

    #[test]
    fn partial_toml_overrides_only_given_keys() {
        let cfg = OptimizationConfig::from_toml_str(
            r#"
max_iterations = 50
solver = "lbfgsb"
parallel = false

[lm]
initial_damping = 0.01
"#,
        )
        .unwrap();
        assert_eq!(cfg.max_iterations, 50);
        assert_eq!(cfg.solver, SolverKind::Lbfgsb);
        assert!(!cfg.parallel);
        assert_eq!(cfg.lm.initial_damping, 0.01);
        assert_eq!(cfg.lm.damping_increase, 10.0);
        assert_eq!(cfg.rel_tolerance, default_rel_tolerance());
    }

    #[test]
    fn unknown_solver_is_rejected() {
        assert!(OptimizationConfig::from_toml_str("solver = \"newton\"").is_err());
    }

    #[test]
    fn lbfgsb_driver_settings_load_from_toml() {
        let cfg = OptimizationConfig::from_toml_str(
            r#"
solver = "lbfgsb"

[lbfgsb]
restart_iterations = 10
"#,
        )
        .unwrap();
        assert_eq!(cfg.lbfgsb.restart_iterations, 10);
        assert_eq!(cfg.lbfgsb.obj_tol, LbfgsbConfig::default().obj_tol);
        assert_eq!(cfg.lbfgsb.memory_size, 5);
    }
}
