//! Model-specific knobs passed down to the SABR calibrator, kept apart from
//! the solver settings in [`crate::calibration::config`].

/// How `alpha` is determined during a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AlphaMode {
    /// `alpha` is a free parameter alongside `nu` and `rho`.
    #[default]
    Calibrated,
    /// `alpha` is solved from the ATM quote for every candidate `(nu, rho)`,
    /// so the fit runs over two parameters and reproduces the ATM vol exactly.
    AtmImplied,
}

/// Parameters that influence the SABR objective.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SabrModelParams {
    /// Weight of the ATM quote, added as one extra residual
    /// `atm_weight * (σ_model(F) - σ_ATM)`. Zero drops it from the objective.
    pub atm_weight: f64,

    pub alpha_mode: AlphaMode,
}

impl Default for SabrModelParams {
    fn default() -> Self {
        Self {
            atm_weight: 1.0,
            alpha_mode: AlphaMode::Calibrated,
        }
    }
}

impl SabrModelParams {
    /// Number of free parameters the solver sees.
    pub fn free_parameter_count(&self) -> usize {
        match self.alpha_mode {
            AlphaMode::Calibrated => 3,
            AlphaMode::AtmImplied => 2,
        }
    }
}
