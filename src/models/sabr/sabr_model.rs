// src/models/sabr/sabr_model.rs

//! SABR (Stochastic Alpha Beta Rho) smile model
//!
//! The forward follows a CEV process with lognormal stochastic volatility:
//!
//! ```text
//! dF = σ F^β dW₁,   dσ = ν σ dW₂,   dW₁·dW₂ = ρ dt
//! ```
//!
//! Implied Black vol comes from the Hagan et al. (2002) singular-perturbation
//! expansion:
//!
//! ```text
//! σ_B(K) = α / [(FK)^((1-β)/2) (1 + (1-β)²/24 ln²(F/K) + (1-β)⁴/1920 ln⁴(F/K))]
//!          · z/x(z)
//!          · [1 + ((1-β)²/24 α²/(FK)^(1-β) + ρβνα/(4 (FK)^((1-β)/2)) + (2-3ρ²)/24 ν²) T]
//! z    = ν/α (FK)^((1-β)/2) ln(F/K)
//! x(z) = ln[(√(1-2ρz+z²) + z - ρ) / (1-ρ)]
//! ```
//!
//! At the money the general form is 0/0, so a dedicated ATM limit is used.

use roots::{find_root_brent, SimpleConvergency};

use crate::error::{Result, SurfaceError};
use crate::models::black::{black_call_price, black_put_price};
use crate::models::traits::SmileModel;
use crate::validate::{domain_non_negative, domain_positive};

/// |K - F| below this fraction of F is treated as at the money.
pub const ATM_RELATIVE_TOLERANCE: f64 = 1e-10;

/// Below this |z| the ratio z/x(z) is replaced by its series 1 - ρz/2.
const SMALL_Z: f64 = 1e-8;

const ATM_ALPHA_TOLERANCE: f64 = 1e-14;

/// SABR parameters for one expiry.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SABRParams {
    /// Initial vol level, > 0
    pub alpha: f64,
    /// CEV exponent in [0, 1]; fixed externally, never fitted
    pub beta: f64,
    /// Spot/vol correlation in (-1, 1)
    pub rho: f64,
    /// Vol of vol, >= 0
    pub nu: f64,
}

fn validate_sabr_params(alpha: f64, beta: f64, rho: f64, nu: f64) -> Result<()> {
    domain_positive(alpha, "alpha")?;
    if !(0.0..=1.0).contains(&beta) {
        return Err(SurfaceError::domain(format!(
            "beta must be in [0, 1], got {beta}"
        )));
    }
    if rho.is_nan() || rho.abs() >= 1.0 {
        return Err(SurfaceError::domain(format!(
            "rho must be in (-1, 1), got {rho}"
        )));
    }
    domain_non_negative(nu, "nu")?;
    Ok(())
}

impl SABRParams {
    /// Creates validated parameters.
    pub fn new(alpha: f64, beta: f64, rho: f64, nu: f64) -> Result<Self> {
        validate_sabr_params(alpha, beta, rho, nu)?;
        Ok(Self {
            alpha,
            beta,
            rho,
            nu,
        })
    }

    pub fn validate(&self) -> Result<()> {
        validate_sabr_params(self.alpha, self.beta, self.rho, self.nu)
    }
}

/// Hagan implied vol without domain checks.
///
/// Callers must guarantee `forward, strike, expiry, alpha > 0`, `nu >= 0`,
/// `beta ∈ [0, 1]` and `|rho| < 1`. Under those conditions every
/// intermediate is finite except on overflow, `z/x(z) > 0`, and the leading
/// factor is positive; only the time-correction bracket can go negative
/// (large T with strongly negative ρβν), so the result is floored at zero.
/// A NaN can only come from overflow and is passed through for the caller
/// to reject. Allocation-free; this is the inner loop of calibration.
#[inline]
pub(crate) fn hagan_lognormal_vol(
    strike: f64,
    forward: f64,
    expiry: f64,
    alpha: f64,
    beta: f64,
    rho: f64,
    nu: f64,
) -> f64 {
    let one_minus_beta = 1.0 - beta;
    let omb2 = one_minus_beta * one_minus_beta;

    if (strike - forward).abs() < ATM_RELATIVE_TOLERANCE * forward {
        return hagan_atm_vol(forward, expiry, alpha, beta, rho, nu);
    }

    let fk = forward * strike;
    let log_fk = (forward / strike).ln();
    let fk_half = fk.powf(0.5 * one_minus_beta);

    let z = nu / alpha * fk_half * log_fk;
    let ratio = if z.abs() < SMALL_Z {
        1.0 - 0.5 * rho * z
    } else {
        let root = (1.0 - 2.0 * rho * z + z * z).sqrt();
        let shifted = z - rho;
        // root + (z - ρ) cancels for large negative z; use the conjugate form
        let numerator = if shifted >= 0.0 {
            root + shifted
        } else {
            (1.0 - rho * rho) / (root - shifted)
        };
        let xz = (numerator / (1.0 - rho)).ln();
        z / xz
    };

    let log2 = log_fk * log_fk;
    let denom = fk_half * (1.0 + omb2 / 24.0 * log2 + omb2 * omb2 / 1920.0 * log2 * log2);
    let correction = 1.0
        + (omb2 / 24.0 * alpha * alpha / (fk_half * fk_half)
            + 0.25 * rho * beta * nu * alpha / fk_half
            + (2.0 - 3.0 * rho * rho) / 24.0 * nu * nu)
            * expiry;

    let vol = alpha / denom * ratio * correction;
    if vol < 0.0 {
        0.0
    } else {
        vol
    }
}

/// ATM limit of the Hagan expansion (K = F).
#[inline]
fn hagan_atm_vol(forward: f64, expiry: f64, alpha: f64, beta: f64, rho: f64, nu: f64) -> f64 {
    let one_minus_beta = 1.0 - beta;
    let f_pow = forward.powf(one_minus_beta);
    let correction = 1.0
        + (one_minus_beta * one_minus_beta / 24.0 * alpha * alpha / (f_pow * f_pow)
            + 0.25 * rho * beta * nu * alpha / f_pow
            + (2.0 - 3.0 * rho * rho) / 24.0 * nu * nu)
            * expiry;
    let vol = alpha / f_pow * correction;
    if vol < 0.0 {
        0.0
    } else {
        vol
    }
}

/// Black implied vol of a SABR model at one strike.
///
/// # Errors
/// [`SurfaceError::Domain`] if any input is outside `forward, strike,
/// expiry, alpha > 0`, `nu >= 0`, `beta ∈ [0, 1]`, `rho ∈ (-1, 1)`, or if the
/// expansion overflows. Never returns NaN; the value is always finite and
/// non-negative.
pub fn implied_vol(
    strike: f64,
    forward: f64,
    expiry: f64,
    alpha: f64,
    beta: f64,
    rho: f64,
    nu: f64,
) -> Result<f64> {
    domain_positive(forward, "forward")?;
    domain_positive(strike, "strike")?;
    domain_positive(expiry, "expiry")?;
    validate_sabr_params(alpha, beta, rho, nu)?;

    let vol = hagan_lognormal_vol(strike, forward, expiry, alpha, beta, rho, nu);
    if !vol.is_finite() {
        return Err(SurfaceError::domain(format!(
            "SABR expansion is not finite at strike={strike}, forward={forward}, expiry={expiry}"
        )));
    }
    Ok(vol)
}

/// Solves for the `alpha` that reproduces `atm_vol` at the money, given the
/// other parameters.
///
/// The ATM vol is α/F^(1-β) times a correction polynomial in α; it is
/// bracketed around the leading-order guess `atm_vol · F^(1-β)` and then
/// refined with Brent's method. If the correction admits several roots the
/// one nearest the leading-order guess from below is returned.
pub fn alpha_from_atm_vol(
    forward: f64,
    expiry: f64,
    atm_vol: f64,
    beta: f64,
    rho: f64,
    nu: f64,
) -> Result<f64> {
    domain_positive(forward, "forward")?;
    domain_positive(expiry, "expiry")?;
    domain_positive(atm_vol, "atm_vol")?;
    validate_sabr_params(1.0, beta, rho, nu)?;

    let objective = |alpha: f64| hagan_atm_vol(forward, expiry, alpha, beta, rho, nu) - atm_vol;

    let guess = atm_vol * forward.powf(1.0 - beta);
    let mut lo = guess;
    let mut hi = guess;
    let mut found = false;
    for _ in 0..60 {
        if objective(lo) < 0.0 {
            found = true;
            break;
        }
        lo *= 0.5;
    }
    if !found {
        return Err(SurfaceError::domain(format!(
            "no alpha below {guess} undershoots ATM vol {atm_vol}"
        )));
    }
    found = false;
    for _ in 0..60 {
        if objective(hi) > 0.0 {
            found = true;
            break;
        }
        lo = hi;
        hi *= 2.0;
    }
    if !found {
        return Err(SurfaceError::domain(format!(
            "ATM vol {atm_vol} is not reachable for beta={beta}, rho={rho}, nu={nu}"
        )));
    }

    let mut convergency = SimpleConvergency {
        eps: ATM_ALPHA_TOLERANCE,
        max_iter: 100,
    };
    find_root_brent(lo, hi, &objective, &mut convergency).map_err(|e| {
        SurfaceError::domain(format!("ATM alpha root search failed: {e:?}"))
    })
}

/// A SABR smile for a single forward and expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct SabrSlice {
    pub forward: f64,
    pub expiry: f64,
    pub params: SABRParams,
}

impl SabrSlice {
    /// Creates a slice after validating the market state and parameters.
    pub fn new(forward: f64, expiry: f64, params: SABRParams) -> Result<Self> {
        domain_positive(forward, "forward")?;
        domain_positive(expiry, "expiry")?;
        params.validate()?;
        Ok(Self {
            forward,
            expiry,
            params,
        })
    }

    /// Evaluates the smile on every strike in `strikes`.
    pub fn implied_vols(&self, strikes: &[f64]) -> Result<Vec<f64>> {
        strikes.iter().map(|&k| self.implied_vol(k)).collect()
    }

    /// Undiscounted out-of-the-money Black price at `strike`.
    fn otm_price(&self, strike: f64) -> Result<f64> {
        let vol = self.implied_vol(strike)?;
        Ok(if strike < self.forward {
            black_put_price(self.forward, strike, self.expiry, vol)
        } else {
            black_call_price(self.forward, strike, self.expiry, vol)
        })
    }
}

impl SmileModel for SabrSlice {
    type Parameters = SABRParams;

    fn parameters(&self) -> &Self::Parameters {
        &self.params
    }

    fn validate_params(&self) -> Result<()> {
        self.params.validate()
    }

    fn implied_vol(&self, strike: f64) -> Result<f64> {
        let p = &self.params;
        implied_vol(
            strike,
            self.forward,
            self.expiry,
            p.alpha,
            p.beta,
            p.rho,
            p.nu,
        )
    }

    /// Checks convexity of option prices in strike around `strike`, using a
    /// symmetric second difference of OTM Black prices. Put-call parity is
    /// linear in K, so mixing puts and calls does not change the result.
    fn check_butterfly_arbitrage_at_k(&self, strike: f64) -> Result<()> {
        domain_positive(strike, "strike")?;
        let h = 1e-3 * strike;
        let tolerance = 1e-12 * self.forward;

        let c_lo = self.otm_price(strike - h)?;
        let c_mid = self.otm_price(strike)?;
        let c_hi = self.otm_price(strike + h)?;
        // Parity correction when the three points straddle the forward
        let parity = |k: f64| if k < self.forward { self.forward - k } else { 0.0 };
        let second_diff = (c_lo + parity(strike - h)) - 2.0 * (c_mid + parity(strike))
            + (c_hi + parity(strike + h));

        if second_diff < -tolerance {
            Err(SurfaceError::Arbitrage {
                message: format!(
                    "butterfly spread is negative at K={strike:.6}: second difference {second_diff:.3e}"
                ),
            })
        } else {
            Ok(())
        }
    }
}
