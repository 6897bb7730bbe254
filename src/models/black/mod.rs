// Undiscounted Black-76 prices on a forward. Only what the butterfly check
// needs: call and put values for a given implied vol.

use statrs::function::erf::erf;

fn norm_cdf(x: f64) -> f64 {
    // 0.5 * [1 + erf(x / sqrt(2))]
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Undiscounted Black-76 call on a forward.
pub fn black_call_price(forward: f64, strike: f64, expiry: f64, vol: f64) -> f64 {
    if expiry <= 0.0 || vol <= 0.0 {
        return (forward - strike).max(0.0);
    }
    let std_dev = vol * expiry.sqrt();
    let d1 = ((forward / strike).ln() + 0.5 * std_dev * std_dev) / std_dev;
    let d2 = d1 - std_dev;
    forward * norm_cdf(d1) - strike * norm_cdf(d2)
}

/// Undiscounted Black-76 put on a forward.
pub fn black_put_price(forward: f64, strike: f64, expiry: f64, vol: f64) -> f64 {
    // put-call parity on the forward
    black_call_price(forward, strike, expiry, vol) - forward + strike
}
