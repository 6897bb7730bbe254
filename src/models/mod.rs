pub mod black;
pub mod sabr;

/// Common traits used by smile models
pub mod traits {
    use crate::error::Result;

    /// Single-expiry smile model: strike in, Black implied vol out.
    pub trait SmileModel {
        type Parameters;

        fn parameters(&self) -> &Self::Parameters;
        fn validate_params(&self) -> Result<()>;
        fn implied_vol(&self, strike: f64) -> Result<f64>;
        fn check_butterfly_arbitrage_at_k(&self, strike: f64) -> Result<()>;
    }
}

/// Grid helpers shared by the smile and surface code
pub mod utils {
    /// `n` evenly spaced points from `start` to `end` inclusive.
    pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
        match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (end - start) / (n - 1) as f64;
                (0..n)
                    .map(|i| {
                        if i == n - 1 {
                            end
                        } else {
                            start + step * i as f64
                        }
                    })
                    .collect()
            }
        }
    }

    /// Index-based axis on [0, 1] for `n` points, independent of the
    /// economic spacing of whatever the points label.
    pub fn unit_axis(n: usize) -> Vec<f64> {
        linspace(0.0, 1.0, n)
    }

}
