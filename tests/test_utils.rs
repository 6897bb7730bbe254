#![allow(dead_code)] // Each test binary uses a different subset

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sabr_surface::{load_dataset, Dataset, DatasetSchema, MarketSlice, OptimizationConfig};

/// Path of the 15-tenor fixture table, relative to the crate root
pub const BLACK_VOL_CSV: &str = "tests/data/black_vol.csv";

/// Load the fixture vol table (percent-point cells)
pub fn load_test_dataset() -> Dataset {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(BLACK_VOL_CSV);
    load_dataset(path, &DatasetSchema::percent_points()).expect("Failed to load test data")
}

/// The reference single-expiry smile: F = 4%, ATM 20%, negative skew
pub fn scenario_slice() -> MarketSlice {
    MarketSlice::new(
        1.0,
        0.04,
        0.20,
        vec![0.02, 0.03, 0.04, 0.05, 0.06],
        vec![0.32, 0.245, 0.20, 0.183, 0.186],
    )
    .expect("scenario slice is valid")
}

/// Create default test configuration
pub fn create_test_config() -> OptimizationConfig {
    OptimizationConfig::production()
}

/// Test configuration that fits tenors one after another
pub fn create_sequential_test_config() -> OptimizationConfig {
    OptimizationConfig {
        parallel: false,
        ..OptimizationConfig::production()
    }
}

/// Deterministic RNG for randomized property checks
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Random valid SABR parameters `(alpha, beta, rho, nu)` inside the default box
pub fn random_params(rng: &mut StdRng) -> (f64, f64, f64, f64) {
    (
        rng.gen_range(0.005..1.0),
        rng.gen_range(0.0..=1.0),
        rng.gen_range(-0.999..0.999),
        rng.gen_range(0.0..5.0),
    )
}
