pub mod config;
pub mod levenberg_marquardt;
pub mod pipeline;
pub mod types;

// Re-export the L-BFGS-B driver for callers that want to run it directly
pub use cmaes_lbfgsb::lbfgsb_optimize;
