//! Smile and surface assembly on top of the per-tenor calibration.

pub mod builder;
pub mod interp;
pub mod smile;

pub use builder::{SabrSurface, SurfaceBuild, SurfaceGrid, TenorFailure};
pub use smile::Smile;
