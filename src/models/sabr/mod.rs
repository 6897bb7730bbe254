pub mod sabr_calibrator;
pub mod sabr_model;

pub use sabr_calibrator::{SABRModelCalibrator, SABRParamBounds};
pub use sabr_model::{alpha_from_atm_vol, implied_vol, SABRParams, SabrSlice};
