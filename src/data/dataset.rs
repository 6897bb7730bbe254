//! Typed market inputs: one strike grid shared by every tenor, and per-tenor
//! forward, ATM vol and market vols.
//!
//! A [`Dataset`] is built once by the caller and passed by reference into the
//! calibration entry points. It is never mutated after construction; every
//! accessor is read-only.

use crate::error::{Result, SurfaceError};
use crate::validate::{validate_positive, validate_strictly_increasing};

/// Tenors within this distance (in years) are treated as the same key.
pub const TENOR_TOLERANCE: f64 = 1e-9;

/// Whether two tenors denote the same key. Every tenor lookup and
/// de-duplication in the crate goes through this.
pub fn same_tenor(a: f64, b: f64) -> bool {
    (a - b).abs() <= TENOR_TOLERANCE
}

/// Smallest number of quotes a slice may carry. Three parameters need more
/// than two points.
pub const MIN_QUOTES: usize = 3;

/// Validated market data for a single tenor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarketSlice {
    expiry: f64,
    forward: f64,
    atm_vol: f64,
    strikes: Vec<f64>,
    market_vols: Vec<f64>,
}

impl MarketSlice {
    /// Creates a slice, rejecting malformed input before it can reach any
    /// numerical code.
    ///
    /// # Errors
    /// - `Validation` for non-positive expiry/forward/vols, mismatched
    ///   lengths or strikes that are not strictly increasing.
    /// - `Calibration` for fewer than [`MIN_QUOTES`] quotes.
    pub fn new(
        expiry: f64,
        forward: f64,
        atm_vol: f64,
        strikes: Vec<f64>,
        market_vols: Vec<f64>,
    ) -> Result<Self> {
        validate_positive(expiry, "expiry")?;
        validate_positive(forward, "forward")?;
        validate_positive(atm_vol, "atm_vol")?;

        if strikes.len() != market_vols.len() {
            return Err(SurfaceError::validation(format!(
                "strikes ({}) and market vols ({}) differ in length",
                strikes.len(),
                market_vols.len()
            )));
        }
        if strikes.len() < MIN_QUOTES {
            return Err(SurfaceError::calibration(
                format!(
                    "slice at expiry {expiry} has {} quotes, at least {MIN_QUOTES} are needed",
                    strikes.len()
                ),
                None,
            ));
        }
        for &strike in &strikes {
            validate_positive(strike, "strike")?;
        }
        validate_strictly_increasing(&strikes, "strikes")?;
        for &vol in &market_vols {
            validate_positive(vol, "market vol")?;
        }

        Ok(Self {
            expiry,
            forward,
            atm_vol,
            strikes,
            market_vols,
        })
    }

    pub fn expiry(&self) -> f64 {
        self.expiry
    }

    pub fn forward(&self) -> f64 {
        self.forward
    }

    pub fn atm_vol(&self) -> f64 {
        self.atm_vol
    }

    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    pub fn market_vols(&self) -> &[f64] {
        &self.market_vols
    }

    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }
}

/// Raw, already-normalized quotes for one tenor. Values are decimals; they
/// are only checked when the row is turned into a [`MarketSlice`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TenorQuotes {
    pub tenor: f64,
    pub forward: f64,
    pub atm_vol: f64,
    pub market_vols: Vec<f64>,
}

/// A tenor × strike table of market vols.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dataset {
    strikes: Vec<f64>,
    rows: Vec<TenorQuotes>,
}

impl Dataset {
    /// Builds a dataset from a shared strike grid and per-tenor rows.
    ///
    /// Rows are sorted by tenor. Only dataset-wide problems fail here
    /// (duplicate or non-positive tenors); per-tenor problems surface from
    /// [`Dataset::load_slice`] so that one bad row cannot sink the others.
    pub fn new(strikes: Vec<f64>, mut rows: Vec<TenorQuotes>) -> Result<Self> {
        for row in &rows {
            validate_positive(row.tenor, "tenor")?;
        }
        rows.sort_by(|a, b| a.tenor.total_cmp(&b.tenor));
        for pair in rows.windows(2) {
            if same_tenor(pair[1].tenor, pair[0].tenor) {
                return Err(SurfaceError::validation(format!(
                    "duplicate tenor {}",
                    pair[0].tenor
                )));
            }
        }
        Ok(Self { strikes, rows })
    }

    /// Strike grid shared by every tenor.
    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    /// Tenors present in the dataset, ascending.
    pub fn tenors(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.tenor).collect()
    }

    /// Raw quotes for a tenor, if present.
    pub fn quotes(&self, tenor: f64) -> Option<&TenorQuotes> {
        self.rows
            .iter()
            .find(|r| same_tenor(r.tenor, tenor))
    }

    /// Returns the validated slice for `tenor`.
    ///
    /// # Errors
    /// `Validation` if the tenor is absent or the row is malformed,
    /// `Calibration` if the row has too few quotes.
    pub fn load_slice(&self, tenor: f64) -> Result<MarketSlice> {
        let row = self
            .quotes(tenor)
            .ok_or_else(|| SurfaceError::validation(format!("tenor {tenor} not in dataset")))?;
        MarketSlice::new(
            row.tenor,
            row.forward,
            row.atm_vol,
            self.strikes.clone(),
            row.market_vols.clone(),
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn strikes() -> Vec<f64> {
        vec![0.02, 0.03, 0.04, 0.05, 0.06]
    }

    fn row(tenor: f64) -> TenorQuotes {
        TenorQuotes {
            tenor,
            forward: 0.04,
            atm_vol: 0.20,
            market_vols: vec![0.32, 0.245, 0.20, 0.183, 0.186],
        }
    }

    #[test]
    fn load_slice_returns_validated_slice() {
        let ds = Dataset::new(strikes(), vec![row(2.0), row(1.0)]).unwrap();
        assert_eq!(ds.tenors(), vec![1.0, 2.0]);
        let slice = ds.load_slice(1.0).unwrap();
        assert_eq!(slice.expiry(), 1.0);
        assert_eq!(slice.forward(), 0.04);
        assert_eq!(slice.len(), 5);
        assert_eq!(slice.market_vols()[2], 0.20);
    }

    #[test]
    fn missing_tenor_is_a_validation_error() {
        let ds = Dataset::new(strikes(), vec![row(1.0)]).unwrap();
        let err = ds.load_slice(3.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn non_monotonic_strikes_fail_at_load() {
        let ds = Dataset::new(vec![0.02, 0.04, 0.03, 0.05, 0.06], vec![row(1.0)]).unwrap();
        let err = ds.load_slice(1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn two_quotes_are_a_calibration_error() {
        let err = MarketSlice::new(1.0, 0.04, 0.2, vec![0.03, 0.05], vec![0.22, 0.19]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Calibration);
    }

    #[test]
    fn bad_values_are_rejected() {
        let s = strikes();
        let v = vec![0.32, 0.245, 0.20, 0.183, 0.186];
        assert!(MarketSlice::new(1.0, 0.0, 0.2, s.clone(), v.clone()).is_err());
        assert!(MarketSlice::new(0.0, 0.04, 0.2, s.clone(), v.clone()).is_err());
        assert!(MarketSlice::new(1.0, 0.04, -0.2, s.clone(), v.clone()).is_err());
        let mut bad = v.clone();
        bad[1] = f64::NAN;
        assert!(MarketSlice::new(1.0, 0.04, 0.2, s.clone(), bad).is_err());
        let err = MarketSlice::new(1.0, 0.04, 0.2, s, v[..4].to_vec()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn duplicate_tenors_are_rejected() {
        assert!(Dataset::new(strikes(), vec![row(1.0), row(1.0)]).is_err());
        assert!(Dataset::new(strikes(), vec![row(1.0), row(1.0 + 0.5e-9)]).is_err());
    }

    #[test]
    fn tenor_keys_match_within_tolerance() {
        assert!(same_tenor(2.0, 2.0));
        assert!(same_tenor(0.5, 0.5 + 0.5 * TENOR_TOLERANCE));
        assert!(!same_tenor(0.5, 0.5 + 2.0 * TENOR_TOLERANCE));

        let ds = Dataset::new(strikes(), vec![row(1.0)]).unwrap();
        assert!(ds.quotes(1.0 - 0.5e-9).is_some());
        assert!(ds.quotes(1.0 + 2e-9).is_none());
        assert!(ds.load_slice(1.0 + 0.5e-9).is_ok());
    }
}
