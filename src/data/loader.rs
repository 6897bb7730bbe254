//! CSV ingestion of a tenor × strike vol table.
//!
//! The expected layout is one row per tenor: a tenor label column, one
//! column per strike (header = strike), and two named columns holding the
//! forward and the ATM vol. Columns are located by name, so reordering the
//! file does not change what is read.
//!
//! ```text
//! Tenor,1.00%,1.50%,...,7.00%,Forward,ATM Vol
//! 1Yr,54.76,43.75,...,29.06,3.1842,24.91
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::data::dataset::{Dataset, TenorQuotes};
use crate::data::quote::{normalize_cell, parse_tenor_label, CellUnit};
use crate::error::{Result, SurfaceError};

/// Column naming and unit conventions of an input table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DatasetSchema {
    /// Name of the tenor label column; `None` means the first column.
    pub tenor_column: Option<String>,
    /// Name of the forward rate column.
    pub forward_column: String,
    /// Name of the ATM vol column.
    pub atm_vol_column: String,
    /// How numbers written without a `%` sign are scaled.
    pub bare_unit: CellUnit,
}

impl Default for DatasetSchema {
    fn default() -> Self {
        Self {
            tenor_column: None,
            forward_column: "Forward".to_string(),
            atm_vol_column: "ATM Vol".to_string(),
            bare_unit: CellUnit::Decimal,
        }
    }
}

impl DatasetSchema {
    /// Schema for tables whose bare cells are written in percent points
    /// (`24.91` meaning 24.91%).
    pub fn percent_points() -> Self {
        Self {
            bare_unit: CellUnit::PercentPoints,
            ..Self::default()
        }
    }
}

fn find_column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| SurfaceError::validation(format!("column '{name}' not found in header")))
}

/// Parses a body cell; a bad cell poisons only its own tenor.
fn body_cell(record: &StringRecord, idx: usize, unit: CellUnit, tenor_label: &str) -> f64 {
    let raw = record.get(idx).unwrap_or("");
    match normalize_cell(raw, unit) {
        Ok(v) => v,
        Err(e) => {
            warn!(tenor = tenor_label, column = idx, error = %e, "unreadable cell");
            f64::NAN
        }
    }
}

/// Reads a dataset from any CSV source.
pub fn load_dataset_from_reader<R: Read>(reader: R, schema: &DatasetSchema) -> Result<Dataset> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let tenor_idx = match &schema.tenor_column {
        Some(name) => find_column(&headers, name)?,
        None => 0,
    };
    let forward_idx = find_column(&headers, &schema.forward_column)?;
    let atm_idx = find_column(&headers, &schema.atm_vol_column)?;
    if forward_idx == tenor_idx || atm_idx == tenor_idx || forward_idx == atm_idx {
        return Err(SurfaceError::validation(
            "tenor, forward and ATM vol columns must be distinct",
        ));
    }

    let mut strike_cols = Vec::new();
    let mut strikes = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        if idx == tenor_idx || idx == forward_idx || idx == atm_idx {
            continue;
        }
        let strike = normalize_cell(header, schema.bare_unit).map_err(|e| {
            SurfaceError::validation(format!("strike header '{header}' is not a number: {e}"))
        })?;
        strike_cols.push(idx);
        strikes.push(strike);
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let label = record.get(tenor_idx).unwrap_or("").trim().to_string();
        let tenor = parse_tenor_label(&label)?;
        let unit = schema.bare_unit;
        rows.push(TenorQuotes {
            tenor,
            forward: body_cell(&record, forward_idx, unit, &label),
            atm_vol: body_cell(&record, atm_idx, unit, &label),
            market_vols: strike_cols
                .iter()
                .map(|&idx| body_cell(&record, idx, unit, &label))
                .collect(),
        });
    }

    debug!(
        tenors = rows.len(),
        strikes = strikes.len(),
        "loaded vol table"
    );
    Dataset::new(strikes, rows)
}

/// Reads a dataset from a CSV file.
pub fn load_dataset<P: AsRef<Path>>(path: P, schema: &DatasetSchema) -> Result<Dataset> {
    let file = File::open(path)?;
    load_dataset_from_reader(file, schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const TABLE: &str = "\
Tenor,2.00%,3.00%,4.00%,5.00%,6.00%,Forward,ATM Vol
1Yr,32.00,24.50,20.00,18.30,18.60,4.00,20.00
2Yr,30.00,23.50,19.50,18.00,18.20,4.10,19.60
";

    #[test]
    fn reads_percent_table() {
        let ds = load_dataset_from_reader(TABLE.as_bytes(), &DatasetSchema::percent_points())
            .unwrap();
        assert_eq!(ds.tenors(), vec![1.0, 2.0]);
        let expected = [0.02, 0.03, 0.04, 0.05, 0.06];
        for (s, e) in ds.strikes().iter().zip(expected) {
            assert!((s - e).abs() < 1e-15);
        }
        let slice = ds.load_slice(1.0).unwrap();
        assert!((slice.forward() - 0.04).abs() < 1e-15);
        assert!((slice.atm_vol() - 0.20).abs() < 1e-15);
        assert!((slice.market_vols()[0] - 0.32).abs() < 1e-15);
    }

    #[test]
    fn columns_are_found_by_name() {
        let reordered = "\
ATM Vol,Tenor,Forward,0.02,0.03,0.04
0.2,1Y,0.04,0.3,0.22,0.2
";
        let schema = DatasetSchema {
            tenor_column: Some("tenor".into()),
            ..DatasetSchema::default()
        };
        let ds = load_dataset_from_reader(reordered.as_bytes(), &schema).unwrap();
        let slice = ds.load_slice(1.0).unwrap();
        assert_eq!(slice.strikes(), &[0.02, 0.03, 0.04]);
        assert_eq!(slice.market_vols(), &[0.3, 0.22, 0.2]);
        assert_eq!(slice.forward(), 0.04);
        assert_eq!(slice.atm_vol(), 0.2);
    }

    #[test]
    fn bad_cell_poisons_only_its_tenor() {
        let table = "\
Tenor,2%,3%,4%,Forward,ATM Vol
1Yr,30,22,20,4,20
2Yr,30,n/a,20,4,20
";
        let ds = load_dataset_from_reader(table.as_bytes(), &DatasetSchema::percent_points())
            .unwrap();
        assert!(ds.load_slice(1.0).is_ok());
        assert_eq!(ds.load_slice(2.0).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn missing_named_column_fails() {
        let table = "Tenor,2%,3%,4%,Fwd,ATM Vol\n1Yr,30,22,20,4,20\n";
        let err = load_dataset_from_reader(table.as_bytes(), &DatasetSchema::percent_points())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn bad_tenor_label_fails_the_load() {
        let table = "Tenor,2%,3%,4%,Forward,ATM Vol\nsoon,30,22,20,4,20\n";
        assert!(
            load_dataset_from_reader(table.as_bytes(), &DatasetSchema::percent_points()).is_err()
        );
    }
}
