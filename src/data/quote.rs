//! Parsing of raw table cells into decimal values.
//!
//! Market tables mix plain decimals (`0.035`), percentage text (`3.5%`) and,
//! in some feeds, bare percent points (`3.5`). A cell is turned into a
//! decimal exactly once, at ingestion: [`normalize_cell`] consumes the raw
//! text and only ever returns a plain `f64`, so there is nothing left to
//! normalize a second time.

use crate::error::{Result, SurfaceError};

/// How a number written without a `%` sign should be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellUnit {
    /// `0.035` means 3.5%.
    #[default]
    Decimal,
    /// `3.5` means 3.5%.
    PercentPoints,
}

/// A parsed cell before unit conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quote {
    /// Text carried an explicit percent sign, e.g. `"3.5%"`.
    Percent(f64),
    /// Text was a bare number.
    Plain(f64),
}

impl Quote {
    /// Parses a cell. Surrounding whitespace is ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SurfaceError::validation("empty cell"));
        }
        let (number, percent) = match trimmed.strip_suffix('%') {
            Some(stripped) => (stripped.trim_end(), true),
            None => (trimmed, false),
        };
        let value: f64 = number
            .parse()
            .map_err(|_| SurfaceError::validation(format!("cannot parse cell '{trimmed}'")))?;
        if !value.is_finite() {
            return Err(SurfaceError::validation(format!(
                "cell '{trimmed}' is not finite"
            )));
        }
        Ok(if percent {
            Quote::Percent(value)
        } else {
            Quote::Plain(value)
        })
    }

    /// Converts to a decimal fraction.
    pub fn to_decimal(self, bare_unit: CellUnit) -> f64 {
        match (self, bare_unit) {
            (Quote::Percent(v), _) => v / 100.0,
            (Quote::Plain(v), CellUnit::Decimal) => v,
            (Quote::Plain(v), CellUnit::PercentPoints) => v / 100.0,
        }
    }
}

/// Parses a raw cell and returns its decimal value.
pub fn normalize_cell(text: &str, bare_unit: CellUnit) -> Result<f64> {
    Ok(Quote::parse(text)?.to_decimal(bare_unit))
}

/// Converts a tenor label such as `1Yr`, `10Y`, `18M`, `2W`, `30D` or `2.5`
/// into a year fraction.
pub fn parse_tenor_label(label: &str) -> Result<f64> {
    let trimmed = label.trim();
    let lower = trimmed.to_ascii_lowercase();
    let split = lower
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(lower.len());
    let (number, suffix) = lower.split_at(split);
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| SurfaceError::validation(format!("cannot parse tenor label '{trimmed}'")))?;

    let years_per_unit = match suffix.trim() {
        "" | "y" | "yr" | "yrs" | "year" | "years" => 1.0,
        "m" | "mo" | "mth" | "month" | "months" => 1.0 / 12.0,
        "w" | "wk" | "week" | "weeks" => 1.0 / 52.0,
        "d" | "day" | "days" => 1.0 / 365.0,
        other => {
            return Err(SurfaceError::validation(format!(
                "unknown tenor unit '{other}' in '{trimmed}'"
            )))
        }
    };

    let years = value * years_per_unit;
    if !years.is_finite() || years <= 0.0 {
        return Err(SurfaceError::validation(format!(
            "tenor '{trimmed}' must be a positive duration"
        )));
    }
    Ok(years)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_text_is_divided_once() {
        assert!((normalize_cell("3.5%", CellUnit::Decimal).unwrap() - 0.035).abs() < 1e-15);
        // The sign wins over the bare-number convention.
        assert!((normalize_cell("3.5%", CellUnit::PercentPoints).unwrap() - 0.035).abs() < 1e-15);
        assert!((normalize_cell(" 12.25 % ", CellUnit::Decimal).unwrap() - 0.1225).abs() < 1e-15);
    }

    #[test]
    fn decimal_input_is_a_no_op() {
        for raw in ["0.035", "0.2", "1.5", "0"] {
            let parsed: f64 = raw.parse().unwrap();
            assert_eq!(normalize_cell(raw, CellUnit::Decimal).unwrap(), parsed);
        }
    }

    #[test]
    fn percent_points_are_scaled() {
        assert!((normalize_cell("24.91", CellUnit::PercentPoints).unwrap() - 0.2491).abs() < 1e-15);
    }

    #[test]
    fn rejects_garbage_cells() {
        assert!(Quote::parse("").is_err());
        assert!(Quote::parse("   ").is_err());
        assert!(Quote::parse("abc%").is_err());
        assert!(Quote::parse("%").is_err());
        assert!(Quote::parse("inf").is_err());
    }

    #[test]
    fn tenor_labels() {
        assert_eq!(parse_tenor_label("1Yr").unwrap(), 1.0);
        assert_eq!(parse_tenor_label("30Yr").unwrap(), 30.0);
        assert_eq!(parse_tenor_label("10Y").unwrap(), 10.0);
        assert_eq!(parse_tenor_label("2.5").unwrap(), 2.5);
        assert!((parse_tenor_label("18M").unwrap() - 1.5).abs() < 1e-12);
        assert!((parse_tenor_label("30d").unwrap() - 30.0 / 365.0).abs() < 1e-12);
        assert!(parse_tenor_label("Yr").is_err());
        assert!(parse_tenor_label("5Q").is_err());
        assert!(parse_tenor_label("0Y").is_err());
    }
}
