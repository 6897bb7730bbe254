//! Point lookups inside a fitted [`SurfaceGrid`].
//!
//! Within a row vols are linear in strike. Between rows the interpolation is
//! linear in total variance `w = σ²T`, which keeps `w` non-decreasing in `T`
//! whenever the rows themselves are.

use crate::error::{Result, SurfaceError};
use crate::surface::builder::SurfaceGrid;

/// Index `i` with `xs[i] <= x <= xs[i + 1]` and the weight of `xs[i + 1]`.
/// `xs` must be ascending and `x` inside `[xs[0], xs[last]]`.
fn bracket(xs: &[f64], x: f64) -> (usize, f64) {
    if xs.len() < 2 {
        return (0, 0.0);
    }
    let upper = xs.partition_point(|&v| v < x).clamp(1, xs.len() - 1);
    let (x0, x1) = (xs[upper - 1], xs[upper]);
    (upper - 1, (x - x0) / (x1 - x0))
}

fn lerp_at(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let (i, w) = bracket(xs, x);
    if w == 0.0 {
        ys[i]
    } else {
        ys[i] + w * (ys[i + 1] - ys[i])
    }
}

fn check_inside(value: f64, axis: &[f64], name: &str) -> Result<()> {
    match (axis.first(), axis.last()) {
        (Some(&lo), Some(&hi)) if value >= lo && value <= hi => Ok(()),
        (Some(&lo), Some(&hi)) => Err(SurfaceError::validation(format!(
            "{name} {value} is outside the grid range [{lo}, {hi}]"
        ))),
        _ => Err(SurfaceError::validation(format!(
            "surface grid has no {name} axis"
        ))),
    }
}

impl SurfaceGrid {
    /// Interpolated vol at `(tenor, strike)`.
    ///
    /// # Errors
    /// [`SurfaceError::Validation`] if the grid is empty or the point lies
    /// outside its tenor or strike range; no extrapolation is done.
    pub fn vol_at(&self, tenor: f64, strike: f64) -> Result<f64> {
        check_inside(tenor, &self.tenors, "tenor")?;
        check_inside(strike, &self.strikes, "strike")?;

        let (i, w) = bracket(&self.tenors, tenor);
        let vol_lo = lerp_at(&self.strikes, &self.vol_matrix[i], strike);
        if w == 0.0 {
            return Ok(vol_lo);
        }
        let vol_hi = lerp_at(&self.strikes, &self.vol_matrix[i + 1], strike);

        let (t0, t1) = (self.tenors[i], self.tenors[i + 1]);
        let w0 = vol_lo * vol_lo * t0;
        let w1 = vol_hi * vol_hi * t1;
        let total_variance = w0 + w * (w1 - w0);
        Ok((total_variance.max(0.0) / tenor).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn grid() -> SurfaceGrid {
        SurfaceGrid {
            tenors: vec![1.0, 2.0],
            strikes: vec![0.02, 0.04, 0.06],
            vol_matrix: vec![vec![0.30, 0.20, 0.25], vec![0.20, 0.10, 0.15]],
            normalized_tenor_axis: vec![0.0, 1.0],
            normalized_strike_axis: vec![0.0, 0.5, 1.0],
            params: Vec::new(),
            converged: vec![true, true],
        }
    }

    #[test]
    fn reproduces_nodes() {
        let g = grid();
        for (i, &t) in g.tenors.iter().enumerate() {
            for (j, &k) in g.strikes.iter().enumerate() {
                assert!((g.vol_at(t, k).unwrap() - g.vol_matrix[i][j]).abs() < 1e-15);
            }
        }
    }

    #[test]
    fn linear_in_strike_within_a_row() {
        let g = grid();
        assert!((g.vol_at(1.0, 0.03).unwrap() - 0.25).abs() < 1e-15);
        assert!((g.vol_at(1.0, 0.05).unwrap() - 0.225).abs() < 1e-15);
    }

    #[test]
    fn linear_in_total_variance_across_tenors() {
        let g = grid();
        // w(1) = 0.04, w(2) = 0.02 at K = 0.04; halfway w = 0.03 at T = 1.5
        let v = g.vol_at(1.5, 0.04).unwrap();
        assert!((v - (0.03_f64 / 1.5).sqrt()).abs() < 1e-15);
    }

    #[test]
    fn outside_the_grid_is_rejected() {
        let g = grid();
        assert_eq!(g.vol_at(0.5, 0.04).unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(g.vol_at(1.5, 0.07).unwrap_err().kind(), ErrorKind::Validation);
        let empty = SurfaceGrid {
            tenors: Vec::new(),
            vol_matrix: Vec::new(),
            normalized_tenor_axis: Vec::new(),
            converged: Vec::new(),
            ..grid()
        };
        assert!(empty.vol_at(1.0, 0.04).is_err());
    }

    #[test]
    fn single_row_grid_interpolates_in_strike() {
        let g = SurfaceGrid {
            tenors: vec![1.0],
            vol_matrix: vec![vec![0.30, 0.20, 0.25]],
            normalized_tenor_axis: vec![0.0],
            converged: vec![true],
            ..grid()
        };
        assert!((g.vol_at(1.0, 0.03).unwrap() - 0.25).abs() < 1e-15);
    }
}
