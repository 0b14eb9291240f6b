//! Ordinary least squares with rank detection.
//!
//! Solves `min ||y - Xβ||` through a Householder QR factorisation of the
//! design matrix. Each column is checked against the span of the columns
//! before it, so singular designs are reported instead of producing
//! arbitrary coefficients.

use crate::RegressionError;
use ndarray::{Array1, Array2, Axis, Slice};

/// Default relative tolerance below which a column counts as collinear.
pub const DEFAULT_RANK_TOLERANCE: f64 = 1e-10;

/// Result of a least squares fit.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Estimated coefficients, one per design column
    pub coefficients: Array1<f64>,
    /// `y - Xβ`, one per observation
    pub residuals: Array1<f64>,
}

/// Fit `y` on the columns of `x` without an implicit intercept.
///
/// A column is collinear when the part of it orthogonal to the preceding
/// columns has norm at most `tolerance` times its own norm.
///
/// # Errors
///
/// Returns [`RegressionError`] when the design has fewer rows than columns,
/// a collinear column, or a row count that disagrees with `y`.
pub fn fit(x: &Array2<f64>, y: &Array1<f64>, tolerance: f64) -> Result<OlsFit, RegressionError> {
    let (n, p) = x.dim();
    if n != y.len() {
        return Err(RegressionError::DimensionMismatch {
            rows: n,
            len: y.len(),
        });
    }
    if n < p {
        return Err(RegressionError::Underdetermined {
            observations: n,
            regressors: p,
        });
    }

    let mut r = x.clone();
    let mut qty = y.clone();

    for j in 0..p {
        let column_norm = x.column(j).dot(&x.column(j)).sqrt();
        let tail = r
            .column(j)
            .slice_axis(Axis(0), Slice::from(j..))
            .to_owned();
        let tail_norm = tail.dot(&tail).sqrt();

        if column_norm == 0.0 || tail_norm <= tolerance * column_norm {
            return Err(RegressionError::RankDeficient {
                column: j,
                columns: p,
            });
        }

        // Reflect the tail of column j onto -sign(r_jj) * e_1
        let alpha = if tail[0] > 0.0 { -tail_norm } else { tail_norm };
        let mut v = tail;
        v[0] -= alpha;
        let v_norm_sq = v.dot(&v);

        if v_norm_sq > 0.0 {
            for k in j..p {
                let rows = Slice::from(j..);
                let scale = 2.0 * v.dot(&r.column(k).slice_axis(Axis(0), rows)) / v_norm_sq;
                r.column_mut(k)
                    .slice_axis_mut(Axis(0), rows)
                    .scaled_add(-scale, &v);
            }
            let rows = Slice::from(j..);
            let scale = 2.0 * v.dot(&qty.slice_axis(Axis(0), rows)) / v_norm_sq;
            qty.slice_axis_mut(Axis(0), rows).scaled_add(-scale, &v);
        }
    }

    // Back-substitution on the upper triangle
    let mut coefficients = Array1::<f64>::zeros(p);
    for i in (0..p).rev() {
        let tail: f64 = ((i + 1)..p).map(|k| r[[i, k]] * coefficients[k]).sum();
        coefficients[i] = (qty[i] - tail) / r[[i, i]];
    }

    let residuals = y - &x.dot(&coefficients);

    Ok(OlsFit {
        coefficients,
        residuals,
    })
}
