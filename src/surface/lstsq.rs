//! Dense linear least squares via Householder QR.
//!
//! Solves `min ‖A·w − b‖₂` for a tall design matrix.  Columns are scaled to
//! unit norm before factorisation, so the rank test is a plain threshold on
//! the remaining column norm.  No pivoting and no random start: the result
//! is a pure function of `(A, b)`.
use ndarray::{s, Array1, Array2};

use crate::error::{MeaError, Result};

/// Relative column norm below which a column is treated as dependent.
const RANK_TOL: f64 = 1e-10;

/// Least-squares solution of `a · w ≈ b`.
pub fn lstsq(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let (m, n) = a.dim();
    if m < n {
        return Err(MeaError::insufficient(m));
    }
    debug_assert_eq!(b.len(), m);

    // Column equilibration.
    let mut scale = Array1::<f64>::zeros(n);
    let mut r = a.to_owned();
    for (j, mut col) in r.columns_mut().into_iter().enumerate() {
        let norm = col.dot(&col).sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(MeaError::RankDeficient);
        }
        col /= norm;
        scale[j] = norm;
    }
    let mut qtb = b.to_owned();

    for k in 0..n {
        let x = r.slice(s![k.., k]).to_owned();
        let norm = x.dot(&x).sqrt();
        if norm < RANK_TOL {
            return Err(MeaError::RankDeficient);
        }
        let alpha = if x[0] > 0.0 { -norm } else { norm };
        let mut v = x;
        v[0] -= alpha;
        let vv = v.dot(&v);
        if vv == 0.0 {
            continue;
        }
        for j in k..n {
            let f = 2.0 * v.dot(&r.slice(s![k.., j])) / vv;
            r.slice_mut(s![k.., j]).scaled_add(-f, &v);
        }
        let f = 2.0 * v.dot(&qtb.slice(s![k..])) / vv;
        qtb.slice_mut(s![k..]).scaled_add(-f, &v);
    }

    // Back substitution on the upper triangle.
    let mut w = Array1::<f64>::zeros(n);
    for k in (0..n).rev() {
        let mut acc = qtb[k];
        for j in k + 1..n {
            acc -= r[[k, j]] * w[j];
        }
        w[k] = acc / r[[k, k]];
    }

    Ok(w / &scale)
}
