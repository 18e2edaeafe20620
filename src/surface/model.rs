//! Bivariate cubic arrival-time model.
//!
//! ```text
//! t(x, y) = c00 + c10·x + c01·y
//!         + c20·x² + c11·x·y + c02·y²
//!         + c30·x³ + c21·x²·y + c12·x·y² + c03·y³
//! ```
//!
//! Coefficients are stored in exactly that order.  Derivatives are closed
//! form, so gradient accuracy does not depend on the mesh resolution.
use ndarray::{Array2, Zip};

/// Free parameters of the cubic model.
pub const N_COEF: usize = 10;

/// `(i, j)` exponents of `x^i · y^j` for each coefficient slot.
pub const EXPONENTS: [(i32, i32); N_COEF] = [
    (0, 0),
    (1, 0),
    (0, 1),
    (2, 0),
    (1, 1),
    (0, 2),
    (3, 0),
    (2, 1),
    (1, 2),
    (0, 3),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cubic {
    c: [f64; N_COEF],
}

impl Cubic {
    pub fn new(c: [f64; N_COEF]) -> Self {
        Self { c }
    }

    pub fn coefficients(&self) -> &[f64; N_COEF] {
        &self.c
    }

    /// Monomials `x^i · y^j` in coefficient order.
    pub fn terms(x: f64, y: f64) -> [f64; N_COEF] {
        let (x2, y2) = (x * x, y * y);
        [1.0, x, y, x2, x * y, y2, x2 * x, x2 * y, x * y2, y2 * y]
    }

    pub fn eval(&self, x: f64, y: f64) -> f64 {
        Self::terms(x, y).iter().zip(&self.c).map(|(t, c)| t * c).sum()
    }

    /// `(∂t/∂x, ∂t/∂y)` at one point.
    pub fn gradient(&self, x: f64, y: f64) -> (f64, f64) {
        let [_, p10, p01, p20, p11, p02, p30, p21, p12, p03] = self.c;
        let gx = p10 + 2.0 * p20 * x + p11 * y + 3.0 * p30 * x * x + 2.0 * p21 * x * y + p12 * y * y;
        let gy = p01 + p11 * x + 2.0 * p02 * y + p21 * x * x + 2.0 * p12 * x * y + 3.0 * p03 * y * y;
        (gx, gy)
    }

    /// Evaluate on a coordinate mesh.
    pub fn eval_mesh(&self, xx: &Array2<f64>, yy: &Array2<f64>) -> Array2<f64> {
        Zip::from(xx).and(yy).map_collect(|&x, &y| self.eval(x, y))
    }

    /// Gradient components on a coordinate mesh.
    pub fn gradient_mesh(&self, xx: &Array2<f64>, yy: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let gx = Zip::from(xx).and(yy).map_collect(|&x, &y| self.gradient(x, y).0);
        let gy = Zip::from(xx).and(yy).map_collect(|&x, &y| self.gradient(x, y).1);
        (gx, gy)
    }

    /// Model rewritten for coordinates `x' = x · scale`.
    ///
    /// Used to move a fit done on grid-unit coordinates back to physical
    /// units: `c'_ij = c_ij / scale^(i+j)`.
    pub fn rescaled(&self, scale: f64) -> Cubic {
        let mut c = self.c;
        for (v, &(i, j)) in c.iter_mut().zip(EXPONENTS.iter()) {
            *v /= scale.powi(i + j);
        }
        Cubic { c }
    }
}
