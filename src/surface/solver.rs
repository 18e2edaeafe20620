//! Per-beat cubic surface fit.
//!
//! The cubic model is linear in its coefficients, so the least-squares
//! optimum is reached by one QR solve rather than an iterative search.  The
//! fit runs on grid-unit coordinates (`x / spacing`) with the beat's mean
//! arrival removed, and the coefficients are mapped back to physical units
//! afterwards.
use log::{debug, warn};
use ndarray::{Array1, Array2};
use once_cell::sync::OnceCell;

use crate::electrode::{ChannelId, ElectrodeGrid};
use crate::error::{MeaError, Result};
use crate::surface::lstsq::lstsq;
use crate::surface::model::{Cubic, N_COEF};

/// A fitted activation-time surface for one beat.
///
/// Coefficients are in seconds per μm^k.  [`FittedSurface::surface`] is the
/// dense `mesh_num × mesh_num` evaluation in milliseconds with the earliest
/// activation at zero; it is computed on first use and cached.
#[derive(Debug, Clone)]
pub struct FittedSurface {
    model: Cubic,
    r2: f64,
    degenerate: bool,
    n_samples: usize,
    grid: ElectrodeGrid,
    mesh_num: usize,
    surface: OnceCell<Array2<f64>>,
}

impl FittedSurface {
    /// Fit one beat.
    ///
    /// `channels[k]` recorded arrival `times[k]` (seconds).  Needs at least
    /// [`N_COEF`] electrodes spread over enough rows and columns to pin down
    /// a cubic.
    pub fn fit(
        grid: &ElectrodeGrid,
        channels: &[ChannelId],
        times: &[f64],
        mesh_num: usize,
    ) -> Result<FittedSurface> {
        if channels.len() != times.len() {
            return Err(MeaError::ShapeMismatch {
                what: "arrival times",
                expected: channels.len(),
                actual: times.len(),
            });
        }
        if mesh_num < 2 {
            return Err(MeaError::InvalidParameter(format!(
                "mesh_num must be at least 2, got {mesh_num}"
            )));
        }
        let n = times.len();
        if n < N_COEF {
            return Err(MeaError::insufficient(n));
        }
        if times.iter().any(|t| !t.is_finite()) {
            return Err(MeaError::InvalidParameter("arrival times must be finite".into()));
        }

        let d = grid.spacing();
        let mean = times.iter().sum::<f64>() / n as f64;
        let centred = Array1::from_iter(times.iter().map(|t| t - mean));

        let mut design = Array2::<f64>::zeros((n, N_COEF));
        for (k, &ch) in channels.iter().enumerate() {
            let (x, y) = grid.position(ch);
            let terms = Cubic::terms(x / d, y / d);
            for (j, v) in terms.into_iter().enumerate() {
                design[[k, j]] = v;
            }
        }

        let w = lstsq(&design, &centred)?;
        let fitted = design.dot(&w);
        let rss: f64 = centred.iter().zip(fitted.iter()).map(|(t, f)| (t - f).powi(2)).sum();
        let tss: f64 = centred.iter().map(|t| t * t).sum();

        let scale = times.iter().fold(0.0_f64, |m, t| m.max(t.abs()));
        let degenerate = tss <= n as f64 * (16.0 * f64::EPSILON * scale).powi(2);
        let r2 = if degenerate {
            warn!("arrival times are simultaneous on all {n} electrodes; reporting R² = 1");
            1.0
        } else {
            1.0 - rss / tss
        };

        // A flat beat keeps a flat model, so its gradient is exactly zero.
        let mut c = [0.0; N_COEF];
        if !degenerate {
            for (dst, &src) in c.iter_mut().zip(w.iter()) {
                *dst = src;
            }
        }
        c[0] += mean;
        let model = Cubic::new(c).rescaled(d);

        debug!("surface fit: {n} electrodes, R² = {r2:.6}, rss = {rss:.3e}");

        Ok(FittedSurface {
            model,
            r2,
            degenerate,
            n_samples: n,
            grid: *grid,
            mesh_num,
            surface: OnceCell::new(),
        })
    }

    pub fn model(&self) -> &Cubic {
        &self.model
    }

    /// The 10 coefficients `c00 c10 c01 c20 c11 c02 c30 c21 c12 c03`.
    pub fn coefficients(&self) -> &[f64; N_COEF] {
        self.model.coefficients()
    }

    /// Coefficient of determination at the fit points.
    pub fn r2(&self) -> f64 {
        self.r2
    }

    /// `true` when all arrivals were simultaneous and R² was set by convention.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn grid(&self) -> &ElectrodeGrid {
        &self.grid
    }

    pub fn mesh_num(&self) -> usize {
        self.mesh_num
    }

    /// The output mesh `(XX, YY)`.
    pub fn mesh(&self) -> (Array2<f64>, Array2<f64>) {
        self.grid.mesh(self.mesh_num)
    }

    /// Raw model value (seconds) at a point.
    pub fn arrival(&self, x: f64, y: f64) -> f64 {
        self.model.eval(x, y)
    }

    /// Dense activation map in ms, earliest activation at 0.
    pub fn surface(&self) -> &Array2<f64> {
        self.surface.get_or_init(|| {
            let (xx, yy) = self.mesh();
            let mut z = self.model.eval_mesh(&xx, &yy);
            let min = z.iter().copied().fold(f64::INFINITY, f64::min);
            z.mapv_inplace(|v| (v - min) * 1000.0);
            z
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ElectrodeGrid {
        ElectrodeGrid::new(450.0).unwrap()
    }

    fn all_channels() -> Vec<ChannelId> {
        ChannelId::all().collect()
    }

    #[test]
    fn too_few_electrodes() {
        let ch: Vec<ChannelId> = all_channels().into_iter().take(9).collect();
        let err = FittedSurface::fit(&grid(), &ch, &[0.0; 9], 10).unwrap_err();
        assert!(matches!(err, MeaError::InsufficientData { samples: 9, required: 10 }));
    }

    #[test]
    fn single_row_is_rank_deficient() {
        // Channels 1..=8 share one y; 9..=10 add a second row; still not
        // enough to resolve y² and y³.
        let ch: Vec<ChannelId> = all_channels().into_iter().take(10).collect();
        let t: Vec<f64> = (0..10).map(|i| i as f64 * 1e-3).collect();
        let err = FittedSurface::fit(&grid(), &ch, &t, 10).unwrap_err();
        assert!(matches!(err, MeaError::RankDeficient));
    }

    #[test]
    fn planar_wave_fits_exactly() {
        let g = grid();
        let ch = all_channels();
        // 0.2 m/s along +x → 5 μs per μm.
        let t: Vec<f64> = ch.iter().map(|&c| 1.0 + g.position(c).0 * 5e-6).collect();
        let fit = FittedSurface::fit(&g, &ch, &t, 20).unwrap();
        approx::assert_abs_diff_eq!(fit.r2(), 1.0, epsilon = 1e-9);
        assert!(!fit.is_degenerate());
        approx::assert_relative_eq!(fit.coefficients()[1], 5e-6, max_relative = 1e-8);
        approx::assert_abs_diff_eq!(fit.coefficients()[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn surface_is_zeroed_and_in_ms() {
        let g = grid();
        let ch = all_channels();
        let t: Vec<f64> = ch.iter().map(|&c| 2.0 + g.position(c).0 * 5e-6).collect();
        let fit = FittedSurface::fit(&g, &ch, &t, 8).unwrap();
        let z = fit.surface();
        assert_eq!(z.dim(), (8, 8));
        let min = z.iter().copied().fold(f64::INFINITY, f64::min);
        let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        approx::assert_abs_diff_eq!(min, 0.0, epsilon = 1e-9);
        // 3150 μm × 5 μs/μm = 15.75 ms.
        approx::assert_abs_diff_eq!(max, 15.75, epsilon = 1e-6);
        // Cached: same allocation on the second call.
        assert!(std::ptr::eq(z, fit.surface()));
    }

    #[test]
    fn simultaneous_arrivals_are_flagged_not_fatal() {
        let ch = all_channels();
        let fit = FittedSurface::fit(&grid(), &ch, &[0.37; 64], 10).unwrap();
        assert!(fit.is_degenerate());
        assert_eq!(fit.r2(), 1.0);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let ch = all_channels();
        let err = FittedSurface::fit(&grid(), &ch, &[0.0; 10], 10).unwrap_err();
        assert!(matches!(err, MeaError::ShapeMismatch { .. }));
    }
}
