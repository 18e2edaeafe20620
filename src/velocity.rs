//! Conduction-velocity fields from a fitted activation surface.
//!
//! With arrival time `t(x, y)` the local wavefront speed is `1 / |∇t|` and
//! the propagation direction is `∇t / |∇t|`.  The velocity vector is their
//! product, `∇t / |∇t|²`.
//!
//! Units: coefficients are seconds and micrometres, so `|∇t|` is s/μm and
//! `1 / |∇t|` is μm/s; [`UM_PER_S_TO_M_PER_S`] brings the speed to m/s.
//!
//! Where the gradient vanishes every derived quantity is `NaN` (0/0).  That
//! is an expected output, not an error.
use ndarray::{Array2, Zip};

use crate::surface::FittedSurface;

/// μm/s → m/s.
pub const UM_PER_S_TO_M_PER_S: f64 = 1e-6;

/// Gradient and velocity of one beat evaluated on a mesh.
#[derive(Debug, Clone)]
pub struct VelocityField {
    xx: Array2<f64>,
    yy: Array2<f64>,
    grad_x: Array2<f64>,
    grad_y: Array2<f64>,
    dir_x: Array2<f64>,
    dir_y: Array2<f64>,
    vx: Array2<f64>,
    vy: Array2<f64>,
    speed: Array2<f64>,
}

impl VelocityField {
    /// Evaluate on the surface's own `mesh_num × mesh_num` mesh.
    pub fn from_surface(surface: &FittedSurface) -> Self {
        let (xx, yy) = surface.mesh();
        Self::on_mesh(surface, xx, yy)
    }

    /// Evaluate at the 8×8 electrode positions (for quiver plots).
    pub fn at_electrodes(surface: &FittedSurface) -> Self {
        let (xx, yy) = surface.grid().electrode_mesh();
        Self::on_mesh(surface, xx, yy)
    }

    /// Evaluate on an arbitrary mesh of equal-shaped `xx`, `yy` (μm).
    pub fn on_mesh(surface: &FittedSurface, xx: Array2<f64>, yy: Array2<f64>) -> Self {
        let (grad_x, grad_y) = surface.model().gradient_mesh(&xx, &yy);

        let (mut dir_x, mut dir_y) = (Array2::zeros(xx.dim()), Array2::zeros(xx.dim()));
        let (mut vx, mut vy) = (Array2::zeros(xx.dim()), Array2::zeros(xx.dim()));
        let mut speed = Array2::zeros(xx.dim());

        Zip::from(&grad_x)
            .and(&grad_y)
            .and(&mut dir_x)
            .and(&mut dir_y)
            .and(&mut vx)
            .and(&mut vy)
            .for_each(|&gx, &gy, dx, dy, vx, vy| {
                let norm2 = gx * gx + gy * gy;
                let norm = norm2.sqrt();
                *dx = gx / norm;
                *dy = gy / norm;
                *vx = gx / norm2;
                *vy = gy / norm2;
            });
        Zip::from(&mut speed).and(&vx).and(&vy).for_each(|s, &vx, &vy| {
            *s = (vx * vx + vy * vy).sqrt() * UM_PER_S_TO_M_PER_S;
        });

        Self { xx, yy, grad_x, grad_y, dir_x, dir_y, vx, vy, speed }
    }

    pub fn mesh(&self) -> (&Array2<f64>, &Array2<f64>) {
        (&self.xx, &self.yy)
    }

    /// `(∂t/∂x, ∂t/∂y)` in s/μm.
    pub fn gradient(&self) -> (&Array2<f64>, &Array2<f64>) {
        (&self.grad_x, &self.grad_y)
    }

    /// Unit propagation direction.
    pub fn direction(&self) -> (&Array2<f64>, &Array2<f64>) {
        (&self.dir_x, &self.dir_y)
    }

    /// Velocity vector components in μm/s.
    pub fn velocity(&self) -> (&Array2<f64>, &Array2<f64>) {
        (&self.vx, &self.vy)
    }

    /// Conduction-velocity magnitude in m/s.
    pub fn speed(&self) -> &Array2<f64> {
        &self.speed
    }

    /// Speed field flattened row-major.
    pub fn speed_flat(&self) -> Vec<f64> {
        self.speed.iter().copied().collect()
    }

    /// Mean speed over finite entries; `NaN` if there are none.
    pub fn mean_speed(&self) -> f64 {
        crate::metrics::nan_mean(self.speed.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electrode::{ChannelId, ElectrodeGrid};

    fn planar(speed_m_s: f64, angle: f64, mesh: usize) -> FittedSurface {
        let g = ElectrodeGrid::new(450.0).unwrap();
        let ch: Vec<ChannelId> = ChannelId::all().collect();
        let slowness = 1.0 / (speed_m_s / UM_PER_S_TO_M_PER_S); // s/μm
        let (c, s) = (angle.cos(), angle.sin());
        let t: Vec<f64> = ch
            .iter()
            .map(|&k| {
                let (x, y) = g.position(k);
                0.5 + slowness * (x * c + y * s)
            })
            .collect();
        FittedSurface::fit(&g, &ch, &t, mesh).unwrap()
    }

    #[test]
    fn planar_wave_speed_and_direction() {
        let fit = planar(0.25, 0.0, 12);
        let field = VelocityField::from_surface(&fit);
        for &v in field.speed().iter() {
            approx::assert_relative_eq!(v, 0.25, max_relative = 1e-6);
        }
        let (dx, dy) = field.direction();
        for (&a, &b) in dx.iter().zip(dy.iter()) {
            approx::assert_abs_diff_eq!(a, 1.0, epsilon = 1e-6);
            approx::assert_abs_diff_eq!(b, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn diagonal_wave_vector_magnitude() {
        let fit = planar(0.1, std::f64::consts::FRAC_PI_4, 10);
        let field = VelocityField::at_electrodes(&fit);
        assert_eq!(field.speed().dim(), (8, 8));
        let (vx, vy) = field.velocity();
        for ((&a, &b), &s) in vx.iter().zip(vy.iter()).zip(field.speed().iter()) {
            approx::assert_relative_eq!(a, b, max_relative = 1e-6);
            approx::assert_relative_eq!(a.hypot(b) * UM_PER_S_TO_M_PER_S, s, max_relative = 1e-9);
        }
    }

    #[test]
    fn flat_surface_gives_nan_not_panic() {
        let g = ElectrodeGrid::new(450.0).unwrap();
        let ch: Vec<ChannelId> = ChannelId::all().collect();
        let fit = FittedSurface::fit(&g, &ch, &[1.25; 64], 5).unwrap();
        let field = VelocityField::from_surface(&fit);
        assert!(field.speed().iter().all(|v| v.is_nan()));
        assert!(field.mean_speed().is_nan());
    }

    #[test]
    fn gradient_matches_numerical_derivative_of_surface() {
        let g = ElectrodeGrid::new(450.0).unwrap();
        let ch: Vec<ChannelId> = ChannelId::all().collect();
        let t: Vec<f64> = ch
            .iter()
            .map(|&k| {
                let (x, y) = g.position(k);
                1e-3 * ((x / 3150.0).powi(2) + 0.5 * (y / 3150.0).powi(3) + 0.3 * x * y / 3150.0f64.powi(2))
            })
            .collect();
        let fit = FittedSurface::fit(&g, &ch, &t, 9).unwrap();
        let field = VelocityField::from_surface(&fit);
        let (xx, yy) = field.mesh();
        let (gx, gy) = field.gradient();
        let h = 1e-2;
        for ((&x, &y), (&ax, &ay)) in xx.iter().zip(yy.iter()).zip(gx.iter().zip(gy.iter())) {
            let nx = (fit.arrival(x + h, y) - fit.arrival(x - h, y)) / (2.0 * h);
            let ny = (fit.arrival(x, y + h) - fit.arrival(x, y - h)) / (2.0 * h);
            approx::assert_abs_diff_eq!(ax, nx, epsilon = 1e-10);
            approx::assert_abs_diff_eq!(ay, ny, epsilon = 1e-10);
        }
    }
}
