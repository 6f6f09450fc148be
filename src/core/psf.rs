// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use crate::optics::EYE_FOCAL_LENGTH_M;
use crate::prescription::{ Prescription, ViewingContext };
use crate::wavefront::{ self, WavefrontApproximation };

/// Blur circle diameter to Gaussian sigma
pub const GAUSSIAN_FACTOR: f64 = 0.4;
pub const SIGMA_MIN_PX: f64 = 0.5;
pub const SIGMA_MAX_PX: f64 = 15.0;
pub const KERNEL_SIZE_MIN: usize = 15;
pub const KERNEL_SIZE_MAX: usize = 31;
pub const ASTIG_THRESHOLD_D: f64 = 0.1;
pub const SEPARABLE_SIGMA_DELTA_PX: f64 = 0.5;
pub const SEPARABLE_AXIS_TOLERANCE_DEG: f64 = 5.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    /// Along `theta_deg`
    pub sigma_x: f64,
    /// Perpendicular to `theta_deg`
    pub sigma_y: f64,
    pub theta_deg: f64,
    pub size: usize,
    pub separable: bool,
    pub is_identity: bool,
    /// Inverse filters, filled in by the deconvolution stage
    pub inv_horiz: Option<Vec<f64>>,
    pub inv_vert: Option<Vec<f64>>,
}

impl Default for Kernel {
    fn default() -> Self { Self::identity() }
}

pub fn kernel_size(max_sigma: f64) -> usize {
    let n = (max_sigma * 3.0).ceil().max(0.0) as usize * 2 + 1;
    n.clamp(KERNEL_SIZE_MIN, KERNEL_SIZE_MAX) | 1
}

/// Angular distance to the closest of 0°, 90°, 180°
fn axis_misalignment(theta_deg: f64) -> f64 {
    let m = theta_deg.rem_euclid(90.0);
    m.min(90.0 - m)
}

/// Normalized 1-D Gaussian taps centered in a window of `size` (odd) samples
pub fn gaussian_taps(sigma: f64, size: usize) -> Vec<f64> {
    let half = (size / 2) as isize;
    if sigma < 1e-6 {
        let mut taps = vec![0.0; size];
        taps[half as usize] = 1.0;
        return taps;
    }
    let taps: Vec<f64> = (-half..=half).map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp()).collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}

impl Kernel {
    pub fn identity() -> Self {
        Self {
            sigma_x: 0.0,
            sigma_y: 0.0,
            theta_deg: 0.0,
            size: 1,
            separable: true,
            is_identity: true,
            inv_horiz: Some(vec![1.0]),
            inv_vert: Some(vec![1.0]),
        }
    }

    /// Elliptical Gaussian. Sigmas are clamped to [0.5, 15] px.
    pub fn gaussian(sigma_x: f64, sigma_y: f64, theta_deg: f64) -> Self {
        let sanitize = |s: f64| if s.is_finite() { s.clamp(SIGMA_MIN_PX, SIGMA_MAX_PX) } else { SIGMA_MIN_PX };
        let sigma_x = sanitize(sigma_x);
        let sigma_y = sanitize(sigma_y);
        let theta_deg = if theta_deg.is_finite() { theta_deg.rem_euclid(180.0) } else { 0.0 };
        Self {
            sigma_x,
            sigma_y,
            theta_deg,
            size: kernel_size(sigma_x.max(sigma_y)),
            separable: (sigma_x - sigma_y).abs() < SEPARABLE_SIGMA_DELTA_PX || axis_misalignment(theta_deg) < SEPARABLE_AXIS_TOLERANCE_DEG,
            is_identity: false,
            inv_horiz: None,
            inv_vert: None,
        }
    }

    pub fn with_inverse(mut self, horiz: Vec<f64>, vert: Vec<f64>) -> Self {
        self.inv_horiz = Some(horiz);
        self.inv_vert = Some(vert);
        self
    }

    pub fn is_negligible(&self) -> bool {
        self.is_identity || (self.sigma_x < 0.1 && self.sigma_y < 0.1)
    }

    pub fn radius(&self) -> usize { self.size / 2 }

    /// Standard deviations of the marginal distributions along screen x and y
    pub fn axis_sigmas(&self) -> (f64, f64) {
        let (s, c) = self.theta_deg.to_radians().sin_cos();
        let (vx, vy) = (self.sigma_x * self.sigma_x, self.sigma_y * self.sigma_y);
        ((vx * c * c + vy * s * s).sqrt(), (vx * s * s + vy * c * c).sqrt())
    }

    pub fn horizontal_taps(&self) -> Vec<f64> {
        if self.is_identity { return vec![1.0]; }
        gaussian_taps(self.axis_sigmas().0, self.size)
    }
    pub fn vertical_taps(&self) -> Vec<f64> {
        if self.is_identity { return vec![1.0]; }
        gaussian_taps(self.axis_sigmas().1, self.size)
    }

    #[inline]
    fn density(&self, x: f64, y: f64, cos: f64, sin: f64) -> f64 {
        // Screen y grows downwards, theta is counter-clockwise as seen on screen
        let u =  x * cos - y * sin;
        let v =  x * sin + y * cos;
        (-(u * u / (2.0 * self.sigma_x * self.sigma_x) + v * v / (2.0 * self.sigma_y * self.sigma_y))).exp()
    }

    /// `size`×`size` samples of the rotated Gaussian, centered, summing to 1
    pub fn sample_centered(&self) -> Vec<f64> {
        if self.is_identity { return vec![1.0]; }
        let (sin, cos) = self.theta_deg.to_radians().sin_cos();
        let r = self.radius() as isize;
        let mut out = Vec::with_capacity(self.size * self.size);
        for y in -r..=r {
            for x in -r..=r {
                out.push(self.density(x as f64, y as f64, cos, sin));
            }
        }
        let sum: f64 = out.iter().sum();
        out.iter_mut().for_each(|v| *v /= sum);
        out
    }

    /// The kernel placed on a `width`×`height` grid with its center at (0, 0) and
    /// negative offsets wrapped around, as needed for circular convolution.
    pub fn sample_wrapped(&self, width: usize, height: usize) -> Vec<f64> {
        let mut grid = vec![0.0; width * height];
        if width == 0 || height == 0 { return grid; }
        let centered = self.sample_centered();
        let r = (self.size / 2) as isize;
        for ky in 0..self.size {
            for kx in 0..self.size {
                let gx = (kx as isize - r).rem_euclid(width as isize) as usize;
                let gy = (ky as isize - r).rem_euclid(height as isize) as usize;
                grid[gy * width + gx] += centered[ky * self.size + kx];
            }
        }
        grid
    }
}

#[inline]
fn retinal_blur_angle(defocus_d: f64, pupil_radius_m: f64) -> f64 {
    let retinal_radius_m = defocus_d.abs() * pupil_radius_m * EYE_FOCAL_LENGTH_M;
    retinal_radius_m / EYE_FOCAL_LENGTH_M
}

/// Blur of `diopters` of defocus, expressed in screen pixels
pub fn blur_px(diopters: f64, pupil_radius_m: f64, ctx: &ViewingContext) -> f64 {
    retinal_blur_angle(diopters, pupil_radius_m) * ctx.distance_m() / ctx.pixel_size_m()
}

pub fn build(wavefront: &WavefrontApproximation, ctx: &ViewingContext) -> Kernel {
    if wavefront.is_zero() {
        return Kernel::identity();
    }
    let pupil_m = wavefront.pupil_radius_m();
    let base_sigma = blur_px(wavefront.defocus_d, pupil_m, ctx) * GAUSSIAN_FACTOR;

    let (sigma_x, sigma_y) = if wavefront.astig_magnitude_d > ASTIG_THRESHOLD_D {
        let astig_sigma = blur_px(wavefront.astig_magnitude_d, pupil_m, ctx) * GAUSSIAN_FACTOR;
        let base = base_sigma.max(astig_sigma);
        let ratio = if base > 0.0 { (astig_sigma / base).min(1.0) } else { 0.0 };
        (base * (1.0 + 0.3 * ratio), base * (1.0 - 0.2 * ratio))
    } else {
        (base_sigma, base_sigma)
    };

    Kernel::gaussian(sigma_x, sigma_y, wavefront.astig_axis_deg)
}

/// Prescription → wavefront → kernel in one step
pub fn build_for(rx: &Prescription, ctx: &ViewingContext, pupil_radius_mm: f64) -> (WavefrontApproximation, Kernel) {
    let wf = wavefront::compute_wavefront(rx, pupil_radius_mm);
    let kernel = if wavefront::is_no_rx(rx) { Kernel::identity() } else { build(&wf, ctx) };
    (wf, kernel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optics;
    use test_case::test_case;

    fn ctx(distance_cm: f64, ppi: f64) -> ViewingContext {
        ViewingContext { distance_cm, display_ppi: ppi, ambient_light: None }
    }

    #[test]
    fn myopic_scenario_at_sixty_centimeters() {
        let (_, k) = build_for(&Prescription::sphere(-2.0), &ctx(60.0, 109.0), optics::pupil_radius_from_ambient(None));
        assert!(!k.is_identity);
        assert!(k.sigma_x >= 1.0 && k.sigma_x <= 6.0, "sigma {}", k.sigma_x);
        assert_eq!(k.sigma_x, k.sigma_y);
        assert!(k.separable);
        assert_eq!(k.theta_deg, 0.0);
    }

    #[test_case(0.0, Some(0.0))]
    #[test_case(-0.05, Some(0.0))]
    #[test_case(0.05, None)]
    fn identity_below_bypass(sphere: f64, cyl: Option<f64>) {
        let (_, k) = build_for(&Prescription::new(sphere, cyl, None), &ctx(60.0, 109.0), 3.0);
        assert!(k.is_identity);
        assert_eq!((k.sigma_x, k.sigma_y, k.size), (0.0, 0.0, 1));
        assert_eq!(k.inv_horiz, Some(vec![1.0]));
        assert_eq!(k.inv_vert, Some(vec![1.0]));
    }

    #[test_case(0.0, 15)]
    #[test_case(2.0, 15)]
    #[test_case(2.4, 17)]
    #[test_case(4.0, 25)]
    #[test_case(5.2, 31)]
    #[test_case(15.0, 31)]
    fn size_rule(sigma: f64, expected: usize) {
        assert_eq!(kernel_size(sigma), expected);
        assert_eq!(expected % 2, 1);
    }

    #[test]
    fn sigmas_are_clamped() {
        let (_, k) = build_for(&Prescription::sphere(-12.0), &ctx(60.0, 300.0), 4.0);
        assert_eq!(k.sigma_x, SIGMA_MAX_PX);
        let (_, k) = build_for(&Prescription::sphere(0.1), &ctx(30.0, 72.0), 2.0);
        assert_eq!(k.sigma_x, SIGMA_MIN_PX);
        assert!(k.size >= KERNEL_SIZE_MIN);
    }

    #[test]
    fn astigmatism_splits_sigmas() {
        let (_, k) = build_for(&Prescription::new(0.0, Some(-1.0), Some(30.0)), &ctx(60.0, 96.0), 2.5);
        assert!(!k.is_identity);
        assert!(k.sigma_x > k.sigma_y);
        assert!((k.sigma_x / k.sigma_y - 1.3 / 0.8).abs() < 1e-9);
        assert_eq!(k.theta_deg, 30.0);
        assert!(!k.separable);

        let (_, k) = build_for(&Prescription::new(-0.5, Some(-1.0), Some(92.0)), &ctx(60.0, 96.0), 2.5);
        assert!(k.separable);
    }

    // Misalignment is measured to the nearest of 0°, 90° and 180°
    #[test_case(0.0,   true)]
    #[test_case(4.9,   true)]
    #[test_case(5.0,   false)]
    #[test_case(45.0,  false)]
    #[test_case(85.1,  true)]
    #[test_case(88.0,  true)]
    #[test_case(94.0,  true)]
    #[test_case(96.0,  false)]
    #[test_case(178.0, true)]
    fn separable_near_an_axis(theta: f64, separable: bool) {
        assert_eq!(Kernel::gaussian(3.0, 1.5, theta).separable, separable);
    }

    #[test]
    fn rotated_marginals() {
        let k = Kernel::gaussian(4.0, 2.0, 90.0);
        let (h, v) = k.axis_sigmas();
        assert!((h - 2.0).abs() < 1e-9 && (v - 4.0).abs() < 1e-9);
        let sum: f64 = k.horizontal_taps().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sampled_kernel_is_normalized() {
        let k = Kernel::gaussian(3.0, 1.5, 45.0);
        let c = k.sample_centered();
        assert_eq!(c.len(), k.size * k.size);
        assert!((c.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        let w = k.sample_wrapped(64, 48);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(w.iter().cloned().fold(0.0, f64::max), w[0]);
    }
}
