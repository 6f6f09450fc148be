// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use super::{ lambda_t, separable };
use crate::frame::FloatPlanes;
use crate::psf::Kernel;

/// Largest radius sampled by the direct 2-D blur
pub const MAX_DIRECT_RADIUS: usize = 12;

const AXIS_TOLERANCE_DEG: f64 = 1.0;

/// out = v + amount·(v − blur(v)), with an elliptical Gaussian blur rotated by `theta_deg`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnisotropicUnsharp {
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub theta_deg: f64,
    pub amount: f64,
}

impl AnisotropicUnsharp {
    /// Stand-in for the 2-D Wiener filter: blur matched to the kernel, weaker as λ grows
    pub fn for_kernel(kernel: &Kernel, lambda: f64) -> Self {
        Self {
            sigma_x: kernel.sigma_x,
            sigma_y: kernel.sigma_y,
            theta_deg: kernel.theta_deg,
            amount: 0.5 + (1.0 - lambda_t(lambda)),
        }
    }

    pub fn apply(&self, planes: &FloatPlanes) -> FloatPlanes {
        let (w, h) = planes.size();
        let mut out = FloatPlanes::zeroed_like(planes);
        let amount = self.amount as f32;
        for c in 0..3 {
            let src = &planes.channels[c];
            let blurred = oriented_gaussian_blur(src, w, h, self.sigma_x, self.sigma_y, self.theta_deg);
            for ((o, v), b) in out.channels[c].iter_mut().zip(src).zip(&blurred) {
                *o = v + amount * (v - b);
            }
        }
        out
    }
}

/// Gaussian blur with `sigma_x` along `theta_deg` and `sigma_y` across it.
/// Axis-aligned ellipses take the separable path, the rest are sampled directly.
pub fn oriented_gaussian_blur(src: &[f32], width: usize, height: usize, sigma_x: f64, sigma_y: f64, theta_deg: f64) -> Vec<f32> {
    let theta = theta_deg.rem_euclid(180.0);
    if (sigma_x - sigma_y).abs() < 1e-3 || theta < AXIS_TOLERANCE_DEG || theta > 180.0 - AXIS_TOLERANCE_DEG {
        return separable::gaussian_blur(src, width, height, sigma_x, sigma_y);
    }
    if (theta - 90.0).abs() < AXIS_TOLERANCE_DEG {
        return separable::gaussian_blur(src, width, height, sigma_y, sigma_x);
    }

    let radius = ((sigma_x.max(sigma_y) * 3.0).ceil() as usize).clamp(1, MAX_DIRECT_RADIUS) as isize;
    let taps = sample_ellipse(sigma_x, sigma_y, theta, radius);
    let side = (2 * radius + 1) as usize;
    let (last_x, last_y) = (width as isize - 1, height as isize - 1);

    let mut dst = vec![0.0; src.len()];
    for y in 0..height as isize {
        for x in 0..width as isize {
            let mut acc = 0.0;
            for ky in -radius..=radius {
                let sy = (y + ky).clamp(0, last_y) as usize;
                let row = &src[sy * width..(sy + 1) * width];
                let trow = &taps[(ky + radius) as usize * side..][..side];
                for (kx, t) in (-radius..=radius).zip(trow) {
                    acc += t * row[(x + kx).clamp(0, last_x) as usize];
                }
            }
            dst[y as usize * width + x as usize] = acc;
        }
    }
    dst
}

fn sample_ellipse(sigma_x: f64, sigma_y: f64, theta_deg: f64, radius: isize) -> Vec<f32> {
    let (sin, cos) = theta_deg.to_radians().sin_cos();
    let (sx2, sy2) = (2.0 * sigma_x * sigma_x, 2.0 * sigma_y * sigma_y);
    let mut taps = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    for y in -radius..=radius {
        for x in -radius..=radius {
            let (x, y) = (x as f64, y as f64);
            let u = x * cos - y * sin;
            let v = x * sin + y * cos;
            taps.push((-(u * u / sx2 + v * v / sy2)).exp());
        }
    }
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|t| (t / sum) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_field_is_untouched() {
        let src = vec![77.0; 15 * 11];
        for theta in [0.0, 30.0, 90.0, 135.0] {
            for v in oriented_gaussian_blur(&src, 15, 11, 2.0, 0.8, theta) {
                assert!((v - 77.0).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn rotation_by_ninety_swaps_axes() {
        let mut src = vec![0.0; 21 * 21];
        src[10 * 21 + 10] = 1.0;
        let a = oriented_gaussian_blur(&src, 21, 21, 3.0, 1.0, 90.0);
        let b = oriented_gaussian_blur(&src, 21, 21, 1.0, 3.0, 0.0);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
        // Spread is along the vertical
        assert!(a[13 * 21 + 10] > a[10 * 21 + 13]);
    }

    #[test]
    fn unsharp_overshoots_edges() {
        let mut p = FloatPlanes::new(16, 16);
        for c in p.channels.iter_mut() {
            for (i, v) in c.iter_mut().enumerate() {
                *v = if i % 16 < 8 { 50.0 } else { 150.0 };
            }
        }
        let u = AnisotropicUnsharp { sigma_x: 1.5, sigma_y: 0.8, theta_deg: 25.0, amount: 1.0 };
        let out = u.apply(&p);
        assert!(out.get(0, 8, 8) > 150.0);
        assert!(out.get(0, 7, 8) < 50.0);
        assert!((out.get(0, 0, 8) - 50.0).abs() < 1e-3);
    }
}
