// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

//! Geometric optics of the eye used by the rest of the crate: pupil sampling,
//! Stiles-Crawford apodisation and second order Zernike terms.

use nalgebra::Vector2;
use std::f64::consts::PI;

/// Reduced-eye focal length
pub const EYE_FOCAL_LENGTH_M: f64 = 0.017;

pub const PUPIL_RADIUS_MIN_MM: f64 = 2.0;
pub const PUPIL_RADIUS_MAX_MM: f64 = 4.0;
/// Used when no ambient light reading is available. Screen-lit viewing keeps the pupil fairly small.
pub const PUPIL_RADIUS_DEFAULT_MM: f64 = 2.5;

/// Stiles-Crawford directionality coefficient in 1/mm²
pub const STILES_CRAWFORD_RHO: f64 = 0.05;

/// Fraction of the pupil radius at which the outer ring of samples is placed
pub const PUPIL_RING_FRACTION: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PupilSample {
    /// Position in the pupil plane, millimeters from the pupil center
    pub pos_mm: Vector2<f64>,
}

impl PupilSample {
    pub fn radius_mm(&self) -> f64 { self.pos_mm.norm() }
}

pub fn pupil_radius_from_ambient(ambient: Option<u8>) -> f64 {
    match ambient {
        Some(level) => {
            let t = level as f64 / 255.0;
            (PUPIL_RADIUS_MAX_MM - t * (PUPIL_RADIUS_MAX_MM - PUPIL_RADIUS_MIN_MM)).clamp(PUPIL_RADIUS_MIN_MM, PUPIL_RADIUS_MAX_MM)
        }
        None => PUPIL_RADIUS_DEFAULT_MM
    }
}

pub fn clamp_pupil_radius(radius_mm: f64) -> f64 {
    if !radius_mm.is_finite() {
        log::warn!("Invalid pupil radius {radius_mm}, using {PUPIL_RADIUS_DEFAULT_MM} mm");
        return PUPIL_RADIUS_DEFAULT_MM;
    }
    radius_mm.clamp(PUPIL_RADIUS_MIN_MM, PUPIL_RADIUS_MAX_MM)
}

#[inline]
pub fn stiles_crawford_weight(r_mm: f64) -> f64 {
    10f64.powf(-STILES_CRAWFORD_RHO * r_mm * r_mm)
}

/// One sample in the pupil center, the rest evenly spaced on a ring at 0.7 of the radius.
pub fn sample_pupil(count: usize, pupil_radius_mm: f64) -> Vec<PupilSample> {
    let count = count.max(1);
    let ring = pupil_radius_mm * PUPIL_RING_FRACTION;
    let on_ring = count - 1;

    let mut samples = Vec::with_capacity(count);
    samples.push(PupilSample { pos_mm: Vector2::zeros() });
    for i in 0..on_ring {
        let phi = 2.0 * PI * i as f64 / on_ring as f64;
        samples.push(PupilSample { pos_mm: Vector2::new(ring * phi.cos(), ring * phi.sin()) });
    }
    samples
}

/// Normalized Stiles-Crawford weights for the given samples. Always sums to 1.
pub fn normalized_weights(samples: &[PupilSample]) -> Vec<f64> {
    let raw: Vec<f64> = samples.iter().map(|s| stiles_crawford_weight(s.radius_mm())).collect();
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![1.0 / samples.len().max(1) as f64; samples.len()];
    }
    raw.into_iter().map(|w| w / sum).collect()
}

/// Unit vector perpendicular to the cylinder axis. The cylinder has its power in this meridian.
#[inline]
pub fn power_meridian(axis_deg: f64) -> Vector2<f64> {
    let a = axis_deg.to_radians();
    Vector2::new(-a.sin(), a.cos())
}

/// Slope of the wavefront (radians) at pupil position `pos_m` (meters) for a
/// spherical error `defocus_d` and a cylinder `astig_d` with its axis at `axis_deg`.
///
/// W(p) = D/2·|p|² + A/2·(p·n)²  =>  ∇W = D·p + A·(p·n)·n
pub fn wavefront_slope(defocus_d: f64, astig_d: f64, axis_deg: f64, pos_m: Vector2<f64>) -> Vector2<f64> {
    let n = power_meridian(axis_deg);
    pos_m * defocus_d + n * (astig_d * pos_m.dot(&n))
}

/// Second order Zernike coefficients (OSA convention, micrometers).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZernikeTerms {
    /// Z(2,0)
    pub defocus_um: f64,
    /// Z(2,2), vertical/horizontal astigmatism
    pub astig_0_um: f64,
    /// Z(2,-2), oblique astigmatism
    pub astig_45_um: f64,
}

impl ZernikeTerms {
    /// Power vector (M, J0, J45) → Zernike coefficients for a pupil of radius `pupil_radius_mm`.
    pub fn from_refraction(sphere_d: f64, cylinder_d: f64, axis_deg: f64, pupil_radius_mm: f64) -> Self {
        let r2 = pupil_radius_mm * pupil_radius_mm;
        let a = 2.0 * axis_deg.to_radians();
        let m = sphere_d + cylinder_d / 2.0;
        let j0 = -cylinder_d / 2.0 * a.cos();
        let j45 = -cylinder_d / 2.0 * a.sin();
        Self {
            defocus_um:  -m * r2 / (4.0 * 3f64.sqrt()),
            astig_0_um:  -j0 * r2 / (2.0 * 6f64.sqrt()),
            astig_45_um: -j45 * r2 / (2.0 * 6f64.sqrt()),
        }
    }

    /// Root mean square wavefront error. Zernike polynomials are orthonormal, so it is the vector norm.
    pub fn rms_um(&self) -> f64 {
        (self.defocus_um.powi(2) + self.astig_0_um.powi(2) + self.astig_45_um.powi(2)).sqrt()
    }

    /// Wavefront error at normalized pupil coordinates (rho in [0, 1], theta in radians)
    pub fn evaluate(&self, rho: f64, theta: f64) -> f64 {
        let r2 = rho * rho;
        self.defocus_um  * 3f64.sqrt() * (2.0 * r2 - 1.0) +
        self.astig_0_um  * 6f64.sqrt() * r2 * (2.0 * theta).cos() +
        self.astig_45_um * 6f64.sqrt() * r2 * (2.0 * theta).sin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some(0), 4.0)]
    #[test_case(Some(255), 2.0)]
    #[test_case(None, PUPIL_RADIUS_DEFAULT_MM)]
    fn pupil_follows_ambient_light(ambient: Option<u8>, expected: f64) {
        assert!((pupil_radius_from_ambient(ambient) - expected).abs() < 1e-9);
    }

    #[test]
    fn pupil_radius_is_clamped() {
        assert_eq!(clamp_pupil_radius(0.0), PUPIL_RADIUS_MIN_MM);
        assert_eq!(clamp_pupil_radius(9.0), PUPIL_RADIUS_MAX_MM);
        assert_eq!(clamp_pupil_radius(f64::NAN), PUPIL_RADIUS_DEFAULT_MM);
    }

    #[test]
    fn stiles_crawford_falls_off() {
        assert_eq!(stiles_crawford_weight(0.0), 1.0);
        assert!(stiles_crawford_weight(2.0) < stiles_crawford_weight(1.0));
        assert!((stiles_crawford_weight(2.0) - 10f64.powf(-0.2)).abs() < 1e-12);
    }

    #[test_case(1)]
    #[test_case(2)]
    #[test_case(5)]
    #[test_case(9)]
    fn ring_samples_and_weights(k: usize) {
        let samples = sample_pupil(k, 3.0);
        assert_eq!(samples.len(), k);
        assert_eq!(samples[0].radius_mm(), 0.0);
        for s in &samples[1..] {
            assert!((s.radius_mm() - 2.1).abs() < 1e-9);
        }
        let sum: f64 = normalized_weights(&samples).iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn slope_of_pure_defocus_is_radial() {
        let g = wavefront_slope(2.0, 0.0, 0.0, Vector2::new(0.001, 0.0));
        assert!((g.x - 0.002).abs() < 1e-12);
        assert_eq!(g.y, 0.0);
    }

    #[test]
    fn cylinder_has_no_power_along_its_axis() {
        // Axis 0°: power acts vertically
        let along = wavefront_slope(0.0, 1.5, 0.0, Vector2::new(0.002, 0.0));
        assert!(along.norm() < 1e-12);
        let across = wavefront_slope(0.0, 1.5, 0.0, Vector2::new(0.0, 0.002));
        assert!((across.y - 0.003).abs() < 1e-12);
    }

    #[test]
    fn zernike_rms_of_spherical_error() {
        let z = ZernikeTerms::from_refraction(-1.0, 0.0, 0.0, 2.0);
        assert!((z.defocus_um - 4.0 / (4.0 * 3f64.sqrt())).abs() < 1e-12);
        assert_eq!(z.astig_0_um, 0.0);
        assert!((z.rms_um() - z.defocus_um.abs()).abs() < 1e-12);
        // Defocus polynomial is rotationally symmetric
        assert!((z.evaluate(0.5, 0.0) - z.evaluate(0.5, 1.0)).abs() < 1e-12);
    }
}
