// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use crate::optics::{ self, ZernikeTerms };
use crate::prescription::Prescription;

pub const SPHERE_BYPASS_D: f64 = 0.1;
pub const CYLINDER_BYPASS_D: f64 = 0.25;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WavefrontApproximation {
    pub defocus_d: f64,
    pub astig_magnitude_d: f64,
    pub astig_axis_deg: f64,
    pub pupil_radius_mm: f64,
}

/// The single "no correction needed" test. Everything that decides on identity goes through here.
pub fn is_no_rx(rx: &Prescription) -> bool {
    let rx = rx.sanitized();
    rx.sphere_d.abs() < SPHERE_BYPASS_D && rx.cylinder_d.map_or(true, |c| c.abs() < CYLINDER_BYPASS_D)
}

pub fn compute_wavefront(rx: &Prescription, pupil_radius_mm: f64) -> WavefrontApproximation {
    let pupil_radius_mm = optics::clamp_pupil_radius(pupil_radius_mm);
    if is_no_rx(rx) {
        return WavefrontApproximation { pupil_radius_mm, ..Default::default() };
    }
    let rx = rx.sanitized();
    WavefrontApproximation {
        defocus_d: rx.sphere_d,
        astig_magnitude_d: rx.cylinder_or_zero().abs(),
        astig_axis_deg: rx.axis_or_zero(),
        pupil_radius_mm,
    }
}

impl WavefrontApproximation {
    pub fn is_zero(&self) -> bool {
        self.defocus_d == 0.0 && self.astig_magnitude_d == 0.0
    }

    pub fn pupil_radius_m(&self) -> f64 { self.pupil_radius_mm / 1000.0 }

    pub fn zernike(&self) -> ZernikeTerms {
        ZernikeTerms::from_refraction(self.defocus_d, -self.astig_magnitude_d, self.astig_axis_deg, self.pupil_radius_mm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.0,   None,        true)]
    #[test_case(0.0,   Some(0.0),   true)]
    #[test_case(-0.05, Some(0.0),   true)]
    #[test_case(0.09,  Some(-0.24), true)]
    #[test_case(0.1,   None,        false)]
    #[test_case(-0.05, Some(0.25),  false)]
    #[test_case(-2.0,  None,        false)]
    fn bypass_rule(sphere: f64, cylinder: Option<f64>, expected: bool) {
        assert_eq!(is_no_rx(&Prescription::new(sphere, cylinder, None)), expected);
    }

    #[test]
    fn zero_wavefront_below_threshold() {
        let w = compute_wavefront(&Prescription::new(-0.05, Some(0.0), None), 3.0);
        assert!(w.is_zero());
        assert_eq!(w.pupil_radius_mm, 3.0);
    }

    #[test]
    fn defocus_maps_directly() {
        let w = compute_wavefront(&Prescription::new(-2.5, Some(-1.25), Some(170.0)), 3.0);
        assert_eq!(w.defocus_d, -2.5);
        assert_eq!(w.astig_magnitude_d, 1.25);
        assert_eq!(w.astig_axis_deg, 170.0);
        assert!(w.zernike().rms_um() > 0.0);
    }

    #[test]
    fn malformed_input_is_clamped() {
        let w = compute_wavefront(&Prescription::new(-1.0, Some(0.5), Some(f64::NAN)), 0.0);
        assert_eq!(w.astig_axis_deg, 0.0);
        assert_eq!(w.pupil_radius_mm, optics::PUPIL_RADIUS_MIN_MM);

        let w = compute_wavefront(&Prescription::new(f64::NAN, None, None), f64::NAN);
        assert!(w.is_zero());
    }
}
