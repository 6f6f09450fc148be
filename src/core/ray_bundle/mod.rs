// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

//! Ray-bundle prefilter. Each pupil sample steers the image by the local
//! wavefront slope and sharpens it along the astigmatic meridians; the bundles
//! are blended with Stiles-Crawford weights.

mod prefilter;
pub use prefilter::apply;

use nalgebra::Vector2;
use crate::deconvolution::unsharp::AnisotropicUnsharp;
use crate::optics;
use crate::prescription::ViewingContext;
use crate::wavefront::WavefrontApproximation;

pub const MAX_OFFSET_PX: f64 = 0.6;
pub const K_MIN: f64 = 0.6;
pub const K_MAX: f64 = 1.6;

/// `kx` is the sharpening strength along `theta_deg`, `ky` across it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayBundle {
    pub dx: f64,
    pub dy: f64,
    pub kx: f64,
    pub ky: f64,
    pub theta_deg: f64,
    pub weight: f64,
}

impl RayBundle {
    pub fn has_offset(&self) -> bool {
        self.dx.abs() > 1e-6 || self.dy.abs() > 1e-6
    }

    /// Unsharp mask rotated onto the bundle's axis, blur radii are the inverse strengths
    pub fn unsharp(&self, amount: f64) -> AnisotropicUnsharp {
        AnisotropicUnsharp {
            sigma_x: 1.0 / self.kx,
            sigma_y: 1.0 / self.ky,
            theta_deg: self.theta_deg,
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RayLUT {
    pub bundles: Vec<RayBundle>,
    pub num_bundles: usize,
    pub pupil_mm: f64,
    pub delta_d: f64,
}

impl RayLUT {
    pub fn identity() -> Self {
        Self {
            bundles: vec![RayBundle { dx: 0.0, dy: 0.0, kx: 1.0, ky: 1.0, theta_deg: 0.0, weight: 1.0 }],
            num_bundles: 1,
            pupil_mm: optics::PUPIL_RADIUS_DEFAULT_MM,
            delta_d: 0.0,
        }
    }

    /// A single bundle without offset reproduces the input
    pub fn is_identity(&self) -> bool {
        self.bundles.len() <= 1 && !self.bundles.iter().any(RayBundle::has_offset)
    }

    pub fn weight_sum(&self) -> f64 {
        self.bundles.iter().map(|b| b.weight).sum()
    }
}

/// Sharpening strength along the cylinder axis and across it.
/// The power meridian gains with the cylinder, the axis meridian loses a little.
pub fn sharpening(delta_d: f64, astig_d: f64) -> (f64, f64) {
    let base = 1.0 + 0.25 * delta_d.clamp(0.0, 2.0);
    let k_axis = base - 0.1 * astig_d;
    let k_perp = base + 0.3 * astig_d;
    (k_axis.clamp(K_MIN, K_MAX), k_perp.clamp(K_MIN, K_MAX))
}

/// `delta_d` is the excess defocus the eye can't accommodate; its sign follows the prescription.
pub fn build_lut(wavefront: &WavefrontApproximation, ctx: &ViewingContext, delta_d: f64, num_bundles: usize) -> RayLUT {
    let delta_d = if delta_d.is_finite() { delta_d.max(0.0) } else { 0.0 };
    let pupil_mm = optics::clamp_pupil_radius(wavefront.pupil_radius_mm);
    let samples = optics::sample_pupil(num_bundles.max(1), pupil_mm);
    let weights = optics::normalized_weights(&samples);

    let signed_d = if wavefront.defocus_d > 0.0 { delta_d } else { -delta_d };
    let astig = wavefront.astig_magnitude_d;
    let axis = wavefront.astig_axis_deg;
    let (kx, ky) = sharpening(delta_d, astig);
    let scale = ctx.distance_m() / ctx.pixel_size_m();

    let bundles = samples.iter().zip(weights).map(|(s, weight)| {
        let slope = optics::wavefront_slope(signed_d, astig, axis, s.pos_mm / 1000.0);
        // Screen y points down
        let offset = Vector2::new(-slope.x, slope.y) * scale;
        RayBundle {
            dx: offset.x.clamp(-MAX_OFFSET_PX, MAX_OFFSET_PX),
            dy: offset.y.clamp(-MAX_OFFSET_PX, MAX_OFFSET_PX),
            kx,
            ky,
            theta_deg: axis,
            weight,
        }
    }).collect();

    RayLUT { bundles, num_bundles: samples.len(), pupil_mm, delta_d }
}
