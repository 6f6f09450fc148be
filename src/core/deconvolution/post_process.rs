// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

//! Bounded mid-frequency contrast boost followed by the [0, 255] clamp.
//! Larger boosts ring visibly around edges, so the multiplier never exceeds `MAX_CONTRAST_BOOST`.

use super::{ lambda_t, separable };
use crate::frame::FloatPlanes;

pub const MAX_CONTRAST_BOOST: f64 = 1.1;
pub const FINE_RADIUS: usize = 1;
pub const COARSE_RADIUS: usize = 4;

/// Effective multiplier: configured boost (capped at 1.1) fading to 1 as λ reaches its maximum
pub fn contrast_multiplier(configured: f64, lambda: f64) -> f64 {
    let configured = if configured.is_finite() { configured.clamp(1.0, MAX_CONTRAST_BOOST) } else { 1.0 };
    1.0 + (configured - 1.0) * (1.0 - lambda_t(lambda))
}

pub fn apply(planes: &mut FloatPlanes, multiplier: f64) {
    let gain = (multiplier.min(MAX_CONTRAST_BOOST) - 1.0) as f32;
    if gain > 0.0 {
        let (w, h) = planes.size();
        for ch in planes.channels.iter_mut() {
            let fine = separable::box_blur(ch, w, h, FINE_RADIUS);
            let coarse = separable::box_blur(ch, w, h, COARSE_RADIUS);
            for ((v, f), c) in ch.iter_mut().zip(&fine).zip(&coarse) {
                *v += gain * (f - c);
            }
        }
    }
    planes.clamp_to_u8_range();
}
