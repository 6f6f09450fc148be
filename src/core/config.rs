// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use serde::{ Serialize, Deserialize };
use crate::deconvolution::{ self, LAMBDA_DEFAULT, LAMBDA_STEP };
use crate::deconvolution::post_process::MAX_CONTRAST_BOOST;

pub const MAX_BUNDLES: usize = 16;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0:?}")]   IOError(#[from] std::io::Error),
    #[error("JSON error: {0}")]   JsonError(#[from] serde_json::Error),
}

/// What to do with kernels that are not separable
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonSeparableMode {
    /// Full 2-D FFT Wiener filter
    #[default]
    Wiener2d,
    /// Anisotropic unsharp mask calibrated from the kernel sigmas
    UnsharpMask,
    /// 2-D Wiener up to `max_fft_pixels`, unsharp mask above
    Auto { max_fft_pixels: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub lambda: f64,
    pub lambda_step: f64,
    pub ray_bundle_enabled: bool,
    pub per_channel_lambda: bool,
    pub non_separable_mode: NonSeparableMode,
    pub num_bundles: usize,
    pub max_accommodation_d: f64,
    pub distance_alpha: f64,
    pub rebuild_distance_cm: f64,
    pub rebuild_interval_ms: u64,
    pub contrast_boost: f64,
    pub ray_unsharp_amount: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            lambda: LAMBDA_DEFAULT,
            lambda_step: LAMBDA_STEP,
            ray_bundle_enabled: true,
            per_channel_lambda: false,
            non_separable_mode: NonSeparableMode::Wiener2d,
            num_bundles: 5,
            max_accommodation_d: 1.5,
            distance_alpha: 0.2,
            rebuild_distance_cm: 2.0,
            rebuild_interval_ms: 300,
            contrast_boost: MAX_CONTRAST_BOOST,
            ray_unsharp_amount: 0.6,
        }
    }
}

impl CorrectionConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn sanitized(&self) -> Self {
        let d = Self::default();
        let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
        let out = Self {
            lambda: deconvolution::clamp_lambda(self.lambda),
            lambda_step: finite_or(self.lambda_step, d.lambda_step).clamp(0.0001, 0.01),
            ray_bundle_enabled: self.ray_bundle_enabled,
            per_channel_lambda: self.per_channel_lambda,
            non_separable_mode: match self.non_separable_mode {
                NonSeparableMode::Auto { max_fft_pixels: 0 } => NonSeparableMode::UnsharpMask,
                m => m
            },
            num_bundles: self.num_bundles.clamp(1, MAX_BUNDLES),
            max_accommodation_d: finite_or(self.max_accommodation_d, d.max_accommodation_d).clamp(0.0, 10.0),
            distance_alpha: finite_or(self.distance_alpha, d.distance_alpha).clamp(0.01, 1.0),
            rebuild_distance_cm: finite_or(self.rebuild_distance_cm, d.rebuild_distance_cm).max(0.0),
            rebuild_interval_ms: self.rebuild_interval_ms.max(1),
            contrast_boost: finite_or(self.contrast_boost, 1.0).clamp(1.0, MAX_CONTRAST_BOOST),
            ray_unsharp_amount: finite_or(self.ray_unsharp_amount, d.ray_unsharp_amount).clamp(0.0, 2.0),
        };
        if &out != self {
            log::warn!("Correction config clamped: {:?}", out);
        }
        out
    }
}
