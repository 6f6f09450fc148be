// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use serde::{ Serialize, Deserialize };

use crate::config::CorrectionConfig;
use crate::deconvolution::{ self, FilterOptions, WienerFilter, post_process };
use crate::frame::FloatPlanes;
use crate::optics;
use crate::prescription::{ Prescription, ViewingContext };
use crate::psf::{ self, Kernel };
use crate::ray_bundle::{ self, RayLUT };
use crate::wavefront::WavefrontApproximation;

pub const IDENTITY_DELTA_D: f64 = 0.01;
pub const RAY_BUNDLE_MAX_DELTA_D: f64 = 1.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineMode {
    #[default]
    Identity,
    RayBundle,
    RayBundlePlusWiener,
    WienerOnly,
}

impl PipelineMode {
    pub fn uses_ray_bundle(&self) -> bool { matches!(self, Self::RayBundle | Self::RayBundlePlusWiener) }
    pub fn uses_wiener(&self) -> bool { matches!(self, Self::RayBundlePlusWiener | Self::WienerOnly) }
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Identity            => "identity",
            Self::RayBundle           => "ray bundle",
            Self::RayBundlePlusWiener => "ray bundle + wiener",
            Self::WienerOnly          => "wiener",
        })
    }
}

/// Refractive error the eye can't accommodate at this distance
pub fn excess_defocus(distance_m: f64, sphere_d: f64, max_accommodation_d: f64) -> f64 {
    if !distance_m.is_finite() || distance_m <= 0.0 || !sphere_d.is_finite() {
        return 0.0;
    }
    (1.0 / distance_m - (sphere_d.abs() + max_accommodation_d)).max(0.0)
}

pub fn select_pipeline_mode(delta_d: f64, kernel_is_identity: bool, ray_bundle_enabled: bool) -> PipelineMode {
    if kernel_is_identity || !(delta_d >= IDENTITY_DELTA_D) {
        PipelineMode::Identity
    } else if !ray_bundle_enabled {
        PipelineMode::WienerOnly
    } else if delta_d <= RAY_BUNDLE_MAX_DELTA_D {
        PipelineMode::RayBundle
    } else {
        PipelineMode::RayBundlePlusWiener
    }
}

/// Everything derived from one set of inputs. Never mutated after it's published.
#[derive(Debug)]
pub struct CorrectionModel {
    pub generation: u64,
    pub prescription: Prescription,
    pub context: ViewingContext,
    pub wavefront: WavefrontApproximation,
    pub kernel: Kernel,
    pub wiener: WienerFilter,
    pub ray_lut: RayLUT,
    pub mode: PipelineMode,
    pub lambda: f64,
    pub delta_d: f64,
    pub contrast_multiplier: f64,
    pub ray_unsharp_amount: f64,
}

impl CorrectionModel {
    pub fn identity() -> Self {
        Self {
            generation: 0,
            prescription: Prescription::default(),
            context: ViewingContext::default(),
            wavefront: WavefrontApproximation { pupil_radius_mm: optics::PUPIL_RADIUS_DEFAULT_MM, ..Default::default() },
            kernel: Kernel::identity(),
            wiener: WienerFilter::Identity,
            ray_lut: RayLUT::identity(),
            mode: PipelineMode::Identity,
            lambda: deconvolution::LAMBDA_DEFAULT,
            delta_d: 0.0,
            contrast_multiplier: 1.0,
            ray_unsharp_amount: 0.0,
        }
    }

    pub fn build(rx: &Prescription, ctx: &ViewingContext, config: &CorrectionConfig, lambda: f64, generation: u64) -> Self {
        let rx = rx.sanitized();
        let lambda = deconvolution::clamp_lambda(lambda);
        let pupil_mm = optics::pupil_radius_from_ambient(ctx.ambient_light);
        let (wavefront, mut kernel) = psf::build_for(&rx, ctx, pupil_mm);

        let delta_d = excess_defocus(ctx.distance_m(), rx.sphere_d, config.max_accommodation_d);
        let mode = select_pipeline_mode(delta_d, kernel.is_identity, config.ray_bundle_enabled);

        let wiener = if kernel.is_identity {
            WienerFilter::Identity
        } else {
            let opts = FilterOptions { per_channel_lambda: config.per_channel_lambda, non_separable: config.non_separable_mode };
            WienerFilter::build(&kernel, lambda, &opts)
        };
        if let Some((h, v)) = wiener.kernel_inverse() {
            kernel = kernel.with_inverse(h, v);
        }

        let ray_lut = if mode.uses_ray_bundle() {
            ray_bundle::build_lut(&wavefront, ctx, delta_d, config.num_bundles)
        } else {
            RayLUT::identity()
        };

        Self {
            generation,
            prescription: rx,
            context: *ctx,
            wavefront,
            kernel,
            wiener,
            ray_lut,
            mode,
            lambda,
            delta_d,
            contrast_multiplier: post_process::contrast_multiplier(config.contrast_boost, lambda),
            ray_unsharp_amount: config.ray_unsharp_amount,
        }
    }

    /// Carries frame-size dependent state over from the model this one replaces
    pub fn warm_from(&self, previous: &CorrectionModel) {
        if self.mode.uses_wiener() {
            self.wiener.warm_from(&previous.wiener);
        }
    }

    /// Runs the selected pipeline. Identity returns the planes untouched.
    pub fn process(&self, planes: FloatPlanes) -> FloatPlanes {
        let mut out = match self.mode {
            PipelineMode::Identity => return planes,
            PipelineMode::RayBundle => ray_bundle::apply(planes, &self.ray_lut, self.ray_unsharp_amount),
            PipelineMode::RayBundlePlusWiener => {
                let steered = ray_bundle::apply(planes, &self.ray_lut, self.ray_unsharp_amount);
                self.wiener.apply(steered)
            }
            PipelineMode::WienerOnly => self.wiener.apply(planes),
        };
        post_process::apply(&mut out, self.contrast_multiplier);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.0,   PipelineMode::Identity)]
    #[test_case(0.009, PipelineMode::Identity)]
    #[test_case(0.01,  PipelineMode::RayBundle)]
    #[test_case(0.011, PipelineMode::RayBundle)]
    #[test_case(1.0,   PipelineMode::RayBundle)]
    #[test_case(1.01,  PipelineMode::RayBundlePlusWiener)]
    #[test_case(6.0,   PipelineMode::RayBundlePlusWiener)]
    fn mode_boundaries(delta_d: f64, expected: PipelineMode) {
        assert_eq!(select_pipeline_mode(delta_d, false, true), expected);
    }

    #[test_case(0.009, PipelineMode::Identity)]
    #[test_case(0.011, PipelineMode::WienerOnly)]
    #[test_case(1.0,   PipelineMode::WienerOnly)]
    #[test_case(1.01,  PipelineMode::WienerOnly)]
    fn ray_bundle_disabled(delta_d: f64, expected: PipelineMode) {
        assert_eq!(select_pipeline_mode(delta_d, false, false), expected);
    }

    #[test]
    fn identity_kernel_wins() {
        assert_eq!(select_pipeline_mode(3.0, true, true), PipelineMode::Identity);
        assert_eq!(select_pipeline_mode(f64::NAN, false, true), PipelineMode::Identity);
    }

    #[test_case(0.25, 2.0, 1.5, 0.5)]
    #[test_case(0.6, -2.0, 1.5, 0.0)]
    #[test_case(0.2, 0.0, 1.5, 3.5)]
    #[test_case(0.0, 0.0, 1.5, 0.0)]
    fn excess_defocus_rule(distance_m: f64, sphere: f64, accommodation: f64, expected: f64) {
        assert!((excess_defocus(distance_m, sphere, accommodation) - expected).abs() < 1e-12);
    }

    fn context(distance_cm: f64) -> ViewingContext {
        ViewingContext { distance_cm, display_ppi: 109.0, ambient_light: None }
    }

    #[test]
    fn model_for_close_viewing() {
        let config = CorrectionConfig::default();
        // 1/0.2 - (1 + 1.5) = 2.5 D of excess defocus
        let m = CorrectionModel::build(&Prescription::sphere(-1.0), &context(20.0), &config, 0.02, 3);
        assert_eq!(m.generation, 3);
        assert_eq!(m.mode, PipelineMode::RayBundlePlusWiener);
        assert!((m.delta_d - 2.5).abs() < 1e-9);
        assert_eq!(m.ray_lut.bundles.len(), config.num_bundles);
        let h = m.kernel.inv_horiz.as_ref().unwrap();
        assert!((h.iter().map(|t| t.abs()).sum::<f64>() - 1.0).abs() < 1e-3);

        let m = CorrectionModel::build(&Prescription::sphere(-1.0), &context(20.0), &CorrectionConfig { ray_bundle_enabled: false, ..config }, 0.02, 4);
        assert_eq!(m.mode, PipelineMode::WienerOnly);
        assert!(m.ray_lut.is_identity());
    }

    #[test]
    fn model_for_no_rx() {
        let m = CorrectionModel::build(&Prescription::new(-0.05, Some(0.0), None), &context(20.0), &CorrectionConfig::default(), 0.02, 1);
        assert_eq!(m.mode, PipelineMode::Identity);
        assert!(m.kernel.is_identity);
        assert!(m.wiener.is_identity());

        let mut p = FloatPlanes::new(6, 5);
        p.channels[0][3] = 250.0;
        assert_eq!(m.process(p.clone()), p);
    }

    #[test]
    fn processed_output_stays_in_range() {
        let m = CorrectionModel::build(&Prescription::new(-2.0, Some(-1.0), Some(30.0)), &context(18.0), &CorrectionConfig::default(), 0.005, 1);
        assert!(m.mode.uses_wiener());
        let mut p = FloatPlanes::new(24, 20);
        for (i, v) in p.channels[1].iter_mut().enumerate() {
            *v = if (i / 4) % 2 == 0 { 0.0 } else { 255.0 };
        }
        let out = m.process(p);
        assert!(out.channels.iter().flatten().all(|v| (0.0..=255.0).contains(v)));
    }

    fn spectral_cache(m: &CorrectionModel) -> Option<std::sync::Arc<crate::deconvolution::spectral::SpectralResponse>> {
        match &m.wiener {
            WienerFilter::Spectral { wiener, .. } => wiener.cached(),
            _ => None,
        }
    }

    #[test]
    fn rebuilt_model_starts_warm() {
        // Cylinder-dominated and oblique, so the kernel needs the 2-D filter
        let rx = Prescription::new(-1.0, Some(-2.0), Some(30.0));
        let config = CorrectionConfig::default();
        let old = CorrectionModel::build(&rx, &context(18.0), &config, 0.02, 1);
        assert!(old.mode.uses_wiener());
        assert!(matches!(old.wiener, WienerFilter::Spectral { fallback: None, .. }));
        old.process(FloatPlanes::new(24, 20));
        let seen = spectral_cache(&old).unwrap();

        // Same inputs, as after an interval rebuild: the response is shared
        let same = CorrectionModel::build(&rx, &context(18.0), &config, 0.02, 2);
        same.warm_from(&old);
        assert!(std::sync::Arc::ptr_eq(&spectral_cache(&same).unwrap(), &seen));

        // New lambda: built ahead for the frame size in use
        let changed = CorrectionModel::build(&rx, &context(18.0), &config, 0.04, 3);
        assert!(spectral_cache(&changed).is_none());
        changed.warm_from(&old);
        let built = spectral_cache(&changed).unwrap();
        assert!(!std::sync::Arc::ptr_eq(&built, &seen));
        assert_eq!(built.frame, (24, 20));
    }
}
