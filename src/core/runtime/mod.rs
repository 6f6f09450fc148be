// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

mod smoothing;
pub use smoothing::*;

use std::sync::Arc;
use std::time::{ Duration, Instant };
use parking_lot::RwLock;

use crate::config::CorrectionConfig;
use crate::deconvolution;
use crate::pipeline::CorrectionModel;
use crate::prescription::{ Prescription, ViewingContext };

pub const SPHERE_EPSILON_D: f64 = 0.01;
pub const CYLINDER_EPSILON_D: f64 = 0.01;
pub const AXIS_EPSILON_DEG: f64 = 0.5;
pub const PPI_EPSILON: f64 = 0.5;
pub const AMBIENT_EPSILON: i32 = 8;

/// `Rebuilding` while a trigger has fired and the published model is stale.
/// Frames keep using the stale model until `update` swaps in the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Stable,
    Rebuilding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Initial,
    DistanceDelta,
    Interval,
    ParametersChanged,
    Feedback,
    ConfigChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    TooBlurry,
    TooSharp,
    Ok,
}

impl std::str::FromStr for Feedback {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blurry" | "too_blurry" | "tooblurry" => Ok(Self::TooBlurry),
            "sharp"  | "too_sharp"  | "toosharp"  => Ok(Self::TooSharp),
            "ok" => Ok(Self::Ok),
            _ => Err(format!("Unknown feedback {s:?}, expected blurry, sharp or ok"))
        }
    }
}

/// Shared pointer to the current model. Readers take one `Arc` per frame,
/// the lock is held only for the pointer copy and swap.
#[derive(Clone)]
pub struct ModelHandle(Arc<RwLock<Arc<CorrectionModel>>>);

impl Default for ModelHandle {
    fn default() -> Self { Self::new(CorrectionModel::identity()) }
}

impl ModelHandle {
    pub fn new(model: CorrectionModel) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(model))))
    }
    pub fn load(&self) -> Arc<CorrectionModel> {
        self.0.read().clone()
    }
    pub fn store(&self, model: CorrectionModel) {
        let model = Arc::new(model);
        *self.0.write() = model;
    }
    pub fn generation(&self) -> u64 {
        self.0.read().generation
    }
}

fn differs(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() > eps
}

fn parameters_changed(built: &CorrectionModel, rx: &Prescription, ctx: &ViewingContext) -> bool {
    let rx = rx.sanitized();
    let old = &built.prescription;
    differs(old.sphere_d, rx.sphere_d, SPHERE_EPSILON_D)
        || differs(old.cylinder_or_zero(), rx.cylinder_or_zero(), CYLINDER_EPSILON_D)
        || differs(old.axis_or_zero(), rx.axis_or_zero(), AXIS_EPSILON_DEG)
        || old.cylinder_d.is_some() != rx.cylinder_d.is_some()
        || differs(built.context.display_ppi, ctx.display_ppi, PPI_EPSILON)
        || match (built.context.ambient_light, ctx.ambient_light) {
            (Some(a), Some(b)) => (a as i32 - b as i32).abs() > AMBIENT_EPSILON,
            (a, b) => a.is_some() != b.is_some()
        }
}

/// Owns the inputs and decides when the published model is stale.
pub struct RuntimeAdapter {
    config: CorrectionConfig,
    prescription: Prescription,
    context: ViewingContext,
    smoother: DistanceSmoother,
    lambda: f64,
    pending: Option<RebuildReason>,
    model: ModelHandle,
    last_build: Instant,
    generation: u64,
}

impl RuntimeAdapter {
    pub fn new(config: CorrectionConfig, prescription: Prescription, context: ViewingContext) -> Self {
        Self::new_at(config, prescription, context, Instant::now())
    }

    pub fn new_at(config: CorrectionConfig, prescription: Prescription, context: ViewingContext, now: Instant) -> Self {
        let config = config.sanitized();
        let mut smoother = DistanceSmoother::new(config.distance_alpha);
        if context.distance_cm.is_finite() && context.distance_cm > 0.0 {
            smoother.push(context.distance_cm);
        }
        let mut adapter = Self {
            lambda: config.lambda,
            config,
            prescription: prescription.sanitized(),
            context,
            smoother,
            pending: None,
            model: ModelHandle::default(),
            last_build: now,
            generation: 0,
        };
        adapter.rebuild(RebuildReason::Initial, now);
        adapter
    }

    pub fn handle(&self) -> ModelHandle { self.model.clone() }
    pub fn model(&self) -> Arc<CorrectionModel> { self.model.load() }
    pub fn state(&self) -> AdapterState { self.state_at(Instant::now()) }
    pub fn state_at(&self, now: Instant) -> AdapterState {
        if self.rebuild_reason(now).is_some() { AdapterState::Rebuilding } else { AdapterState::Stable }
    }
    pub fn lambda(&self) -> f64 { self.lambda }
    pub fn config(&self) -> &CorrectionConfig { &self.config }
    pub fn prescription(&self) -> &Prescription { &self.prescription }
    pub fn smoothed_distance_cm(&self) -> f64 { self.smoother.value() }

    /// Context with the smoothed distance in place of the raw one
    pub fn effective_context(&self) -> ViewingContext {
        ViewingContext { distance_cm: self.smoother.value(), ..self.context }
    }

    pub fn push_distance(&mut self, distance_cm: f64) -> bool {
        self.smoother.push(distance_cm)
    }

    pub fn set_prescription(&mut self, prescription: Prescription) {
        self.prescription = prescription.sanitized();
    }

    pub fn set_display_ppi(&mut self, ppi: f64) {
        if ppi.is_finite() && ppi > 0.0 {
            self.context.display_ppi = ppi;
        } else {
            log::warn!("Ignoring display PPI {ppi}");
        }
    }

    pub fn set_ambient_light(&mut self, ambient: Option<u8>) {
        self.context.ambient_light = ambient;
    }

    pub fn set_config(&mut self, config: CorrectionConfig) {
        let config = config.sanitized();
        if config != self.config {
            if config.lambda != self.config.lambda {
                self.lambda = config.lambda;
            }
            self.smoother.alpha = config.distance_alpha;
            self.config = config;
            self.pending = Some(RebuildReason::ConfigChanged);
        }
    }

    pub fn set_lambda(&mut self, lambda: f64) {
        self.lambda = deconvolution::clamp_lambda(lambda);
        self.pending = Some(RebuildReason::ConfigChanged);
    }

    pub fn feedback(&mut self, feedback: Feedback) {
        let step = self.config.lambda_step;
        self.lambda = deconvolution::clamp_lambda(match feedback {
            Feedback::TooBlurry => self.lambda - step,
            Feedback::TooSharp  => self.lambda + step,
            Feedback::Ok        => self.lambda,
        });
        log::info!("Feedback {feedback:?}, lambda is now {:.4}", self.lambda);
        self.pending = Some(RebuildReason::Feedback);
    }

    /// Why the current model is stale, if it is
    pub fn rebuild_reason(&self, now: Instant) -> Option<RebuildReason> {
        if let Some(reason) = self.pending {
            return Some(reason);
        }
        let built = self.model.load();
        if parameters_changed(&built, &self.prescription, &self.context) {
            return Some(RebuildReason::ParametersChanged);
        }
        if differs(self.smoother.value(), built.context.distance_cm, self.config.rebuild_distance_cm) {
            return Some(RebuildReason::DistanceDelta);
        }
        if now.saturating_duration_since(self.last_build) > Duration::from_millis(self.config.rebuild_interval_ms) {
            return Some(RebuildReason::Interval);
        }
        None
    }

    pub fn update(&mut self) -> Option<RebuildReason> {
        self.update_at(Instant::now())
    }

    /// Rebuilds and publishes a new model when one of the triggers fired
    pub fn update_at(&mut self, now: Instant) -> Option<RebuildReason> {
        let reason = self.rebuild_reason(now)?;
        self.rebuild(reason, now);
        Some(reason)
    }

    fn rebuild(&mut self, reason: RebuildReason, now: Instant) {
        self.generation += 1;
        let ctx = self.effective_context();
        let model = CorrectionModel::build(&self.prescription, &ctx, &self.config, self.lambda, self.generation);
        model.warm_from(&self.model.load());
        log::debug!(
            "Rebuilt model #{} ({reason:?}): mode {}, sigma {:.3}x{:.3} @ {:.1}°, size {}, ΔD {:.3}, λ {:.4}, distance {:.1} cm",
            model.generation, model.mode, model.kernel.sigma_x, model.kernel.sigma_y, model.kernel.theta_deg,
            model.kernel.size, model.delta_d, model.lambda, ctx.distance_cm
        );
        self.model.store(model);
        self.pending = None;
        self.last_build = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineMode;

    fn adapter(now: Instant) -> RuntimeAdapter {
        RuntimeAdapter::new_at(CorrectionConfig::default(), Prescription::sphere(-1.0), ViewingContext { distance_cm: 40.0, display_ppi: 109.0, ambient_light: None }, now)
    }

    #[test]
    fn initial_model_is_published() {
        let t0 = Instant::now();
        let a = adapter(t0);
        assert_eq!(a.state_at(t0), AdapterState::Stable);
        assert_eq!(a.model().generation, 1);
        assert_eq!(a.smoothed_distance_cm(), 40.0);
        assert_eq!(a.rebuild_reason(t0), None);
    }

    #[test]
    fn small_distance_changes_do_not_rebuild() {
        let t0 = Instant::now();
        let mut a = adapter(t0);
        a.push_distance(45.0); // EMA moves by 1 cm
        assert_eq!(a.update_at(t0 + Duration::from_millis(10)), None);
        a.push_distance(60.0);
        assert_eq!(a.update_at(t0 + Duration::from_millis(20)), Some(RebuildReason::DistanceDelta));
        assert_eq!(a.model().generation, 2);
    }

    #[test]
    fn interval_forces_rebuild() {
        let t0 = Instant::now();
        let mut a = adapter(t0);
        assert_eq!(a.update_at(t0 + Duration::from_millis(300)), None);
        assert_eq!(a.update_at(t0 + Duration::from_millis(301)), Some(RebuildReason::Interval));
        assert_eq!(a.update_at(t0 + Duration::from_millis(400)), None);
    }

    #[test]
    fn parameter_epsilons() {
        let t0 = Instant::now();
        let mut a = adapter(t0);
        a.set_prescription(Prescription::sphere(-1.005));
        a.set_ambient_light(None);
        a.set_display_ppi(109.3);
        assert_eq!(a.rebuild_reason(t0), None);
        a.set_prescription(Prescription::new(-1.0, Some(-0.5), Some(10.0)));
        assert_eq!(a.update_at(t0), Some(RebuildReason::ParametersChanged));
        a.set_ambient_light(Some(5));
        assert_eq!(a.update_at(t0), Some(RebuildReason::ParametersChanged));
        a.set_ambient_light(Some(12));
        assert_eq!(a.update_at(t0), None);
        a.set_ambient_light(Some(14));
        assert_eq!(a.update_at(t0), Some(RebuildReason::ParametersChanged));
    }

    #[test]
    fn feedback_steps_lambda() {
        let t0 = Instant::now();
        let mut a = adapter(t0);
        a.feedback(Feedback::TooBlurry);
        assert!((a.lambda() - 0.018).abs() < 1e-12);
        assert_eq!(a.update_at(t0), Some(RebuildReason::Feedback));
        assert!((a.model().lambda - 0.018).abs() < 1e-12);
        a.feedback(Feedback::TooSharp);
        a.feedback(Feedback::TooSharp);
        assert!((a.lambda() - 0.022).abs() < 1e-12);
        for _ in 0..100 {
            a.feedback(Feedback::TooSharp);
        }
        assert_eq!(a.lambda(), deconvolution::LAMBDA_MAX);
        a.feedback(Feedback::Ok);
        assert_eq!(a.lambda(), deconvolution::LAMBDA_MAX);
        assert_eq!(a.rebuild_reason(t0), Some(RebuildReason::Feedback));
    }

    #[test]
    fn readers_keep_their_model_across_swaps() {
        let t0 = Instant::now();
        let mut a = adapter(t0);
        let handle = a.handle();
        let old = handle.load();
        a.set_config(CorrectionConfig { ray_bundle_enabled: false, ..Default::default() });
        assert_eq!(a.update_at(t0), Some(RebuildReason::ConfigChanged));
        assert_eq!(old.generation, 1);
        assert_eq!(handle.generation(), 2);
        assert_eq!(handle.load().generation, 2);
    }

    #[test]
    fn close_distance_switches_mode() {
        let t0 = Instant::now();
        let mut a = RuntimeAdapter::new_at(CorrectionConfig { distance_alpha: 1.0, ..Default::default() }, Prescription::sphere(-0.5), ViewingContext::default(), t0);
        assert_eq!(a.model().mode, PipelineMode::Identity);
        a.push_distance(20.0); // 5 - 2 = 3 D
        a.update_at(t0);
        assert_eq!(a.model().mode, PipelineMode::RayBundlePlusWiener);
        a.push_distance(45.0); // 2.22 - 2 = 0.22 D
        a.update_at(t0);
        assert_eq!(a.model().mode, PipelineMode::RayBundle);
    }

    #[test]
    fn state_follows_staleness() {
        let t0 = Instant::now();
        let mut a = adapter(t0);
        assert_eq!(a.state_at(t0), AdapterState::Stable);
        a.feedback(Feedback::Ok);
        assert_eq!(a.state_at(t0), AdapterState::Rebuilding);
        // Still serving the previous model
        assert_eq!(a.model().generation, 1);
        a.update_at(t0);
        assert_eq!(a.state_at(t0), AdapterState::Stable);
        assert_eq!(a.state_at(t0 + Duration::from_millis(301)), AdapterState::Rebuilding);
    }

    #[test]
    fn feedback_parsing() {
        assert_eq!("blurry".parse::<Feedback>(), Ok(Feedback::TooBlurry));
        assert_eq!("SHARP".parse::<Feedback>(), Ok(Feedback::TooSharp));
        assert!("meh".parse::<Feedback>().is_err());
    }
}
