// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

pub mod optics;
pub mod prescription;
pub mod wavefront;
pub mod psf;
pub mod deconvolution;
pub mod ray_bundle;
pub mod pipeline;
pub mod runtime;

pub mod config;
pub mod frame;
pub mod capture;

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering::SeqCst };
use std::time::{ Duration, Instant };
use parking_lot::RwLock;

pub use frame::{ Frame, FrameError, PixelFormat, PixelType };
pub use config::{ CorrectionConfig, ConfigError, NonSeparableMode };
pub use pipeline::{ CorrectionModel, PipelineMode };
pub use prescription::{ Prescription, ViewingContext, DisplayProfile, Profile };
pub use runtime::{ Feedback, ModelHandle, RebuildReason, RuntimeAdapter };

/// What happened to one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessedInfo {
    pub mode: PipelineMode,
    pub generation: u64,
    /// Frame left untouched
    pub passthrough: bool,
    /// Processing failed and the frame was passed through
    pub failed: bool,
    pub elapsed: Duration,
}

pub struct CorrectionManager {
    pub adapter: Arc<RwLock<RuntimeAdapter>>,
    model: ModelHandle,
    enabled: AtomicBool,
    frames_processed: AtomicU64,
    frames_failed: AtomicU64,
}

impl CorrectionManager {
    pub fn new(config: CorrectionConfig, prescription: Prescription, context: ViewingContext) -> Self {
        let adapter = RuntimeAdapter::new(config, prescription, context);
        let model = adapter.handle();
        Self {
            adapter: Arc::new(RwLock::new(adapter)),
            model,
            enabled: AtomicBool::new(true),
            frames_processed: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
        }
    }

    pub fn from_profile(profile: &Profile, config: CorrectionConfig) -> Self {
        let display = profile.display();
        let context = ViewingContext { display_ppi: display.effective_ppi(), ..Default::default() };
        Self::new(config, profile.prescription(), context)
    }

    pub fn model(&self) -> Arc<CorrectionModel> { self.model.load() }
    pub fn handle(&self) -> ModelHandle { self.model.clone() }

    /// Disabling takes effect on the next frame
    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, SeqCst) != enabled {
            log::info!("Correction {}", if enabled { "enabled" } else { "disabled" });
        }
    }
    pub fn is_enabled(&self) -> bool { self.enabled.load(SeqCst) }

    pub fn frames_processed(&self) -> u64 { self.frames_processed.load(SeqCst) }
    pub fn frames_failed(&self) -> u64 { self.frames_failed.load(SeqCst) }

    pub fn push_distance(&self, distance_cm: f64) -> bool { self.adapter.write().push_distance(distance_cm) }
    pub fn set_prescription(&self, prescription: Prescription) { self.adapter.write().set_prescription(prescription); }
    pub fn set_display_ppi(&self, ppi: f64) { self.adapter.write().set_display_ppi(ppi); }
    pub fn set_ambient_light(&self, ambient: Option<u8>) { self.adapter.write().set_ambient_light(ambient); }
    pub fn set_config(&self, config: CorrectionConfig) { self.adapter.write().set_config(config); }
    pub fn feedback(&self, feedback: Feedback) { self.adapter.write().feedback(feedback); }

    /// Runs the rebuild triggers. Call between frames.
    pub fn update(&self) -> Option<RebuildReason> {
        self.adapter.write().update()
    }

    /// Corrects `frame` in place. Never fails: on any error the frame is left as it was.
    pub fn process_frame(&self, frame: &mut Frame) -> ProcessedInfo {
        let start = Instant::now();
        let model = self.model.load();
        let mut info = ProcessedInfo { mode: model.mode, generation: model.generation, passthrough: true, failed: false, elapsed: Duration::ZERO };

        if !self.is_enabled() || model.mode == PipelineMode::Identity {
            info.elapsed = start.elapsed();
            return info;
        }

        info.failed = !self.run_guarded(frame, |planes| model.process(planes));
        info.passthrough = info.failed;
        info.elapsed = start.elapsed();
        info
    }

    /// Converts, processes and writes back `frame`, catching errors and panics.
    /// Returns false when the frame was left untouched.
    fn run_guarded(&self, frame: &mut Frame, process: impl FnOnce(frame::FloatPlanes) -> frame::FloatPlanes) -> bool {
        let input: &Frame = frame;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| -> Result<frame::FloatPlanes, FrameError> {
            let planes = input.to_planes()?;
            Ok(process(planes))
        }));

        match result.map(|r| r.and_then(|planes| frame.write_planes(&planes))) {
            Ok(Ok(())) => {
                self.frames_processed.fetch_add(1, SeqCst);
                return true;
            }
            Ok(Err(e)) => {
                log::error!("Frame processing failed, passing through: {e}");
            }
            Err(e) => {
                if let Some(s) = e.downcast_ref::<&str>() {
                    log::error!("Frame processing panicked, passing through: {}", s);
                } else if let Some(s) = e.downcast_ref::<String>() {
                    log::error!("Frame processing panicked, passing through: {}", s);
                } else {
                    log::error!("Frame processing panicked, passing through: {:?}", e);
                }
            }
        }
        self.frames_failed.fetch_add(1, SeqCst);
        false
    }
}
