// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use argh::FromArgs;
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering::SeqCst };
use std::time::{ Duration, Instant };
use parking_lot::Mutex;
use indicatif::{ ProgressBar, ProgressState, ProgressStyle };
use serde::Serialize;

use kacamata_core::*;
use kacamata_core::capture::{ CaptureError, CaptureSession, FrameSlot };
use crate::capture::{ RawFileSink, RawFileSource, Source, SyntheticSource };
use crate::util;

/** Kacamata
Real-time optical pre-correction of screen frames for refractive errors
*/
#[derive(FromArgs)]
pub struct Opts {
    /// user profile JSON file with sphereD, cylinderD, axisDeg, displayPPI, width, height, diagonalInches
    #[argh(option)]
    profile: Option<String>,

    /// sphere in diopters, overrides the profile
    #[argh(option)]
    sphere: Option<f64>,

    /// cylinder in diopters, overrides the profile
    #[argh(option)]
    cylinder: Option<f64>,

    /// cylinder axis in degrees (0-180), overrides the profile
    #[argh(option)]
    axis: Option<f64>,

    /// viewing distance in cm, default: 60
    #[argh(option, default = "60.0")]
    distance: f64,

    /// simulated change of the viewing distance per frame in cm, with estimator noise. Default: 0
    #[argh(option, default = "0.0")]
    distance_drift: f64,

    /// display pixel density, overrides the profile
    #[argh(option)]
    ppi: Option<f64>,

    /// ambient light level 0-255, unknown if not set
    #[argh(option)]
    ambient: Option<u8>,

    /// regularization parameter, 0.001 - 0.1
    #[argh(option)]
    lambda: Option<f64>,

    /// correction config JSON file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// raw RGBA/BGRA input file. A synthetic test pattern is used if not set
    #[argh(option, short = 'i')]
    input: Option<String>,

    /// frame size, eg. "1920x1080". Default: 640x360
    #[argh(option, short = 's', default = "String::from(\"640x360\")")]
    size: String,

    /// frames are BGRA instead of RGBA
    #[argh(switch)]
    bgra: bool,

    /// raw output file for the corrected frames
    #[argh(option, short = 'o')]
    output: Option<String>,

    /// number of frames to process, default: 120
    #[argh(option, short = 'n', default = "120")]
    frames: u64,

    /// disable the ray-bundle prefilter
    #[argh(switch)]
    no_ray_bundle: bool,

    /// user feedback applied before processing: blurry, sharp or ok. Can be repeated
    #[argh(option)]
    feedback: Vec<Feedback>,

    /// capture on a separate thread paced at the refresh rate, dropping frames that arrive while one is pending
    #[argh(switch)]
    realtime: bool,

    /// write the run summary as JSON to this file
    #[argh(option)]
    summary: Option<String>,

    /// also write the log to this file
    #[argh(option)]
    log_file: Option<String>,

    /// verbose logging
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// print version and exit
    #[argh(switch)]
    version: bool,
}

impl Opts {
    pub fn version(&self) -> bool { self.version }
    pub fn verbose(&self) -> bool { self.verbose }
    pub fn log_file(&self) -> Option<&str> { self.log_file.as_deref() }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Summary {
    pub mode: String,
    pub generation: u64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub theta_deg: f64,
    pub kernel_size: usize,
    pub lambda: f64,
    pub delta_d: f64,
    pub frames_processed: u64,
    pub frames_passthrough: u64,
    pub frames_failed: u64,
    pub frames_dropped: u64,
    pub capture_errors: u64,
    pub capture_reinitializations: u64,
    pub avg_frame_ms: f64,
    pub max_frame_ms: f64,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Mode:        {} (model #{}, ΔD {:.3})", self.mode, self.generation, self.delta_d)?;
        writeln!(f, "Kernel:      σ {:.3} x {:.3} @ {:.1}°, {} px", self.sigma_x, self.sigma_y, self.theta_deg, self.kernel_size)?;
        writeln!(f, "Lambda:      {:.4}", self.lambda)?;
        writeln!(f, "Frames:      {} corrected, {} passed through, {} failed, {} dropped", self.frames_processed, self.frames_passthrough, self.frames_failed, self.frames_dropped)?;
        writeln!(f, "Capture:     {} errors, {} reinitializations", self.capture_errors, self.capture_reinitializations)?;
        write!(f,   "Frame time:  {:.2} ms average, {:.2} ms max", self.avg_frame_ms, self.max_frame_ms)
    }
}

#[derive(Default)]
struct Stats {
    count: u64,
    passthrough: u64,
    total: Duration,
    max: Duration,
}

impl Stats {
    fn add(&mut self, info: &ProcessedInfo) {
        self.count += 1;
        if info.passthrough { self.passthrough += 1; }
        self.total += info.elapsed;
        self.max = self.max.max(info.elapsed);
    }
}

fn read_profile(path: &str) -> Result<Profile, Box<dyn std::error::Error>> {
    let data = std::fs::read_to_string(path)?;
    Ok(Profile::from_json(&data)?)
}

/// Simulated distance estimator: linear drift plus ±0.5 cm of jitter
struct DistanceEstimator {
    start_cm: f64,
    drift_cm: f64,
    rng: fastrand::Rng,
}

impl DistanceEstimator {
    fn sample(&mut self, frame: u64) -> f64 {
        self.start_cm + self.drift_cm * frame as f64 + (self.rng.f64() - 0.5)
    }
}

pub fn run(opts: Opts) -> Result<Summary, Box<dyn std::error::Error>> {
    let mut config = match &opts.config {
        Some(path) => CorrectionConfig::load_from_file(path)?,
        None => CorrectionConfig::default()
    };
    if let Some(lambda) = opts.lambda { config.lambda = lambda; }
    if opts.no_ray_bundle { config.ray_bundle_enabled = false; }
    let config = config.sanitized();

    let profile = match &opts.profile {
        Some(path) => read_profile(path)?,
        None => Profile::default()
    };
    let mut rx = profile.prescription();
    if let Some(s) = opts.sphere   { rx.sphere_d = s; }
    if let Some(c) = opts.cylinder { rx.cylinder_d = Some(c); }
    if let Some(a) = opts.axis     { rx.axis_deg = Some(a); }

    let context = ViewingContext {
        distance_cm: opts.distance,
        display_ppi: opts.ppi.unwrap_or_else(|| profile.display().effective_ppi()),
        ambient_light: opts.ambient,
    };

    log::info!("Kacamata {}", util::get_version());
    log::info!("Prescription: {:?}, distance {} cm, {} PPI, ambient {:?}", rx, context.distance_cm, context.display_ppi, context.ambient_light);

    let manager = Arc::new(CorrectionManager::new(config, rx, context));
    for f in &opts.feedback {
        manager.feedback(*f);
    }
    manager.update();

    let format = if opts.bgra { PixelFormat::Bgra8 } else { PixelFormat::Rgba8 };
    let (width, height) = util::parse_size(&opts.size)?;
    let mut total = opts.frames;
    let source = match &opts.input {
        Some(path) => {
            let source = RawFileSource::new(path, width, height, format);
            total = total.min(source.frames_in_file()?);
            Source::RawFile(source)
        }
        None => {
            let mut source = SyntheticSource::new(width, height, format, 0x6b61_6361);
            if opts.realtime { source.miss_probability = 0.05; }
            Source::Synthetic(source)
        }
    };
    let mut sink = match &opts.output {
        Some(path) => Some(RawFileSink::create(path)?),
        None => None
    };

    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyle::with_template("[{bar:50.cyan/blue}] {pos:>5}/{len:5} {eta:11} {msg}")?
        .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| { let _ = write!(w, "ETA {:.1}s", state.eta().as_secs_f64()); })
        .progress_chars("#>-"));

    let mut estimator = DistanceEstimator { start_cm: opts.distance, drift_cm: opts.distance_drift, rng: fastrand::Rng::with_seed(7) };
    let mut stats = Stats::default();
    let mut present = |frame: &mut Frame, index: u64| -> std::io::Result<()> {
        if opts.distance_drift != 0.0 {
            manager.push_distance(estimator.sample(index));
        }
        if let Some(reason) = manager.update() {
            pb.set_message(format!("{:?}", reason));
        }
        let info = manager.process_frame(frame);
        stats.add(&info);
        if let Some(sink) = sink.as_mut() {
            sink.write(frame)?;
        }
        pb.inc(1);
        Ok(())
    };

    let time = Instant::now();
    let (dropped, capture_errors, reinits) = if opts.realtime {
        run_threaded(source, total, &mut present)?
    } else {
        run_sequential(source, total, &mut present)?
    };
    drop(present);
    pb.finish_and_clear();

    if let Some(sink) = sink {
        let written = sink.finish()?;
        log::info!("Wrote {written} frames");
    }
    log::info!("Done in {:.2}s", time.elapsed().as_secs_f64());

    let model = manager.model();
    let summary = Summary {
        mode: model.mode.to_string(),
        generation: model.generation,
        sigma_x: model.kernel.sigma_x,
        sigma_y: model.kernel.sigma_y,
        theta_deg: model.kernel.theta_deg,
        kernel_size: model.kernel.size,
        lambda: model.lambda,
        delta_d: model.delta_d,
        frames_processed: manager.frames_processed(),
        frames_passthrough: stats.passthrough,
        frames_failed: manager.frames_failed(),
        frames_dropped: dropped,
        capture_errors,
        capture_reinitializations: reinits,
        avg_frame_ms: if stats.count > 0 { stats.total.as_secs_f64() * 1000.0 / stats.count as f64 } else { 0.0 },
        max_frame_ms: stats.max.as_secs_f64() * 1000.0,
    };
    if let Some(path) = &opts.summary {
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
    }
    Ok(summary)
}

const MAX_CONSECUTIVE_ERRORS: u64 = 10;

/// Capture errors seen so far. Any successful poll resets the run of consecutive ones.
#[derive(Default)]
struct ErrorBudget {
    total: u64,
    consecutive: u64,
}

impl ErrorBudget {
    fn success(&mut self) { self.consecutive = 0; }

    /// Returns false once too many errors came in a row
    fn failure(&mut self) -> bool {
        self.total += 1;
        self.consecutive += 1;
        self.consecutive <= MAX_CONSECUTIVE_ERRORS
    }
}

/// Poll, process and present on one thread. Returns (dropped, capture errors, reinitializations).
fn run_sequential<F>(source: Source, total: u64, present: &mut F) -> Result<(u64, u64, u64), Box<dyn std::error::Error>>
    where F: FnMut(&mut Frame, u64) -> std::io::Result<()>
{
    let mut session = CaptureSession::new(source, 0);
    let mut slot = FrameSlot::default();
    let mut last_output: Option<Frame> = None;
    let mut done = 0u64;
    let mut errors = ErrorBudget::default();

    while done < total {
        match session.poll() {
            Ok(Some(frame)) => { slot.offer(frame.clone()); errors.success(); }
            Ok(None) => errors.success(),
            Err(CaptureError::EndOfStream) => break,
            Err(e) => {
                log::warn!("Capture error: {e}");
                if !errors.failure() {
                    return Err(e.into());
                }
                // Keep presenting the last output while capture recovers
                if let Some(frame) = last_output.as_mut() {
                    present(frame, done)?;
                    done += 1;
                }
                continue;
            }
        }
        if let Some(mut frame) = slot.take() {
            present(&mut frame, done)?;
            done += 1;
            last_output = Some(frame);
        }
    }
    Ok((slot.dropped(), errors.total, session.reinitializations()))
}

/// Capture runs on its own thread at the source refresh rate and hands frames over through a single slot
fn run_threaded<F>(source: Source, total: u64, present: &mut F) -> Result<(u64, u64, u64), Box<dyn std::error::Error>>
    where F: FnMut(&mut Frame, u64) -> std::io::Result<()>
{
    let slot = Arc::new(Mutex::new(FrameSlot::default()));
    let stop = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let capture = {
        let (slot, stop, finished) = (slot.clone(), stop.clone(), finished.clone());
        std::thread::spawn(move || -> (u64, u64) {
            let mut session = CaptureSession::new(source, 0);
            let mut errors = ErrorBudget::default();
            let mut offered = 0u64;
            while !stop.load(SeqCst) && offered < total {
                let interval = Duration::from_secs_f64(1.0 / session.frame_info().map_or(60.0, |i| i.refresh_rate.max(1.0)));
                let tick = Instant::now();
                match session.poll() {
                    Ok(Some(frame)) => {
                        let frame = frame.clone();
                        slot.lock().offer(frame);
                        offered += 1;
                        errors.success();
                    }
                    Ok(None) => errors.success(),
                    Err(CaptureError::EndOfStream) => break,
                    Err(e) => {
                        log::warn!("Capture error: {e}");
                        if !errors.failure() {
                            log::error!("Giving up after {MAX_CONSECUTIVE_ERRORS} consecutive capture errors");
                            break;
                        }
                    }
                }
                if let Some(rest) = interval.checked_sub(tick.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
            finished.store(true, SeqCst);
            (errors.total, session.reinitializations())
        })
    };

    let mut done = 0u64;
    let mut result = Ok(());
    loop {
        // Read the flag first so a frame offered right before finishing isn't lost
        let capture_finished = finished.load(SeqCst);
        let frame = slot.lock().take();
        match frame {
            Some(mut frame) => {
                if let Err(e) = present(&mut frame, done) {
                    result = Err(e);
                    break;
                }
                done += 1;
            }
            None if capture_finished => break,
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }
    stop.store(true, SeqCst);
    let (errors, reinits) = capture.join().map_err(|_| "Capture thread panicked")?;
    result?;
    let dropped = slot.lock().dropped();
    Ok((dropped, errors, reinits))
}
