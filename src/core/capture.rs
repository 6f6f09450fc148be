// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

//! Boundary to the screen capture subsystem. Sources never block: a poll
//! either yields a new frame or reports that there is none yet.

use crate::frame::{ Frame, FrameError };

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("Capture source is not initialized")] NotInitialized,
    #[error("Access to the output was lost")]     AccessLost,
    #[error("Capture device error: {0}")]         Device(String),
    #[error("End of stream")]                     EndOfStream,
    #[error("Invalid frame: {0}")]                Frame(#[from] FrameError),
    #[error("IO error: {0:?}")]                   IOError(#[from] std::io::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub width: usize,
    pub height: usize,
    pub refresh_rate: f64,
    pub frame_count: u64,
}

pub trait FrameSource {
    fn initialize(&mut self, output_index: usize) -> Result<(), CaptureError>;
    /// Non-blocking. `Ok(false)` when no new frame is available.
    fn try_acquire_frame(&mut self) -> Result<bool, CaptureError>;
    /// Last acquired frame
    fn frame(&self) -> Option<&Frame>;
    fn frame_info(&self) -> Option<FrameInfo>;
    fn release(&mut self);
}

/// Owns an initialized source and releases it when dropped
pub struct CaptureSession<S: FrameSource> {
    source: S,
    output_index: usize,
    initialized: bool,
    frames_acquired: u64,
    reinitializations: u64,
}

impl<S: FrameSource> CaptureSession<S> {
    pub fn new(source: S, output_index: usize) -> Self {
        Self { source, output_index, initialized: false, frames_acquired: 0, reinitializations: 0 }
    }

    /// Initializes the source now instead of on the first poll
    pub fn open(source: S, output_index: usize) -> Result<Self, CaptureError> {
        let mut session = Self::new(source, output_index);
        session.ensure_initialized()?;
        Ok(session)
    }

    fn ensure_initialized(&mut self) -> Result<(), CaptureError> {
        if !self.initialized {
            self.source.initialize(self.output_index)?;
            self.initialized = true;
        }
        Ok(())
    }

    /// Polls for a new frame. Lost access re-initializes the source and reports no frame.
    pub fn poll(&mut self) -> Result<Option<&Frame>, CaptureError> {
        self.ensure_initialized()?;
        match self.source.try_acquire_frame() {
            Ok(true) => {
                self.frames_acquired += 1;
                Ok(self.source.frame())
            }
            Ok(false) => Ok(None),
            Err(CaptureError::AccessLost) => {
                log::warn!("Capture access lost on output {}, reinitializing", self.output_index);
                self.source.release();
                self.initialized = false;
                self.reinitializations += 1;
                self.ensure_initialized()?;
                Ok(None)
            }
            Err(e) => Err(e)
        }
    }

    pub fn frame_info(&self) -> Option<FrameInfo> { self.source.frame_info() }
    pub fn frames_acquired(&self) -> u64 { self.frames_acquired }
    pub fn reinitializations(&self) -> u64 { self.reinitializations }
    pub fn is_initialized(&self) -> bool { self.initialized }
    pub fn source(&self) -> &S { &self.source }
}

impl<S: FrameSource> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        if self.initialized {
            self.source.release();
        }
    }
}

/// Holds at most one frame between capture and processing
#[derive(Debug, Default)]
pub struct FrameSlot {
    slot: Option<Frame>,
    dropped: u64,
}

impl FrameSlot {
    /// Returns false and drops the frame if the slot is still occupied
    pub fn offer(&mut self, frame: Frame) -> bool {
        if self.slot.is_some() {
            self.dropped += 1;
            log::debug!("Frame slot busy, dropped frame ({} so far)", self.dropped);
            return false;
        }
        self.slot = Some(frame);
        true
    }

    pub fn take(&mut self) -> Option<Frame> { self.slot.take() }
    pub fn is_empty(&self) -> bool { self.slot.is_none() }
    pub fn dropped(&self) -> u64 { self.dropped }
}
