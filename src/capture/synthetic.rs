// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

//! Moving test pattern: text-like glyph rows, a checkerboard and a little sensor noise.
//! Can also skip polls and lose access to exercise the capture contract.

use kacamata_core::capture::{ CaptureError, FrameInfo, FrameSource };
use kacamata_core::frame::{ BGRA8, RGBA8 };
use kacamata_core::{ Frame, PixelFormat };

pub struct SyntheticSource {
    width: usize,
    height: usize,
    format: PixelFormat,
    rng: fastrand::Rng,
    /// Probability that a poll yields no new frame
    pub miss_probability: f64,
    /// Report lost access once after this many frames
    pub access_lost_after: Option<u64>,
    pub noise: u8,
    initialized: bool,
    frame: Option<Frame>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(width: usize, height: usize, format: PixelFormat, seed: u64) -> Self {
        Self {
            width,
            height,
            format,
            rng: fastrand::Rng::with_seed(seed),
            miss_probability: 0.0,
            access_lost_after: None,
            noise: 6,
            initialized: false,
            frame: None,
            frame_count: 0,
        }
    }

    fn render(&mut self) -> Frame {
        let mut frame = Frame::new(self.width, self.height, self.format);
        let shift = self.frame_count as usize;
        let noise = self.noise;
        for y in 0..self.height {
            let row = frame.row_mut(y);
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let sx = x + shift;
                // Dark strokes on a light page, 8 px tall lines with gaps
                let glyph = (y % 12) < 8 && ((sx / 3) % 5 != 0) && ((sx * 7 + y * 3) % 11 < 4);
                let checker = ((sx / 16) + (y / 16)) % 2 == 0;
                let base: u8 = if glyph { 30 } else if checker { 235 } else { 205 };
                let n = if noise > 0 { self.rng.u8(..noise) } else { 0 };
                let v = base.saturating_add(n);
                let rgba = [v, v.saturating_sub((x % 7) as u8), v, 255];
                let bytes: [u8; 4] = match self.format {
                    PixelFormat::Rgba8 => bytemuck::cast(RGBA8(rgba[0], rgba[1], rgba[2], rgba[3])),
                    PixelFormat::Bgra8 => bytemuck::cast(BGRA8(rgba[2], rgba[1], rgba[0], rgba[3])),
                };
                px.copy_from_slice(&bytes);
            }
        }
        frame
    }
}

impl FrameSource for SyntheticSource {
    fn initialize(&mut self, output_index: usize) -> Result<(), CaptureError> {
        if output_index != 0 {
            return Err(CaptureError::Device(format!("No output {output_index}")));
        }
        if self.width == 0 || self.height == 0 {
            return Err(kacamata_core::FrameError::ZeroSize(self.width, self.height).into());
        }
        self.initialized = true;
        Ok(())
    }

    fn try_acquire_frame(&mut self) -> Result<bool, CaptureError> {
        if !self.initialized {
            return Err(CaptureError::NotInitialized);
        }
        if self.access_lost_after == Some(self.frame_count) {
            self.access_lost_after = None;
            self.initialized = false;
            return Err(CaptureError::AccessLost);
        }
        if self.miss_probability > 0.0 && self.rng.f64() < self.miss_probability {
            return Ok(false);
        }
        let frame = self.render();
        self.frame = Some(frame);
        self.frame_count += 1;
        Ok(true)
    }

    fn frame(&self) -> Option<&Frame> { self.frame.as_ref() }

    fn frame_info(&self) -> Option<FrameInfo> {
        Some(FrameInfo { width: self.width, height: self.height, refresh_rate: 60.0, frame_count: self.frame_count })
    }

    fn release(&mut self) {
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kacamata_core::capture::CaptureSession;

    #[test]
    fn pattern_channel_order() {
        let mut rgba = SyntheticSource::new(20, 10, PixelFormat::Rgba8, 7);
        let mut bgra = SyntheticSource::new(20, 10, PixelFormat::Bgra8, 7);
        rgba.initialize(0).unwrap();
        bgra.initialize(0).unwrap();
        assert!(rgba.try_acquire_frame().unwrap() && bgra.try_acquire_frame().unwrap());
        let (a, b) = (rgba.frame().unwrap(), bgra.frame().unwrap());
        let pa = a.to_planes().unwrap();
        let pb = b.to_planes().unwrap();
        assert_eq!(pa.channels, pb.channels);
        assert!(a.data.chunks_exact(4).all(|p| p[3] == 255));
    }

    #[test]
    fn session_recovers_from_lost_access() {
        let mut source = SyntheticSource::new(8, 8, PixelFormat::Bgra8, 1);
        source.access_lost_after = Some(2);
        let mut session = CaptureSession::new(source, 0);
        let mut got = 0;
        for _ in 0..6 {
            if session.poll().unwrap().is_some() { got += 1; }
        }
        assert_eq!(got, 5);
        assert_eq!(session.reinitializations(), 1);
    }

    #[test]
    fn misses_do_not_block() {
        let mut source = SyntheticSource::new(8, 8, PixelFormat::Rgba8, 3);
        source.miss_probability = 1.0;
        source.initialize(0).unwrap();
        assert!(!source.try_acquire_frame().unwrap());
        assert!(source.frame().is_none());
    }
}
