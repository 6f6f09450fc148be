// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

//! Concatenated packed 8-bit frames without any header, rows tightly packed.

use std::fs::File;
use std::io::{ BufReader, BufWriter, Read, Write };
use kacamata_core::capture::{ CaptureError, FrameInfo, FrameSource };
use kacamata_core::frame::BYTES_PER_PIXEL;
use kacamata_core::{ Frame, PixelFormat };

pub struct RawFileSource {
    path: String,
    width: usize,
    height: usize,
    format: PixelFormat,
    refresh_rate: f64,
    reader: Option<BufReader<File>>,
    frame: Option<Frame>,
    frame_count: u64,
}

impl RawFileSource {
    pub fn new(path: &str, width: usize, height: usize, format: PixelFormat) -> Self {
        Self { path: path.to_owned(), width, height, format, refresh_rate: 60.0, reader: None, frame: None, frame_count: 0 }
    }

    pub fn frame_len(&self) -> usize { self.width * self.height * BYTES_PER_PIXEL }

    /// Number of whole frames in the file
    pub fn frames_in_file(&self) -> std::io::Result<u64> {
        let len = std::fs::metadata(&self.path)?.len();
        Ok(len / self.frame_len().max(1) as u64)
    }
}

impl FrameSource for RawFileSource {
    fn initialize(&mut self, _output_index: usize) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(kacamata_core::FrameError::ZeroSize(self.width, self.height).into());
        }
        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len % self.frame_len() as u64 != 0 {
            log::warn!("{} is not a multiple of {}x{} frames, the trailing {} bytes will be ignored", self.path, self.width, self.height, len % self.frame_len() as u64);
        }
        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    fn try_acquire_frame(&mut self) -> Result<bool, CaptureError> {
        let len = self.frame_len();
        let reader = self.reader.as_mut().ok_or(CaptureError::NotInitialized)?;
        let mut data = match self.frame.take() {
            Some(f) if f.data.len() == len => f.data,
            _ => vec![0u8; len],
        };
        match reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(CaptureError::EndOfStream),
            Err(e) => return Err(e.into())
        }
        self.frame = Some(Frame::from_raw(self.width, self.height, self.width * BYTES_PER_PIXEL, self.format, data)?);
        self.frame_count += 1;
        Ok(true)
    }

    fn frame(&self) -> Option<&Frame> { self.frame.as_ref() }

    fn frame_info(&self) -> Option<FrameInfo> {
        self.reader.as_ref()?;
        Some(FrameInfo { width: self.width, height: self.height, refresh_rate: self.refresh_rate, frame_count: self.frame_count })
    }

    fn release(&mut self) {
        self.reader = None;
    }
}

/// Presentation sink writing frames in the same layout the source reads
pub struct RawFileSink {
    writer: BufWriter<File>,
    frames: u64,
}

impl RawFileSink {
    pub fn create(path: &str) -> std::io::Result<Self> {
        Ok(Self { writer: BufWriter::new(File::create(path)?), frames: 0 })
    }

    pub fn write(&mut self, frame: &Frame) -> std::io::Result<()> {
        for y in 0..frame.height {
            self.writer.write_all(frame.row(y))?;
        }
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u64 { self.frames }

    pub fn finish(mut self) -> std::io::Result<u64> {
        self.writer.flush()?;
        Ok(self.frames)
    }
}
