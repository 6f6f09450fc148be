// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

pub mod raw_file;
pub mod synthetic;

use kacamata_core::capture::{ CaptureError, FrameInfo, FrameSource };
use kacamata_core::Frame;

pub use raw_file::{ RawFileSource, RawFileSink };
pub use synthetic::SyntheticSource;

pub enum Source {
    RawFile(RawFileSource),
    Synthetic(SyntheticSource),
}

macro_rules! dispatch {
    ($self:ident, $s:ident => $e:expr) => {
        match $self {
            Source::RawFile($s) => $e,
            Source::Synthetic($s) => $e,
        }
    };
}

impl FrameSource for Source {
    fn initialize(&mut self, output_index: usize) -> Result<(), CaptureError> { dispatch!(self, s => s.initialize(output_index)) }
    fn try_acquire_frame(&mut self) -> Result<bool, CaptureError>             { dispatch!(self, s => s.try_acquire_frame()) }
    fn frame(&self) -> Option<&Frame>                                         { dispatch!(self, s => s.frame()) }
    fn frame_info(&self) -> Option<FrameInfo>                                 { dispatch!(self, s => s.frame_info()) }
    fn release(&mut self)                                                     { dispatch!(self, s => s.release()) }
}
