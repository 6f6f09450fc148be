// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

mod pixel_formats;
mod planes;
pub use pixel_formats::*;
pub use planes::FloatPlanes;

use serde::{ Serialize, Deserialize };

pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    #[default]
    Rgba8,
    Bgra8,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame has zero size ({0}x{1})")]                  ZeroSize(usize, usize),
    #[error("Stride {stride} is smaller than a row of {row} bytes")] StrideTooSmall { stride: usize, row: usize },
    #[error("Buffer has {len} bytes, expected at least {expected}")] BufferTooSmall { len: usize, expected: usize },
    #[error("Size mismatch: {0:?} != {1:?}")]                  SizeMismatch((usize, usize), (usize, usize)),
}

/// Packed 8-bit RGBA/BGRA frame with an arbitrary row pitch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        let stride = width * BYTES_PER_PIXEL;
        Self { width, height, stride, format, data: vec![0; stride * height] }
    }

    pub fn from_raw(width: usize, height: usize, stride: usize, format: PixelFormat, data: Vec<u8>) -> Result<Self, FrameError> {
        let frame = Self { width, height, stride, format, data };
        frame.validate()?;
        Ok(frame)
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::ZeroSize(self.width, self.height));
        }
        let row = self.width * BYTES_PER_PIXEL;
        if self.stride < row {
            return Err(FrameError::StrideTooSmall { stride: self.stride, row });
        }
        // Last row doesn't need the padding
        let expected = self.stride * (self.height - 1) + row;
        if self.data.len() < expected {
            return Err(FrameError::BufferTooSmall { len: self.data.len(), expected });
        }
        Ok(())
    }

    pub fn size(&self) -> (usize, usize) { (self.width, self.height) }

    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width * BYTES_PER_PIXEL]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        let len = self.width * BYTES_PER_PIXEL;
        &mut self.data[start..start + len]
    }

    pub fn to_planes(&self) -> Result<FloatPlanes, FrameError> {
        self.validate()?;
        Ok(match self.format {
            PixelFormat::Rgba8 => FloatPlanes::read::<RGBA8>(self),
            PixelFormat::Bgra8 => FloatPlanes::read::<BGRA8>(self),
        })
    }

    /// Writes the color planes back. Alpha comes from the planes, which carry it through untouched.
    pub fn write_planes(&mut self, planes: &FloatPlanes) -> Result<(), FrameError> {
        self.validate()?;
        if planes.size() != self.size() {
            return Err(FrameError::SizeMismatch(planes.size(), self.size()));
        }
        match self.format {
            PixelFormat::Rgba8 => planes.write::<RGBA8>(self),
            PixelFormat::Bgra8 => planes.write::<BGRA8>(self),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn gradient_frame(width: usize, height: usize, format: PixelFormat) -> Frame {
        let mut f = Frame::new(width, height, format);
        for y in 0..height {
            for (x, px) in f.row_mut(y).chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&[(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8, 200]);
            }
        }
        f
    }

    #[test]
    fn validation() {
        assert_eq!(Frame::from_raw(0, 4, 0, PixelFormat::Rgba8, vec![]), Err(FrameError::ZeroSize(0, 4)));
        assert_eq!(Frame::from_raw(4, 4, 8, PixelFormat::Rgba8, vec![0; 64]), Err(FrameError::StrideTooSmall { stride: 8, row: 16 }));
        assert_eq!(Frame::from_raw(4, 4, 20, PixelFormat::Rgba8, vec![0; 70]), Err(FrameError::BufferTooSmall { len: 70, expected: 76 }));
        assert!(Frame::from_raw(4, 4, 20, PixelFormat::Rgba8, vec![0; 76]).is_ok());
    }

    #[test]
    fn planes_roundtrip_is_lossless() {
        for format in [PixelFormat::Rgba8, PixelFormat::Bgra8] {
            let f = gradient_frame(13, 7, format);
            let planes = f.to_planes().unwrap();
            let mut out = Frame::new(13, 7, format);
            out.write_planes(&planes).unwrap();
            assert_eq!(out, f);
        }
    }

    #[test]
    fn padded_stride() {
        let mut data = vec![9u8; 3 * 12 + 8];
        data[12..16].copy_from_slice(&[1, 2, 3, 4]);
        let f = Frame::from_raw(2, 3, 12, PixelFormat::Bgra8, data).unwrap();
        let planes = f.to_planes().unwrap();
        assert_eq!(planes.get(0, 0, 1), 3.0);
        assert_eq!(planes.get(2, 0, 1), 1.0);
        assert_eq!(planes.alpha[2], 4);
    }
}
