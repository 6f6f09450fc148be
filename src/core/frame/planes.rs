// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use nalgebra::Vector4;
use super::{ Frame, PixelType };

/// Three f32 color planes (R, G, B) plus the untouched alpha channel
#[derive(Debug, Clone, PartialEq)]
pub struct FloatPlanes {
    pub width: usize,
    pub height: usize,
    pub channels: [Vec<f32>; 3],
    pub alpha: Vec<u8>,
}

impl FloatPlanes {
    pub fn new(width: usize, height: usize) -> Self {
        let n = width * height;
        Self { width, height, channels: [vec![0.0; n], vec![0.0; n], vec![0.0; n]], alpha: vec![255; n] }
    }

    /// Same size and alpha, zeroed colors
    pub fn zeroed_like(other: &FloatPlanes) -> Self {
        let n = other.width * other.height;
        Self { width: other.width, height: other.height, channels: [vec![0.0; n], vec![0.0; n], vec![0.0; n]], alpha: other.alpha.clone() }
    }

    pub fn size(&self) -> (usize, usize) { (self.width, self.height) }

    pub(super) fn read<T: PixelType>(frame: &Frame) -> Self {
        let mut out = Self::new(frame.width, frame.height);
        for y in 0..frame.height {
            let row: &[T] = bytemuck::cast_slice(frame.row(y));
            for (x, px) in row.iter().enumerate() {
                let v = T::to_float(*px);
                let i = y * frame.width + x;
                out.channels[0][i] = v[0];
                out.channels[1][i] = v[1];
                out.channels[2][i] = v[2];
                out.alpha[i] = v[3] as u8;
            }
        }
        out
    }

    pub(super) fn write<T: PixelType>(&self, frame: &mut Frame) {
        let width = self.width;
        for y in 0..self.height {
            let row: &mut [T] = bytemuck::cast_slice_mut(frame.row_mut(y));
            for (x, px) in row.iter_mut().enumerate() {
                let i = y * width + x;
                *px = T::from_float(Vector4::new(self.channels[0][i], self.channels[1][i], self.channels[2][i], self.alpha[i] as f32));
            }
        }
    }

    #[inline]
    pub fn get(&self, c: usize, x: usize, y: usize) -> f32 {
        self.channels[c][y * self.width + x]
    }

    /// Edge pixels are repeated outside of the frame
    #[inline]
    pub fn get_clamped(&self, c: usize, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.channels[c][y * self.width + x]
    }

    pub fn bilinear(&self, c: usize, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as isize, y0 as isize);
        let top    = self.get_clamped(c, x0, y0)     * (1.0 - fx) + self.get_clamped(c, x0 + 1, y0)     * fx;
        let bottom = self.get_clamped(c, x0, y0 + 1) * (1.0 - fx) + self.get_clamped(c, x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    pub fn clamp_to_u8_range(&mut self) {
        for ch in self.channels.iter_mut() {
            for v in ch.iter_mut() {
                *v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 255.0) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_interpolates_and_clamps() {
        let mut p = FloatPlanes::new(2, 2);
        p.channels[0] = vec![0.0, 10.0, 20.0, 30.0];
        assert_eq!(p.bilinear(0, 0.5, 0.0), 5.0);
        assert_eq!(p.bilinear(0, 0.5, 0.5), 15.0);
        assert_eq!(p.bilinear(0, -3.0, -3.0), 0.0);
        assert_eq!(p.bilinear(0, 5.0, 5.0), 30.0);
    }
}
