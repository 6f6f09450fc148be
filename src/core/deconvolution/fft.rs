// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use std::sync::Arc;
use rustfft::{ Fft, FftPlanner, num_complex::Complex };

pub fn forward_real(signal: &[f64]) -> Vec<Complex<f64>> {
    let mut buf: Vec<Complex<f64>> = signal.iter().map(|&v| Complex::new(v, 0.0)).collect();
    if buf.is_empty() { return buf; }
    FftPlanner::<f64>::new().plan_fft_forward(buf.len()).process(&mut buf);
    buf
}

/// Inverse transform, scaled by 1/n, real part only
pub fn inverse_real(spectrum: &[Complex<f64>]) -> Vec<f64> {
    let mut buf = spectrum.to_vec();
    if buf.is_empty() { return Vec::new(); }
    let n = buf.len() as f64;
    FftPlanner::<f64>::new().plan_fft_inverse(buf.len()).process(&mut buf);
    buf.into_iter().map(|c| c.re / n).collect()
}

/// 2-D transform of a row-major `width`×`height` buffer by row/column decomposition
pub struct Fft2d {
    width: usize,
    height: usize,
    row_forward: Arc<dyn Fft<f32>>,
    row_inverse: Arc<dyn Fft<f32>>,
    col_forward: Arc<dyn Fft<f32>>,
    col_inverse: Arc<dyn Fft<f32>>,
}

impl Fft2d {
    pub fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            width,
            height,
            row_forward: planner.plan_fft_forward(width),
            row_inverse: planner.plan_fft_inverse(width),
            col_forward: planner.plan_fft_forward(height),
            col_inverse: planner.plan_fft_inverse(height),
        }
    }

    pub fn size(&self) -> (usize, usize) { (self.width, self.height) }

    pub fn forward(&self, data: &mut [Complex<f32>]) {
        self.run(data, &self.row_forward, &self.col_forward);
    }

    /// Inverse transform including the 1/(w·h) normalization
    pub fn inverse(&self, data: &mut [Complex<f32>]) {
        self.run(data, &self.row_inverse, &self.col_inverse);
        let scale = 1.0 / (self.width * self.height) as f32;
        data.iter_mut().for_each(|v| *v *= scale);
    }

    fn run(&self, data: &mut [Complex<f32>], rows: &Arc<dyn Fft<f32>>, cols: &Arc<dyn Fft<f32>>) {
        assert_eq!(data.len(), self.width * self.height, "Fft2d buffer size");
        // rustfft processes every `len`-sized chunk of the buffer
        rows.process(data);
        let mut transposed = transpose(data, self.width, self.height);
        cols.process(&mut transposed);
        let back = transpose(&transposed, self.height, self.width);
        data.copy_from_slice(&back);
    }
}

fn transpose(data: &[Complex<f32>], width: usize, height: usize) -> Vec<Complex<f32>> {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for y in 0..height {
        for x in 0..width {
            out[x * height + y] = data[y * width + x];
        }
    }
    out
}
