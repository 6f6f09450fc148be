// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

//! 1-D convolution passes over f32 planes. Border pixels are sampled with
//! clamped coordinates, nothing wraps around.

use crate::psf::gaussian_taps;

pub fn convolve_rows(src: &[f32], width: usize, height: usize, taps: &[f32]) -> Vec<f32> {
    let mut dst = vec![0.0; src.len()];
    if taps.len() == 1 {
        dst.iter_mut().zip(src).for_each(|(d, s)| *d = s * taps[0]);
        return dst;
    }
    let half = taps.len() / 2;
    let last = width as isize - 1;
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        let out = &mut dst[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0.0;
            if x >= half && x + half < width {
                let window = &row[x - half..=x + half];
                for (t, v) in taps.iter().zip(window) {
                    acc += t * v;
                }
            } else {
                for (j, t) in taps.iter().enumerate() {
                    let sx = (x as isize + j as isize - half as isize).clamp(0, last) as usize;
                    acc += t * row[sx];
                }
            }
            out[x] = acc;
        }
    }
    dst
}

pub fn convolve_cols(src: &[f32], width: usize, height: usize, taps: &[f32]) -> Vec<f32> {
    let mut dst = vec![0.0; src.len()];
    if taps.len() == 1 {
        dst.iter_mut().zip(src).for_each(|(d, s)| *d = s * taps[0]);
        return dst;
    }
    let half = taps.len() as isize / 2;
    let last = height as isize - 1;
    for y in 0..height {
        let out = &mut dst[y * width..(y + 1) * width];
        for (j, t) in taps.iter().enumerate() {
            let sy = (y as isize + j as isize - half).clamp(0, last) as usize;
            let row = &src[sy * width..(sy + 1) * width];
            for (o, v) in out.iter_mut().zip(row) {
                *o += t * v;
            }
        }
    }
    dst
}

/// Rows first, then columns
pub fn convolve_separable(src: &[f32], width: usize, height: usize, horiz: &[f32], vert: &[f32]) -> Vec<f32> {
    let tmp = convolve_rows(src, width, height, horiz);
    convolve_cols(&tmp, width, height, vert)
}

pub fn gaussian_blur(src: &[f32], width: usize, height: usize, sigma_x: f64, sigma_y: f64) -> Vec<f32> {
    let taps = |sigma: f64| -> Vec<f32> {
        let size = ((sigma * 3.0).ceil().max(1.0) as usize) * 2 + 1;
        gaussian_taps(sigma, size).into_iter().map(|v| v as f32).collect()
    };
    convolve_separable(src, width, height, &taps(sigma_x), &taps(sigma_y))
}

/// Mean over a (2r+1)² window using running sums
pub fn box_blur(src: &[f32], width: usize, height: usize, radius: usize) -> Vec<f32> {
    if radius == 0 { return src.to_vec(); }
    let tmp = box_pass(src, width, height, radius, true);
    box_pass(&tmp, width, height, radius, false)
}

fn box_pass(src: &[f32], width: usize, height: usize, radius: usize, horizontal: bool) -> Vec<f32> {
    let mut dst = vec![0.0; src.len()];
    let (len, lines) = if horizontal { (width, height) } else { (height, width) };
    let idx = |line: usize, i: usize| if horizontal { line * width + i } else { i * width + line };
    let r = radius as isize;
    let norm = 1.0 / (2 * radius + 1) as f32;
    let last = len as isize - 1;
    for line in 0..lines {
        let at = |i: isize| src[idx(line, i.clamp(0, last) as usize)];
        let mut acc: f32 = (-r..=r).map(at).sum();
        for i in 0..len as isize {
            dst[idx(line, i as usize)] = acc * norm;
            acc += at(i + r + 1) - at(i - r);
        }
    }
    dst
}
