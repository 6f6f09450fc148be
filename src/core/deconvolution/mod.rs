// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

//! Wiener deconvolution: W(f) = H*(f) / (|H(f)|² + λ)
//!
//! Separable kernels get two 1-D inverse filters computed through a real FFT,
//! everything else goes through a 2-D spectral filter or, when configured, an
//! anisotropic unsharp mask.

pub mod fft;
pub mod separable;
pub mod spectral;
pub mod unsharp;
pub mod post_process;

use rustfft::num_complex::Complex;

use crate::config::NonSeparableMode;
use crate::frame::FloatPlanes;
use crate::psf::Kernel;
use spectral::SpectralWiener;
use unsharp::AnisotropicUnsharp;

pub const LAMBDA_MIN: f64 = 0.001;
pub const LAMBDA_MAX: f64 = 0.1;
pub const LAMBDA_DEFAULT: f64 = 0.02;
pub const LAMBDA_STEP: f64 = 0.002;

/// Below this the filter energy is considered gone
pub const ENERGY_EPSILON: f64 = 1e-6;

/// Chromatic focus shift: red focuses behind green, blue in front
pub const CHANNEL_LAMBDA_SCALE: [f64; 3] = [1.05, 1.0, 0.95];

pub fn clamp_lambda(lambda: f64) -> f64 {
    if !lambda.is_finite() {
        log::warn!("Invalid lambda {lambda}, using {LAMBDA_DEFAULT}");
        return LAMBDA_DEFAULT;
    }
    lambda.clamp(LAMBDA_MIN, LAMBDA_MAX)
}

/// Lambda mapped to [0, 1] over its valid range
pub fn lambda_t(lambda: f64) -> f64 {
    (clamp_lambda(lambda) - LAMBDA_MIN) / (LAMBDA_MAX - LAMBDA_MIN)
}

pub fn channel_lambdas(lambda: f64, per_channel: bool) -> [f64; 3] {
    let lambda = clamp_lambda(lambda);
    if !per_channel {
        return [lambda; 3];
    }
    CHANNEL_LAMBDA_SCALE.map(|s| clamp_lambda(lambda * s))
}

/// 1-D inverse filter with Σ|taps| = 1. `dc_gain` is Σtaps, divided out when applied.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseTaps {
    pub taps: Vec<f64>,
    pub dc_gain: f64,
}

impl InverseTaps {
    pub fn identity() -> Self {
        Self { taps: vec![1.0], dc_gain: 1.0 }
    }

    pub fn is_identity(&self) -> bool {
        self.taps.len() == 1
    }

    /// Taps ready for convolution, with unit gain on flat regions
    pub fn effective(&self) -> Vec<f32> {
        self.taps.iter().map(|t| (t / self.dc_gain) as f32).collect()
    }
}

/// Inverse of the centered `forward` taps. Returns `None` when the result has no usable energy.
pub fn inverse_taps(forward: &[f64], lambda: f64) -> Option<InverseTaps> {
    let size = forward.len();
    if size <= 1 {
        return Some(InverseTaps::identity());
    }
    let lambda = clamp_lambda(lambda);
    let n = (4 * size).max(64).next_power_of_two();
    let half = (size / 2) as isize;

    let mut signal = vec![0.0; n];
    for (i, &v) in forward.iter().enumerate() {
        signal[(i as isize - half).rem_euclid(n as isize) as usize] = v;
    }

    let response: Vec<Complex<f64>> = fft::forward_real(&signal)
        .into_iter()
        .map(|h| h.conj() / (h.norm_sqr() + lambda))
        .collect();
    let spatial = fft::inverse_real(&response);

    let reach = size as isize - 1;
    let taps: Vec<f64> = (-reach..=reach).map(|i| spatial[i.rem_euclid(n as isize) as usize]).collect();

    let abs_sum: f64 = taps.iter().map(|t| t.abs()).sum();
    if !abs_sum.is_finite() || abs_sum < ENERGY_EPSILON {
        return None;
    }
    let taps: Vec<f64> = taps.into_iter().map(|t| t / abs_sum).collect();
    let dc_gain: f64 = taps.iter().sum();
    if dc_gain.abs() < ENERGY_EPSILON {
        return None;
    }
    Some(InverseTaps { taps, dc_gain })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeparablePass {
    pub horiz: InverseTaps,
    pub vert: InverseTaps,
}

impl SeparablePass {
    pub fn build(kernel: &Kernel, lambda: f64) -> Option<Self> {
        Some(Self {
            horiz: inverse_taps(&kernel.horizontal_taps(), lambda)?,
            vert: inverse_taps(&kernel.vertical_taps(), lambda)?,
        })
    }

    pub fn apply(&self, src: &[f32], width: usize, height: usize) -> Vec<f32> {
        separable::convolve_separable(src, width, height, &self.horiz.effective(), &self.vert.effective())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOptions {
    pub per_channel_lambda: bool,
    pub non_separable: NonSeparableMode,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self { per_channel_lambda: false, non_separable: NonSeparableMode::Wiener2d }
    }
}

#[derive(Debug)]
pub enum WienerFilter {
    Identity,
    /// One pass per color channel
    Separable(Box<[SeparablePass; 3]>),
    Spectral {
        wiener: SpectralWiener,
        /// Unsharp mask used above this many pixels
        fallback: Option<(usize, AnisotropicUnsharp)>,
    },
    Unsharp(AnisotropicUnsharp),
}

impl WienerFilter {
    pub fn build(kernel: &Kernel, lambda: f64, opts: &FilterOptions) -> Self {
        if kernel.is_negligible() {
            return Self::Identity;
        }
        let lambdas = channel_lambdas(lambda, opts.per_channel_lambda);

        if kernel.separable {
            let passes = [
                SeparablePass::build(kernel, lambdas[0]),
                SeparablePass::build(kernel, lambdas[1]),
                SeparablePass::build(kernel, lambdas[2]),
            ];
            return match passes {
                [Some(r), Some(g), Some(b)] => Self::Separable(Box::new([r, g, b])),
                _ => {
                    log::warn!("Inverse filter has no energy (sigma {:.3}x{:.3}, lambda {lambda}), using identity", kernel.sigma_x, kernel.sigma_y);
                    Self::Identity
                }
            };
        }

        let unsharp = || AnisotropicUnsharp::for_kernel(kernel, lambdas[1]);
        match opts.non_separable {
            NonSeparableMode::UnsharpMask => Self::Unsharp(unsharp()),
            NonSeparableMode::Wiener2d => Self::Spectral { wiener: SpectralWiener::new(kernel.clone(), lambdas), fallback: None },
            NonSeparableMode::Auto { max_fft_pixels } => Self::Spectral {
                wiener: SpectralWiener::new(kernel.clone(), lambdas),
                fallback: Some((max_fft_pixels, unsharp())),
            },
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// 1-D inverse taps of the green channel, as stored on the kernel
    pub fn kernel_inverse(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        match self {
            Self::Identity => Some((vec![1.0], vec![1.0])),
            Self::Separable(passes) => Some((passes[1].horiz.taps.clone(), passes[1].vert.taps.clone())),
            _ => None,
        }
    }

    /// Prepares the 2-D response for the frame size `previous` last processed
    pub fn warm_from(&self, previous: &WienerFilter) {
        let (Self::Spectral { wiener, fallback }, Self::Spectral { wiener: prev, .. }) = (self, previous) else { return };
        if let (Some((max_pixels, _)), Some(seen)) = (fallback, prev.cached()) {
            if seen.frame.0 * seen.frame.1 > *max_pixels {
                return;
            }
        }
        wiener.warm_from(prev);
    }

    pub fn apply(&self, planes: FloatPlanes) -> FloatPlanes {
        let (w, h) = planes.size();
        match self {
            Self::Identity => planes,
            Self::Separable(passes) => {
                let mut out = FloatPlanes::zeroed_like(&planes);
                for (c, pass) in passes.iter().enumerate() {
                    out.channels[c] = pass.apply(&planes.channels[c], w, h);
                }
                out
            }
            Self::Spectral { fallback: Some((max_pixels, unsharp)), .. } if w * h > *max_pixels => unsharp.apply(&planes),
            Self::Spectral { wiener, .. } => wiener.apply(&planes),
            Self::Unsharp(unsharp) => unsharp.apply(&planes),
        }
    }
}
