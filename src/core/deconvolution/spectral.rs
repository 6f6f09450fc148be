// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use std::sync::Arc;
use parking_lot::Mutex;
use rustfft::num_complex::Complex;

use super::{ ENERGY_EPSILON, fft::Fft2d };
use crate::frame::FloatPlanes;
use crate::psf::Kernel;

/// Wiener response for one frame size
pub struct SpectralResponse {
    pub frame: (usize, usize),
    pub padded: (usize, usize),
    fft: Fft2d,
    /// `None` for a channel whose response has no DC energy
    channels: [Option<Arc<Vec<Complex<f32>>>>; 3],
}

/// Full 2-D Wiener filter for kernels that don't split into two 1-D passes
pub struct SpectralWiener {
    kernel: Kernel,
    lambdas: [f64; 3],
    cache: Mutex<Option<Arc<SpectralResponse>>>,
}

impl std::fmt::Debug for SpectralWiener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralWiener")
            .field("sigma_x", &self.kernel.sigma_x)
            .field("sigma_y", &self.kernel.sigma_y)
            .field("theta_deg", &self.kernel.theta_deg)
            .field("lambdas", &self.lambdas)
            .finish()
    }
}

fn wiener_response(fft: &Fft2d, kernel: &Kernel, lambda: f64) -> Option<Vec<Complex<f32>>> {
    let (w, h) = fft.size();
    let mut spectrum: Vec<Complex<f32>> = kernel.sample_wrapped(w, h).into_iter().map(|v| Complex::new(v as f32, 0.0)).collect();
    fft.forward(&mut spectrum);

    let lambda = lambda as f32;
    spectrum.iter_mut().for_each(|h| *h = h.conj() / (h.norm_sqr() + lambda));

    // Unit gain at DC so flat areas keep their brightness
    let dc = spectrum[0].re;
    if !dc.is_finite() || (dc.abs() as f64) < ENERGY_EPSILON {
        return None;
    }
    spectrum.iter_mut().for_each(|v| *v /= dc);
    Some(spectrum)
}

impl SpectralWiener {
    pub fn new(kernel: Kernel, lambdas: [f64; 3]) -> Self {
        Self { kernel, lambdas, cache: Mutex::new(None) }
    }

    pub fn padding(&self) -> usize { self.kernel.radius() }

    pub fn cached(&self) -> Option<Arc<SpectralResponse>> {
        self.cache.lock().clone()
    }

    pub fn same_filter(&self, other: &SpectralWiener) -> bool {
        self.kernel == other.kernel && self.lambdas == other.lambdas
    }

    /// Takes over the response `previous` built for its last frame, or builds one for that frame size.
    /// Keeps the first frame after a model swap off the FFT setup path.
    pub fn warm_from(&self, previous: &SpectralWiener) {
        let Some(seen) = previous.cached() else { return };
        if self.same_filter(previous) {
            *self.cache.lock() = Some(seen);
        } else {
            self.response(seen.frame.0, seen.frame.1);
        }
    }

    /// Response for a `width`×`height` frame, built on first use
    pub fn response(&self, width: usize, height: usize) -> Arc<SpectralResponse> {
        let r = self.padding();
        let (padded_w, padded_h) = (width + 2 * r, height + 2 * r);
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.padded == (padded_w, padded_h) {
                return cached.clone();
            }
        }
        let fft = Fft2d::new(padded_w, padded_h);
        let mut channels: [Option<Arc<Vec<Complex<f32>>>>; 3] = [None, None, None];
        for c in 0..3 {
            // Reuse the response of an earlier channel with the same lambda
            if let Some(prev) = (0..c).find(|&p| self.lambdas[p] == self.lambdas[c]) {
                channels[c] = channels[prev].clone();
                continue;
            }
            channels[c] = wiener_response(&fft, &self.kernel, self.lambdas[c]).map(Arc::new);
            if channels[c].is_none() {
                log::warn!("2-D Wiener response has no energy for channel {c}, passing it through");
            }
        }
        log::debug!("Built 2-D Wiener response for {padded_w}x{padded_h}");
        let response = Arc::new(SpectralResponse { frame: (width, height), padded: (padded_w, padded_h), fft, channels });
        *cache = Some(response.clone());
        response
    }

    pub fn apply(&self, planes: &FloatPlanes) -> FloatPlanes {
        let (w, h) = planes.size();
        let r = self.padding();
        let response = self.response(w, h);
        let (pw, ph) = response.padded;

        let mut out = FloatPlanes::zeroed_like(planes);
        let mut buf = vec![Complex::new(0.0f32, 0.0); pw * ph];
        for c in 0..3 {
            let Some(wiener) = &response.channels[c] else {
                out.channels[c].copy_from_slice(&planes.channels[c]);
                continue;
            };
            for y in 0..ph {
                for x in 0..pw {
                    buf[y * pw + x] = Complex::new(planes.get_clamped(c, x as isize - r as isize, y as isize - r as isize), 0.0);
                }
            }
            response.fft.forward(&mut buf);
            buf.iter_mut().zip(wiener.iter()).for_each(|(v, w)| *v *= *w);
            response.fft.inverse(&mut buf);
            for y in 0..h {
                let src = &buf[(y + r) * pw + r..(y + r) * pw + r + w];
                for (o, v) in out.channels[c][y * w..(y + 1) * w].iter_mut().zip(src) {
                    *o = v.re;
                }
            }
        }
        out
    }
}
