// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use crate::prescription::DEFAULT_DISTANCE_CM;

pub const DISTANCE_MIN_CM: f64 = 15.0;
pub const DISTANCE_MAX_CM: f64 = 200.0;

/// Exponential moving average of the estimated viewing distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSmoother {
    pub alpha: f64,
    value: Option<f64>,
}

impl Default for DistanceSmoother {
    fn default() -> Self { Self::new(0.2) }
}

impl DistanceSmoother {
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_finite() { alpha.clamp(0.01, 1.0) } else { 0.2 };
        Self { alpha, value: None }
    }

    /// Returns false if the sample was rejected
    pub fn push(&mut self, distance_cm: f64) -> bool {
        if !distance_cm.is_finite() || distance_cm <= 0.0 {
            log::warn!("Ignoring distance sample {distance_cm}");
            return false;
        }
        let d = distance_cm.clamp(DISTANCE_MIN_CM, DISTANCE_MAX_CM);
        self.value = Some(match self.value {
            Some(prev) => prev + self.alpha * (d - prev),
            None => d,
        });
        true
    }

    pub fn value(&self) -> f64 {
        self.value.unwrap_or(DEFAULT_DISTANCE_CM)
    }

    pub fn has_samples(&self) -> bool { self.value.is_some() }

    pub fn reset(&mut self) { self.value = None; }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_initializes() {
        let mut s = DistanceSmoother::default();
        assert_eq!(s.value(), DEFAULT_DISTANCE_CM);
        assert!(s.push(40.0));
        assert_eq!(s.value(), 40.0);
        assert!(s.push(50.0));
        assert!((s.value() - 42.0).abs() < 1e-12);
    }

    #[test]
    fn noisy_samples_are_damped() {
        let mut s = DistanceSmoother::default();
        s.push(60.0);
        for i in 0..50 {
            s.push(if i % 2 == 0 { 50.0 } else { 70.0 });
        }
        assert!((s.value() - 60.0).abs() < 2.5);
    }

    #[test]
    fn invalid_samples_are_ignored_or_clamped() {
        let mut s = DistanceSmoother::new(1.0);
        assert!(!s.push(f64::NAN));
        assert!(!s.push(0.0));
        assert!(!s.push(-5.0));
        assert!(!s.has_samples());
        assert!(s.push(3.0));
        assert_eq!(s.value(), DISTANCE_MIN_CM);
        assert!(s.push(1000.0));
        assert_eq!(s.value(), DISTANCE_MAX_CM);
        s.reset();
        assert_eq!(s.value(), DEFAULT_DISTANCE_CM);
    }
}
