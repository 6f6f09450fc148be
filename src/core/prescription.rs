// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use serde::{ Serialize, Deserialize };

pub const SPHERE_LIMIT_D: f64 = 20.0;
pub const CYLINDER_LIMIT_D: f64 = 10.0;
pub const DEFAULT_PPI: f64 = 96.0;
pub const DEFAULT_DISTANCE_CM: f64 = 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub sphere_d: f64,
    pub cylinder_d: Option<f64>,
    pub axis_deg: Option<f64>, // 0-180
}

impl Prescription {
    pub fn new(sphere_d: f64, cylinder_d: Option<f64>, axis_deg: Option<f64>) -> Self {
        Self { sphere_d, cylinder_d, axis_deg }
    }
    pub fn sphere(sphere_d: f64) -> Self {
        Self { sphere_d, cylinder_d: None, axis_deg: None }
    }

    /// Malformed values are clamped, never rejected
    pub fn sanitized(&self) -> Self {
        let sphere_d = if self.sphere_d.is_finite() { self.sphere_d.clamp(-SPHERE_LIMIT_D, SPHERE_LIMIT_D) } else { 0.0 };
        let cylinder_d = self.cylinder_d.map(|c| if c.is_finite() { c.clamp(-CYLINDER_LIMIT_D, CYLINDER_LIMIT_D) } else { 0.0 });
        let axis_deg = self.axis_deg.map(normalize_axis);
        if sphere_d != self.sphere_d || cylinder_d != self.cylinder_d || axis_deg != self.axis_deg {
            log::warn!("Prescription clamped: {:?} -> sphere {sphere_d}, cylinder {cylinder_d:?}, axis {axis_deg:?}", self);
        }
        Self { sphere_d, cylinder_d, axis_deg }
    }

    pub fn cylinder_or_zero(&self) -> f64 { self.cylinder_d.unwrap_or(0.0) }
    pub fn axis_or_zero(&self) -> f64 { self.axis_deg.unwrap_or(0.0) }
}

/// Wraps any angle into [0, 180). NaN maps to 0.
pub fn normalize_axis(axis_deg: f64) -> f64 {
    if !axis_deg.is_finite() { return 0.0; }
    let a = axis_deg.rem_euclid(180.0);
    if a >= 180.0 { 0.0 } else { a }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewingContext {
    pub distance_cm: f64,
    pub display_ppi: f64,
    pub ambient_light: Option<u8>,
}

impl Default for ViewingContext {
    fn default() -> Self {
        Self { distance_cm: DEFAULT_DISTANCE_CM, display_ppi: DEFAULT_PPI, ambient_light: None }
    }
}

impl ViewingContext {
    pub fn distance_m(&self) -> f64 {
        if self.distance_cm.is_finite() && self.distance_cm > 0.0 { self.distance_cm / 100.0 } else { DEFAULT_DISTANCE_CM / 100.0 }
    }
    pub fn pixel_size_m(&self) -> f64 {
        let ppi = if self.display_ppi.is_finite() && self.display_ppi > 0.0 { self.display_ppi } else { DEFAULT_PPI };
        0.0254 / ppi
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayProfile {
    pub ppi: Option<f64>,
    pub width: usize,
    pub height: usize,
    pub diagonal_inches: Option<f64>,
}

impl Default for DisplayProfile {
    fn default() -> Self {
        Self { ppi: None, width: 1920, height: 1080, diagonal_inches: None }
    }
}

impl DisplayProfile {
    /// Explicit PPI if valid, otherwise derived from the resolution and the diagonal
    pub fn effective_ppi(&self) -> f64 {
        if let Some(ppi) = self.ppi.filter(|p| p.is_finite() && *p > 0.0) {
            return ppi;
        }
        if let Some(diag) = self.diagonal_inches.filter(|d| d.is_finite() && *d > 0.0) {
            let px = ((self.width * self.width + self.height * self.height) as f64).sqrt();
            if px > 0.0 {
                return px / diag;
            }
        }
        DEFAULT_PPI
    }
}

/// Read-only user profile as stored by the external persistence layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Profile {
    pub sphere_d: f64,
    pub cylinder_d: Option<f64>,
    pub axis_deg: Option<f64>,
    #[serde(rename = "displayPPI")]
    pub display_ppi: Option<f64>,
    pub width: usize,
    pub height: usize,
    pub diagonal_inches: Option<f64>,
}

impl Profile {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn prescription(&self) -> Prescription {
        Prescription::new(self.sphere_d, self.cylinder_d, self.axis_deg).sanitized()
    }

    pub fn display(&self) -> DisplayProfile {
        let fallback = DisplayProfile::default();
        DisplayProfile {
            ppi: self.display_ppi,
            width: if self.width > 0 { self.width } else { fallback.width },
            height: if self.height > 0 { self.height } else { fallback.height },
            diagonal_inches: self.diagonal_inches,
        }
    }
}
