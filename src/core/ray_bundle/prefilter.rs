// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use super::{ RayBundle, RayLUT };
use crate::frame::FloatPlanes;

/// Bundles with equal sharpening are accumulated together and sharpened once.
/// The unsharp mask is linear, so the result matches sharpening each bundle separately.
struct Group {
    bundle: RayBundle,
    accum: FloatPlanes,
}

pub fn apply(planes: FloatPlanes, lut: &RayLUT, unsharp_amount: f64) -> FloatPlanes {
    if lut.bundles.is_empty() || lut.is_identity() {
        return planes;
    }
    let (w, h) = planes.size();
    let mut groups: Vec<Group> = Vec::new();

    for b in &lut.bundles {
        let idx = match groups.iter().position(|g| g.bundle.kx == b.kx && g.bundle.ky == b.ky && g.bundle.theta_deg == b.theta_deg) {
            Some(i) => i,
            None => {
                groups.push(Group { bundle: *b, accum: FloatPlanes::zeroed_like(&planes) });
                groups.len() - 1
            }
        };
        let accum = &mut groups[idx].accum;
        let weight = b.weight as f32;
        let (dx, dy) = (b.dx as f32, b.dy as f32);
        for c in 0..3 {
            let dst = &mut accum.channels[c];
            if !b.has_offset() {
                dst.iter_mut().zip(&planes.channels[c]).for_each(|(d, s)| *d += weight * s);
                continue;
            }
            for y in 0..h {
                for x in 0..w {
                    dst[y * w + x] += weight * planes.bilinear(c, x as f32 + dx, y as f32 + dy);
                }
            }
        }
    }

    let mut out = FloatPlanes::zeroed_like(&planes);
    for g in groups {
        let sharpened = g.bundle.unsharp(unsharp_amount).apply(&g.accum);
        for (o, s) in out.channels.iter_mut().zip(&sharpened.channels) {
            o.iter_mut().zip(s).for_each(|(o, s)| *o += s);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prescription::ViewingContext;
    use crate::ray_bundle::{ build_lut, sharpening };
    use crate::wavefront::WavefrontApproximation;

    fn pattern(w: usize, h: usize) -> FloatPlanes {
        let mut p = FloatPlanes::new(w, h);
        for c in 0..3 {
            for (i, v) in p.channels[c].iter_mut().enumerate() {
                *v = ((i * 37 + c * 11) % 200) as f32;
            }
        }
        p.alpha.iter_mut().enumerate().for_each(|(i, a)| *a = (i % 256) as u8);
        p
    }

    #[test]
    fn identity_lut_returns_input() {
        let p = pattern(13, 9);
        assert_eq!(apply(p.clone(), &RayLUT::identity(), 0.6), p);
    }

    #[test]
    fn flat_field_stays_flat() {
        let wf = WavefrontApproximation { defocus_d: -4.0, astig_magnitude_d: 1.0, astig_axis_deg: 30.0, pupil_radius_mm: 3.0 };
        let lut = build_lut(&wf, &ViewingContext::default(), 0.7, 7);
        let mut p = FloatPlanes::new(20, 16);
        p.channels.iter_mut().for_each(|c| c.fill(90.0));
        let out = apply(p, &lut, 0.6);
        assert!(out.channels.iter().flatten().all(|v| (v - 90.0).abs() < 1e-3));
    }

    #[test]
    fn alpha_is_carried_through() {
        let wf = WavefrontApproximation { defocus_d: -2.0, astig_magnitude_d: 0.0, astig_axis_deg: 0.0, pupil_radius_mm: 2.5 };
        let lut = build_lut(&wf, &ViewingContext::default(), 0.4, 5);
        let p = pattern(10, 10);
        let out = apply(p.clone(), &lut, 0.6);
        assert_eq!(out.alpha, p.alpha);
        assert_ne!(out.channels, p.channels);
    }

    #[test]
    fn offset_bundle_shifts_the_image() {
        let lut = RayLUT {
            bundles: vec![
                RayBundle { dx: 0.5, dy: 0.0, kx: 1.0, ky: 1.0, theta_deg: 0.0, weight: 1.0 },
                RayBundle { dx: 0.0, dy: 0.0, kx: 1.0, ky: 1.0, theta_deg: 0.0, weight: 0.0 },
            ],
            num_bundles: 2,
            pupil_mm: 2.5,
            delta_d: 0.5,
        };
        let mut p = FloatPlanes::new(4, 1);
        p.channels.iter_mut().for_each(|c| c.copy_from_slice(&[0.0, 10.0, 20.0, 30.0]));
        let out = apply(p, &lut, 0.0);
        assert_eq!(out.channels[0], vec![5.0, 15.0, 25.0, 30.0]);
    }

    fn sharpening_lut(axis: f64) -> RayLUT {
        let (kx, ky) = sharpening(0.5, 2.0);
        let bundle = RayBundle { dx: 0.0, dy: 0.0, kx, ky, theta_deg: axis, weight: 0.5 };
        RayLUT { bundles: vec![bundle, bundle], num_bundles: 2, pupil_mm: 2.5, delta_d: 0.5 }
    }

    fn edge(w: usize, h: usize, inside: impl Fn(usize, usize) -> bool) -> FloatPlanes {
        let mut p = FloatPlanes::new(w, h);
        for c in p.channels.iter_mut() {
            for y in 0..h {
                for x in 0..w {
                    c[y * w + x] = if inside(x, y) { 150.0 } else { 50.0 };
                }
            }
        }
        p
    }

    fn interior_max(p: &FloatPlanes) -> f32 {
        let (w, h) = p.size();
        let mut m = f32::MIN;
        for y in 4..h - 4 {
            for x in 4..w - 4 {
                m = m.max(p.get(0, x, y));
            }
        }
        m
    }

    #[test]
    fn sharpening_rotates_with_the_axis() {
        let n = 16;
        let x_edge = apply(edge(n, n, |x, _| x >= 8), &sharpening_lut(90.0), 0.6);
        let y_edge = apply(edge(n, n, |_, y| y >= 8), &sharpening_lut(0.0), 0.6);
        for y in 0..n {
            for x in 0..n {
                assert!((x_edge.get(0, x, y) - y_edge.get(0, y, x)).abs() < 1e-3);
            }
        }
        // Same edge, other axis: the meridians swap
        let x_edge_axis0 = apply(edge(n, n, |x, _| x >= 8), &sharpening_lut(0.0), 0.6);
        assert!((x_edge.get(0, 8, 8) - x_edge_axis0.get(0, 8, 8)).abs() > 1.0);
    }

    #[test]
    fn oblique_axis_sharpens_diagonals_differently() {
        let n = 32;
        let lut = sharpening_lut(45.0);
        let a = apply(edge(n, n, |x, y| x + y >= n), &lut, 0.6);
        let b = apply(edge(n, n, |x, y| x >= y), &lut, 0.6);
        assert!((interior_max(&a) - interior_max(&b)).abs() > 1.0);
    }
}
