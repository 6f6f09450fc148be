// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright © 2026 Kacamata contributors

use nalgebra::Vector4;
use super::PixelFormat;

/// Packed 8-bit 4-channel pixel. Conversions always use R, G, B, A order.
pub trait PixelType: Default + Copy + Send + Sync + bytemuck::Pod {
    const COUNT: usize = 4;
    const FORMAT: PixelFormat;

    fn to_float(v: Self) -> Vector4<f32>;
    fn from_float(v: Vector4<f32>) -> Self;
}

#[inline]
fn sat(v: f32) -> u8 {
    if v.is_nan() { 0 } else { v.round().clamp(0.0, 255.0) as u8 }
}

#[repr(C)] #[derive(Default, Clone, Copy, PartialEq, Eq, Debug)] pub struct RGBA8(pub u8, pub u8, pub u8, pub u8);
#[repr(C)] #[derive(Default, Clone, Copy, PartialEq, Eq, Debug)] pub struct BGRA8(pub u8, pub u8, pub u8, pub u8);

unsafe impl bytemuck::Zeroable for RGBA8 { }
unsafe impl bytemuck::Pod for RGBA8 { }
impl PixelType for RGBA8 {
    const FORMAT: PixelFormat = PixelFormat::Rgba8;
    #[inline] fn to_float(v: Self) -> Vector4<f32> { Vector4::new(v.0 as f32, v.1 as f32, v.2 as f32, v.3 as f32) }
    #[inline] fn from_float(v: Vector4<f32>) -> Self { Self(sat(v[0]), sat(v[1]), sat(v[2]), sat(v[3])) }
}
unsafe impl bytemuck::Zeroable for BGRA8 { }
unsafe impl bytemuck::Pod for BGRA8 { }
impl PixelType for BGRA8 {
    const FORMAT: PixelFormat = PixelFormat::Bgra8;
    #[inline] fn to_float(v: Self) -> Vector4<f32> { Vector4::new(v.2 as f32, v.1 as f32, v.0 as f32, v.3 as f32) }
    #[inline] fn from_float(v: Vector4<f32>) -> Self { Self(sat(v[2]), sat(v[1]), sat(v[0]), sat(v[3])) }
}
