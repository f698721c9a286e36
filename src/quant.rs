//! Quantization utilities and scalar kernels.
//!
//! Quantization here is symmetric: `q = trunc(x / scale)`. The zero offset is derived so callers
//! can inspect it, but the block primitive multiplies raw signed values and never applies it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OffloadError, Result};

/// Operand role a quantization range belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Activation,
    Weight,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Activation => f.write_str("activation"),
            Role::Weight => f.write_str("weight"),
        }
    }
}

/// Caller-supplied dynamic-range hint for one operand role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantRange {
    pub bits: u32,
    pub min: f32,
    pub max: f32,
}

impl Default for QuantRange {
    fn default() -> Self { Self { bits: 8, min: -1.0, max: 1.0 } }
}

/// Derived per-call parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_offset: i32,
    pub bits_max: i32,
}

impl QuantRange {
    pub fn new(bits: u32, min: f32, max: f32) -> Self { Self { bits, min, max } }

    /// scale = (max - min) / (2^(bits-1) - 1), zero_offset = round(-min / scale).
    pub fn params(&self, role: Role) -> Result<QuantParams> {
        let invalid = || OffloadError::InvalidRange { role, bits: self.bits, min: self.min, max: self.max };
        if !(2..=31).contains(&self.bits) { return Err(invalid()); }
        let bits_max = (1i32 << (self.bits - 1)) - 1;
        let scale = (self.max - self.min) / bits_max as f32;
        if !scale.is_finite() || scale <= 0.0 { return Err(invalid()); }
        let zero_offset = (-self.min / scale).round() as i32;
        Ok(QuantParams { scale, zero_offset, bits_max })
    }
}

/// Truncates `x / scale` toward zero. Out-of-range values are not clamped to the bit width;
/// only the i32 conversion itself saturates.
pub fn quantize(input: &[f32], scale: f32, out: &mut [i32]) {
    debug_assert_eq!(input.len(), out.len());
    for (q, &x) in out.iter_mut().zip(input) {
        *q = (x / scale) as i32;
    }
}

/// Like [`quantize`] but rounds to nearest, bounding the round-trip error by `scale / 2`.
pub fn quantize_nearest(input: &[f32], scale: f32, out: &mut [i32]) {
    debug_assert_eq!(input.len(), out.len());
    for (q, &x) in out.iter_mut().zip(input) {
        *q = (x / scale).round() as i32;
    }
}

pub fn dequantize(quantized: &[i64], scale: f32, out: &mut [f32]) {
    debug_assert_eq!(quantized.len(), out.len());
    for (y, &q) in out.iter_mut().zip(quantized) {
        *y = (q as f64 * scale as f64) as f32;
    }
}

#[inline]
pub fn dot_i32(w_row: &[i32], x: &[i32]) -> i32 {
    // Wraps like the accelerator's 32-bit accumulator register.
    let mut acc: i32 = 0;
    for i in 0..w_row.len() { acc = acc.wrapping_add(w_row[i].wrapping_mul(x[i])); }
    acc
}

#[inline]
pub fn dot_f32(w_row: &[f32], x: &[f32]) -> f32 {
    let mut acc = 0f32;
    for i in 0..w_row.len() { acc += w_row[i] * x[i]; }
    acc
}
