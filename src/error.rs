use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::quant::Role;

#[derive(Debug, Error)]
pub enum OffloadError {
    /// Dynamic range collapses the quantization scale (min >= max, non-finite, bad bit width).
    #[error("invalid {role} range: bits={bits} min={min} max={max}")]
    InvalidRange { role: Role, bits: u32, min: f32, max: f32 },

    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch { what: &'static str, expected: usize, found: usize },

    #[error("cannot acquire device {}: {source}", path.display())]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("block shape must be non-zero (m_size={m_size}, v_size={v_size})")]
    InvalidBlockShape { m_size: usize, v_size: usize },

    #[error("{backend} backend has no full-precision block compute")]
    UnsupportedPrecision { backend: &'static str },
}

pub type Result<T> = std::result::Result<T, OffloadError>;

/// Shorthand used by the shape checks scattered through the crate.
pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(OffloadError::ShapeMismatch { what, expected, found });
    }
    Ok(())
}
