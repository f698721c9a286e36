//! Block compute primitives: one fixed-size matrix·vector multiply per call.

pub mod mmio;
pub mod sim;

use std::path::PathBuf;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{OffloadError, Result};

pub use mmio::MmioBlock;
pub use sim::SimulatedBlock;

/// Native operand size of one block invocation: `m_size` outputs from `v_size` inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockShape {
    pub m_size: usize,
    pub v_size: usize,
}

impl BlockShape {
    pub fn new(m_size: usize, v_size: usize) -> Result<Self> {
        let s = Self { m_size, v_size };
        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.m_size == 0 || self.v_size == 0 {
            return Err(OffloadError::InvalidBlockShape { m_size: self.m_size, v_size: self.v_size });
        }
        Ok(())
    }

    pub fn matrix_len(&self) -> usize { self.m_size * self.v_size }
}

impl Default for BlockShape {
    fn default() -> Self { Self { m_size: 64, v_size: 64 } }
}

/// A unit that multiplies one `m_size x v_size` matrix block by one `v_size` vector block.
///
/// `vector` has `v_size` entries, `matrix` has `m_size * v_size` entries row-major, and `out`
/// receives `m_size` results. Implementations block until the result is readable.
pub trait BlockCompute {
    fn name(&self) -> &'static str;

    fn shape(&self) -> BlockShape;

    fn compute_quantized(&mut self, vector: &[i32], matrix: &[i32], out: &mut [i32]) -> Result<()>;

    /// Whether [`BlockCompute::compute_full`] is available; integer-only hardware says no.
    fn supports_full(&self) -> bool { false }

    fn compute_full(&mut self, _vector: &[f32], _matrix: &[f32], _out: &mut [f32]) -> Result<()> {
        Err(OffloadError::UnsupportedPrecision { backend: self.name() })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeviceConfig {
    Simulated,
    Mmio {
        #[serde(default = "default_device_path")]
        path: PathBuf,
        data_addr: u64,
        output_addr: u64,
    },
}

impl Default for DeviceConfig {
    fn default() -> Self { DeviceConfig::Simulated }
}

fn default_device_path() -> PathBuf { PathBuf::from("/dev/mem") }

/// Acquire the configured block primitive. Fails without side effects if the device is missing.
pub fn open(config: &DeviceConfig, shape: BlockShape) -> Result<Box<dyn BlockCompute>> {
    shape.validate()?;
    match config {
        DeviceConfig::Simulated => {
            info!("Using simulated block device ({}x{})", shape.m_size, shape.v_size);
            Ok(Box::new(SimulatedBlock::new(shape)))
        }
        DeviceConfig::Mmio { path, data_addr, output_addr } => {
            let dev = MmioBlock::open(path, *data_addr, *output_addr, shape)?;
            info!("Mapped block device {} (data=0x{:x}, output=0x{:x}, {}x{})",
                path.display(), data_addr, output_addr, shape.m_size, shape.v_size);
            Ok(Box::new(dev))
        }
    }
}
