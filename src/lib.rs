// Blocked matrix-vector offload onto a fixed-size block compute unit
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod layers;
pub mod lowering;
pub mod quant;
pub mod reference;
pub mod tensor;

pub use device::{BlockCompute, BlockShape, DeviceConfig};
pub use engine::{ComputeOptions, Engine};
pub use error::{OffloadError, Result};
pub use quant::QuantRange;
pub use tensor::{Matrix, Tensor3, Tensor4};
