//! Tiling engine: splits a large matrix-vector product into block-shaped tiles and drives the
//! block primitive once per tile.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::device::{self, BlockCompute, BlockShape, DeviceConfig};
use crate::error::{check_len, OffloadError, Result};
use crate::quant::{dequantize, quantize, QuantRange, Role};
use crate::tensor::Matrix;

/// Per-call compute options: precision selector plus dynamic-range hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeOptions {
    pub quantized: bool,
    pub activation: QuantRange,
    pub weight: QuantRange,
}

impl ComputeOptions {
    pub fn full() -> Self { Self::default() }

    pub fn quantized(activation: QuantRange, weight: QuantRange) -> Self {
        Self { quantized: true, activation, weight }
    }
}

pub struct Engine {
    device: Box<dyn BlockCompute>,
    shape: BlockShape,
    // Staging buffers, cleared at the start of every tile
    qvec: Vec<i32>,
    qmat: Vec<i32>,
    qout: Vec<i32>,
    fvec: Vec<f32>,
    fmat: Vec<f32>,
    fout: Vec<f32>,
    num_block_calls: u64,
}

impl Engine {
    pub fn new(device: Box<dyn BlockCompute>) -> Result<Self> {
        let shape = device.shape();
        shape.validate()?;
        Ok(Self {
            device,
            shape,
            qvec: vec![0; shape.v_size],
            qmat: vec![0; shape.matrix_len()],
            qout: vec![0; shape.m_size],
            fvec: vec![0.0; shape.v_size],
            fmat: vec![0.0; shape.matrix_len()],
            fout: vec![0.0; shape.m_size],
            num_block_calls: 0,
        })
    }

    /// Acquire the configured device; no engine exists if that fails.
    pub fn open(config: &DeviceConfig, shape: BlockShape) -> Result<Self> {
        Self::new(device::open(config, shape)?)
    }

    pub fn simulated(shape: BlockShape) -> Result<Self> {
        Self::open(&DeviceConfig::Simulated, shape)
    }

    pub fn shape(&self) -> BlockShape { self.shape }

    pub fn device_name(&self) -> &'static str { self.device.name() }

    pub fn num_block_calls(&self) -> u64 { self.num_block_calls }

    pub fn reset(&mut self) { self.num_block_calls = 0; }

    /// Number of tiles a `rows x cols` product is split into.
    pub fn tile_count(&self, rows: usize, cols: usize) -> u64 {
        (rows.div_ceil(self.shape.m_size) * cols.div_ceil(self.shape.v_size)) as u64
    }

    /// `output = matrix · vector`. Shapes, ranges and backend precision are checked before any tile is issued, so
    /// on error `output` is untouched.
    pub fn multiply(&mut self, matrix: &Matrix, vector: &[f32], output: &mut [f32], opts: &ComputeOptions) -> Result<()> {
        check_len("vector length", matrix.cols(), vector.len())?;
        check_len("output length", matrix.rows(), output.len())?;
        if !opts.quantized && !self.device.supports_full() {
            return Err(OffloadError::UnsupportedPrecision { backend: self.device.name() });
        }
        if opts.quantized {
            self.multiply_quantized(matrix, vector, output, opts)
        } else {
            self.multiply_full(matrix, vector, output)
        }
    }

    pub fn multiply_vec(&mut self, matrix: &Matrix, vector: &[f32], opts: &ComputeOptions) -> Result<Vec<f32>> {
        let mut out = vec![0.0; matrix.rows()];
        self.multiply(matrix, vector, &mut out, opts)?;
        Ok(out)
    }

    fn multiply_quantized(&mut self, matrix: &Matrix, vector: &[f32], output: &mut [f32], opts: &ComputeOptions) -> Result<()> {
        let act = opts.activation.params(Role::Activation)?;
        let wgt = opts.weight.params(Role::Weight)?;
        let (num_output, num_input) = (matrix.rows(), matrix.cols());
        debug!("quantized multiply {}x{} (act scale={} offset={}, weight scale={} offset={})",
            num_output, num_input, act.scale, act.zero_offset, wgt.scale, wgt.zero_offset);

        let mut qinput = vec![0i32; num_input];
        quantize(vector, act.scale, &mut qinput);
        let mut qmatrix = vec![0i32; num_output * num_input];
        quantize(matrix.as_slice(), wgt.scale, &mut qmatrix);

        let (m, v) = (self.shape.m_size, self.shape.v_size);
        let mut acc = vec![0i64; num_output];
        for i in (0..num_output).step_by(m) {
            for j in (0..num_input).step_by(v) {
                let block_row = m.min(num_output - i);
                let block_col = v.min(num_input - j);
                self.qvec.fill(0);
                self.qmat.fill(0);
                self.qvec[..block_col].copy_from_slice(&qinput[j..j + block_col]);
                for k in 0..block_row {
                    let src = (i + k) * num_input + j;
                    self.qmat[k * v..k * v + block_col].copy_from_slice(&qmatrix[src..src + block_col]);
                }
                trace!("tile ({}, {}) {}x{}", i, j, block_row, block_col);
                self.device.compute_quantized(&self.qvec, &self.qmat, &mut self.qout)?;
                self.num_block_calls += 1;
                for row in 0..block_row {
                    acc[i + row] += self.qout[row] as i64;
                }
            }
        }
        dequantize(&acc, act.scale * wgt.scale, output);
        Ok(())
    }

    fn multiply_full(&mut self, matrix: &Matrix, vector: &[f32], output: &mut [f32]) -> Result<()> {
        let (num_output, num_input) = (matrix.rows(), matrix.cols());
        debug!("full-precision multiply {}x{}", num_output, num_input);
        let data = matrix.as_slice();
        let (m, v) = (self.shape.m_size, self.shape.v_size);
        let mut acc = vec![0f32; num_output];
        for i in (0..num_output).step_by(m) {
            for j in (0..num_input).step_by(v) {
                let block_row = m.min(num_output - i);
                let block_col = v.min(num_input - j);
                self.fvec.fill(0.0);
                self.fmat.fill(0.0);
                self.fvec[..block_col].copy_from_slice(&vector[j..j + block_col]);
                for k in 0..block_row {
                    let src = (i + k) * num_input + j;
                    self.fmat[k * v..k * v + block_col].copy_from_slice(&data[src..src + block_col]);
                }
                trace!("tile ({}, {}) {}x{}", i, j, block_row, block_col);
                self.device.compute_full(&self.fvec, &self.fmat, &mut self.fout)?;
                self.num_block_calls += 1;
                for row in 0..block_row {
                    acc[i + row] += self.fout[row];
                }
            }
        }
        output.copy_from_slice(&acc);
        Ok(())
    }
}
