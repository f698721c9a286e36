//! Network layers expressed as engine multiplies.

use log::debug;

use crate::engine::{ComputeOptions, Engine};
use crate::error::{check_len, Result};
use crate::lowering::lower;
use crate::tensor::{Matrix, Tensor3, Tensor4};

/// Fully-connected layer: `weights · input (+ bias)`.
pub fn linear(engine: &mut Engine, weights: &Matrix, input: &[f32], bias: Option<&[f32]>, opts: &ComputeOptions) -> Result<Vec<f32>> {
    if let Some(b) = bias { check_len("bias length", weights.rows(), b.len())?; }
    let mut out = engine.multiply_vec(weights, input, opts)?;
    if let Some(b) = bias {
        for (y, bi) in out.iter_mut().zip(b) { *y += bi; }
    }
    Ok(out)
}

/// `a · b`, one engine multiply per column of `b`.
pub fn matmul(engine: &mut Engine, a: &Matrix, b: &Matrix, opts: &ComputeOptions) -> Result<Matrix> {
    check_len("inner dimension", a.cols(), b.rows())?;
    let mut out = Matrix::zeros(a.rows(), b.cols());
    let mut col = vec![0f32; a.rows()];
    for c in 0..b.cols() {
        engine.multiply(a, &b.column(c), &mut col, opts)?;
        for (r, &v) in col.iter().enumerate() { out.set(r, c, v); }
    }
    Ok(out)
}

/// Valid, stride-1 convolution through lowering.
pub fn conv2d(engine: &mut Engine, weights: &Tensor4, inputs: &Tensor3, opts: &ComputeOptions) -> Result<Tensor3> {
    let (new_weights, new_inputs) = lower(weights, inputs)?;
    let out_h = inputs.height - weights.height + 1;
    let out_w = inputs.width - weights.width + 1;
    debug!("conv2d via lowering: {}x{} weights, {}x{} inputs",
        new_weights.rows(), new_weights.cols(), new_inputs.rows(), new_inputs.cols());
    let product = matmul(engine, &new_weights, &new_inputs, opts)?;
    // Row-major product is already [channel][y * out_w + x].
    Tensor3::from_vec(weights.out_channels, out_h, out_w, product.as_slice().to_vec())
}
