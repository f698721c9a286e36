//! Exact reference kernels used to check offloaded results. f64 accumulation, no tiling.

use rayon::prelude::*;

use crate::error::{check_len, Result};
use crate::lowering::output_dims;
use crate::tensor::{Matrix, Tensor3, Tensor4};

pub fn matvec(matrix: &Matrix, vector: &[f32]) -> Result<Vec<f32>> {
    check_len("vector length", matrix.cols(), vector.len())?;
    Ok((0..matrix.rows()).into_par_iter().map(|r| {
        let mut sum = 0f64;
        for (w, x) in matrix.row(r).iter().zip(vector) { sum += *w as f64 * *x as f64; }
        sum as f32
    }).collect())
}

/// Direct valid, stride-1 convolution. Output `[out_channels][out_h][out_w]`.
pub fn conv2d(weights: &Tensor4, inputs: &Tensor3) -> Result<Tensor3> {
    let (out_h, out_w) = output_dims(weights, inputs)?;
    let data: Vec<f32> = (0..weights.out_channels * out_h * out_w).into_par_iter().map(|i| {
        let oc = i / (out_h * out_w);
        let (y, x) = ((i / out_w) % out_h, i % out_w);
        let mut sum = 0f64;
        for ic in 0..weights.in_channels {
            for h in 0..weights.height {
                for w in 0..weights.width {
                    sum += weights.get(oc, ic, h, w) as f64 * inputs.get(ic, h + y, w + x) as f64;
                }
            }
        }
        sum as f32
    }).collect();
    Tensor3::from_vec(weights.out_channels, out_h, out_w, data)
}

/// Largest absolute elementwise difference.
pub fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}
