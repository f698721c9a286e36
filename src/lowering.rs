//! Convolution lowering (im2col): turns a 4-D weight tensor and a 3-D feature map into two
//! matrices whose ordinary product is the valid, stride-1 convolution.

use rayon::prelude::*;

use crate::error::{check_len, OffloadError, Result};
use crate::tensor::{Matrix, Tensor3, Tensor4};

/// Output spatial size `(out_h, out_w)` of a valid convolution, or an error if the kernel does
/// not fit inside the input.
pub fn output_dims(weights: &Tensor4, inputs: &Tensor3) -> Result<(usize, usize)> {
    check_len("input channels", weights.in_channels, inputs.channels)?;
    if weights.height > inputs.height {
        return Err(OffloadError::ShapeMismatch { what: "kernel height", expected: inputs.height, found: weights.height });
    }
    if weights.width > inputs.width {
        return Err(OffloadError::ShapeMismatch { what: "kernel width", expected: inputs.width, found: weights.width });
    }
    Ok((inputs.height - weights.height + 1, inputs.width - weights.width + 1))
}

/// Shapes `(new_weights, new_inputs)` must have, as `(rows, cols)` pairs.
pub fn lowered_shapes(weights: &Tensor4, inputs: &Tensor3) -> Result<((usize, usize), (usize, usize))> {
    let (out_h, out_w) = output_dims(weights, inputs)?;
    let patch = weights.in_channels * weights.height * weights.width;
    Ok(((weights.out_channels, patch), (patch, out_h * out_w)))
}

/// Fill caller-sized `new_weights` and `new_inputs`. Nothing is written unless every shape
/// checks out.
///
/// Row `c` of `new_weights` is filter `c` flattened in (in_channel, height, width) order. Column
/// `y * out_w + x` of `new_inputs` is the input window at `(y, x)`, with element
/// `inputs[ic][h + y][w + x]` at row `w + kw * h + kw * kh * ic`.
pub fn conv_lowering(weights: &Tensor4, inputs: &Tensor3, new_weights: &mut Matrix, new_inputs: &mut Matrix) -> Result<()> {
    let ((wr, wc), (ir, ic)) = lowered_shapes(weights, inputs)?;
    check_len("new_weights rows", wr, new_weights.rows())?;
    check_len("new_weights cols", wc, new_weights.cols())?;
    check_len("new_inputs rows", ir, new_inputs.rows())?;
    check_len("new_inputs cols", ic, new_inputs.cols())?;

    for c in 0..weights.out_channels {
        new_weights.row_mut(c).copy_from_slice(weights.filter(c));
    }

    let (kh, kw) = (weights.height, weights.width);
    let out_w = inputs.width - kw + 1;
    let cols = new_inputs.cols();
    if cols == 0 { return Ok(()); }
    // Each row is one (ic, h, w) kernel tap; rows are disjoint so they fill independently.
    new_inputs.as_mut_slice().par_chunks_mut(cols).enumerate().for_each(|(idx, row)| {
        let ch = idx / (kh * kw);
        let h = (idx / kw) % kh;
        let w = idx % kw;
        for (cnt, slot) in row.iter_mut().enumerate() {
            let (y, x) = (cnt / out_w, cnt % out_w);
            *slot = inputs.get(ch, h + y, w + x);
        }
    });
    Ok(())
}

/// Allocating form of [`conv_lowering`].
pub fn lower(weights: &Tensor4, inputs: &Tensor3) -> Result<(Matrix, Matrix)> {
    let ((wr, wc), (ir, ic)) = lowered_shapes(weights, inputs)?;
    let mut new_weights = Matrix::zeros(wr, wc);
    let mut new_inputs = Matrix::zeros(ir, ic);
    conv_lowering(weights, inputs, &mut new_weights, &mut new_inputs)?;
    Ok((new_weights, new_inputs))
}
