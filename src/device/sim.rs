use super::{BlockCompute, BlockShape};
use crate::error::Result;
use crate::quant::{dot_f32, dot_i32};

/// In-process stand-in for the accelerator. Completes synchronously.
#[derive(Debug, Clone)]
pub struct SimulatedBlock {
    shape: BlockShape,
}

impl SimulatedBlock {
    pub fn new(shape: BlockShape) -> Self { Self { shape } }
}

impl BlockCompute for SimulatedBlock {
    fn name(&self) -> &'static str { "simulated" }

    fn shape(&self) -> BlockShape { self.shape }

    fn compute_quantized(&mut self, vector: &[i32], matrix: &[i32], out: &mut [i32]) -> Result<()> {
        let v = self.shape.v_size;
        for (i, y) in out.iter_mut().enumerate().take(self.shape.m_size) {
            *y = dot_i32(&matrix[i * v..(i + 1) * v], vector);
        }
        Ok(())
    }

    fn supports_full(&self) -> bool { true }

    fn compute_full(&mut self, vector: &[f32], matrix: &[f32], out: &mut [f32]) -> Result<()> {
        let v = self.shape.v_size;
        for (i, y) in out.iter_mut().enumerate().take(self.shape.m_size) {
            *y = dot_f32(&matrix[i * v..(i + 1) * v], vector);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_product_matches_hand_computation() {
        let mut dev = SimulatedBlock::new(BlockShape { m_size: 2, v_size: 3 });
        let mut out = [0i32; 2];
        dev.compute_quantized(&[1, 2, 3], &[1, 0, 0, 1, 1, 1], &mut out).unwrap();
        assert_eq!(out, [1, 6]);
        let mut outf = [0f32; 2];
        dev.compute_full(&[0.5, 1.0, 2.0], &[2.0, 0.0, 0.0, 1.0, 1.0, 1.0], &mut outf).unwrap();
        assert_eq!(outf, [1.0, 3.5]);
    }
}
