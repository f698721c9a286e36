use blockmv::quant::QuantRange;
use blockmv::{reference, BlockShape, ComputeOptions, Engine, Matrix, OffloadError};
use pretty_assertions::assert_eq;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

// (63.5 - -63.5) / 127 == 1.0 exactly, so integral operands quantize losslessly
fn unit_scale() -> QuantRange { QuantRange::new(8, -63.5, 63.5) }

#[test]
fn unit_scale_quantized_product_is_exact() {
    let mut e = Engine::simulated(BlockShape::new(2, 2).unwrap()).unwrap();
    let m = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]]).unwrap();
    let opts = ComputeOptions::quantized(unit_scale(), unit_scale());
    let out = e.multiply_vec(&m, &[1.0, 1.0, 1.0], &opts).unwrap();
    assert_eq!(out, vec![6.0, 15.0, 24.0]);
    assert_eq!(e.num_block_calls(), 4);
}

#[test]
fn quantized_product_within_truncation_bound() {
    let mut rng = SmallRng::seed_from_u64(21);
    let (rows, cols) = (37, 50);
    let m = Matrix::from_vec(rows, cols, (0..rows * cols).map(|_| rng.gen_range(-1.0f32..1.0)).collect()).unwrap();
    let v: Vec<f32> = (0..cols).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let act = QuantRange::new(8, -1.0, 1.0);
    let wgt = QuantRange::new(8, -1.0, 1.0);
    let (sa, sw) = (2.0f32 / 127.0, 2.0f32 / 127.0);

    let mut e = Engine::simulated(BlockShape::new(8, 8).unwrap()).unwrap();
    let out = e.multiply_vec(&m, &v, &ComputeOptions::quantized(act, wgt)).unwrap();
    let exact = reference::matvec(&m, &v).unwrap();
    // |w|,|x| <= 1 and each operand is off by less than one step
    let bound = cols as f32 * (sa + sw + sa * sw) + 1e-4;
    let err = reference::max_abs_diff(&out, &exact);
    assert!(err <= bound, "err {} exceeds bound {}", err, bound);
}

#[test]
fn quantized_matches_padded_problem() {
    let mut rng = SmallRng::seed_from_u64(5);
    let m = Matrix::from_vec(3, 5, (0..15).map(|_| rng.gen_range(-1.0f32..1.0)).collect()).unwrap();
    let v: Vec<f32> = (0..5).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let mut padded = Matrix::zeros(4, 6);
    for r in 0..3 { for c in 0..5 { padded.set(r, c, m.get(r, c)); } }
    let mut pv = v.clone();
    pv.push(0.0);
    let opts = ComputeOptions::quantized(QuantRange::new(8, -1.0, 1.0), QuantRange::new(6, -1.0, 1.0));
    let mut e = Engine::simulated(BlockShape::new(2, 3).unwrap()).unwrap();
    let a = e.multiply_vec(&m, &v, &opts).unwrap();
    let b = e.multiply_vec(&padded, &pv, &opts).unwrap();
    assert_eq!(a, b[..3].to_vec());
}

#[test]
fn degenerate_range_aborts_before_any_block() {
    let mut e = Engine::simulated(BlockShape::new(2, 2).unwrap()).unwrap();
    let m = Matrix::zeros(2, 2);
    let mut out = vec![5.0f32; 2];
    let opts = ComputeOptions::quantized(QuantRange::new(8, 0.5, 0.5), unit_scale());
    let err = e.multiply(&m, &[0.0, 0.0], &mut out, &opts).unwrap_err();
    assert!(matches!(err, OffloadError::InvalidRange { .. }));
    assert!(err.to_string().contains("activation"));
    let opts = ComputeOptions::quantized(unit_scale(), QuantRange::new(8, 1.0, -1.0));
    assert!(e.multiply(&m, &[0.0, 0.0], &mut out, &opts).is_err());
    assert_eq!(out, vec![5.0, 5.0]);
    assert_eq!(e.num_block_calls(), 0);
}

#[test]
fn repeated_quantized_calls_are_identical() {
    let mut rng = SmallRng::seed_from_u64(13);
    let (rows, cols) = (11, 17);
    let m = Matrix::from_vec(rows, cols, (0..rows * cols).map(|_| rng.gen_range(-1.0f32..1.0)).collect()).unwrap();
    let v: Vec<f32> = (0..cols).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let opts = ComputeOptions::quantized(QuantRange::new(8, -1.0, 1.0), QuantRange::new(8, -1.0, 1.0));
    // 4x5 blocks leave ragged tiles on both edges
    let mut e = Engine::simulated(BlockShape::new(4, 5).unwrap()).unwrap();
    let tiles = e.tile_count(rows, cols);
    assert_eq!(tiles, 3 * 4);

    let a = e.multiply_vec(&m, &v, &opts).unwrap();
    assert_eq!(e.num_block_calls(), tiles);
    // A different, full-sized problem in between dirties every staging slot
    let big = Matrix::from_vec(8, 10, vec![1.0; 80]).unwrap();
    e.multiply_vec(&big, &[1.0; 10], &opts).unwrap();
    let between = e.num_block_calls();
    let b = e.multiply_vec(&m, &v, &opts).unwrap();
    assert_eq!(a, b);
    assert_eq!(e.num_block_calls(), between + tiles);
    let c = e.multiply_vec(&m, &v, &opts).unwrap();
    assert_eq!(b, c);
    assert_eq!(e.num_block_calls(), between + 2 * tiles);
}
