use blockmv::device::mmio::{MmioBlock, START_SENTINEL};
use blockmv::quant::QuantRange;
use blockmv::{BlockCompute, BlockShape, ComputeOptions, Engine, Matrix, OffloadError};
use memmap2::MmapOptions;
use std::fs::OpenOptions;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{fence, Ordering};
use std::thread;

const STATUS_OFFSET: usize = 4096;
const FILE_LEN: u64 = 8192;

/// Plays the accelerator against a regular file: waits for the start sentinel, multiplies the
/// staged block, writes results over the vector words and clears the sentinel.
fn spawn_fake_device(path: &'static str, shape: BlockShape, blocks: usize) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let f = OpenOptions::new().read(true).write(true).open(path).unwrap();
        let mut map = unsafe { MmapOptions::new().len(FILE_LEN as usize).map_mut(&f) }.unwrap();
        let base = map.as_mut_ptr();
        let data = base as *mut i32;
        let status = unsafe { base.add(STATUS_OFFSET) as *mut u32 };
        let (m, v) = (shape.m_size, shape.v_size);
        for _ in 0..blocks {
            unsafe {
                while ptr::read_volatile(status) != START_SENTINEL { std::hint::spin_loop(); }
                fence(Ordering::SeqCst);
                let x: Vec<i32> = (0..v).map(|k| ptr::read_volatile(data.add(k))).collect();
                let y: Vec<i32> = (0..m).map(|i| {
                    (0..v).map(|j| ptr::read_volatile(data.add(v + i * v + j)) * x[j]).sum()
                }).collect();
                for (i, r) in y.into_iter().enumerate() { ptr::write_volatile(data.add(i), r); }
                fence(Ordering::SeqCst);
                ptr::write_volatile(status, 1);
            }
        }
    })
}

fn fresh_file(path: &str) {
    let f = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path).unwrap();
    f.set_len(FILE_LEN).unwrap();
}

#[test]
fn mmio_block_completes_when_sentinel_cleared() {
    let path = "target/blockmv_fake_dev_block.bin";
    fresh_file(path);
    let shape = BlockShape::new(2, 3).unwrap();
    let mut dev = MmioBlock::open(Path::new(path), 0, STATUS_OFFSET as u64, shape).unwrap();
    let helper = spawn_fake_device(path, shape, 2);
    let mut out = [0i32; 2];
    dev.compute_quantized(&[1, 2, 3], &[1, 0, 0, 1, 1, 1], &mut out).unwrap();
    assert_eq!(out, [1, 6]);
    dev.compute_quantized(&[2, -1, 0], &[3, 3, 3, -1, 0, 4], &mut out).unwrap();
    assert_eq!(out, [3, -2]);
    helper.join().unwrap();
}

#[test]
fn engine_drives_mmio_device() {
    let path = "target/blockmv_fake_dev_engine.bin";
    fresh_file(path);
    let shape = BlockShape::new(2, 2).unwrap();
    let dev = MmioBlock::open(Path::new(path), 0, STATUS_OFFSET as u64, shape).unwrap();
    let mut engine = Engine::new(Box::new(dev)).unwrap();
    let helper = spawn_fake_device(path, shape, 4);
    let unit = QuantRange::new(8, -63.5, 63.5);
    let m = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0], vec![7.0, 8.0, 9.0]]).unwrap();
    let out = engine.multiply_vec(&m, &[1.0, 1.0, 1.0], &ComputeOptions::quantized(unit, unit)).unwrap();
    helper.join().unwrap();
    assert_eq!(out, vec![6.0, 15.0, 24.0]);
    assert_eq!(engine.num_block_calls(), 4);

    // integer-only hardware
    let err = engine.multiply_vec(&m, &[1.0, 1.0, 1.0], &ComputeOptions::full()).unwrap_err();
    assert!(matches!(err, OffloadError::UnsupportedPrecision { backend: "mmio" }));
    assert_eq!(engine.num_block_calls(), 4);
}

#[test]
fn full_precision_rejected_up_front_even_for_empty_problems() {
    let path = "target/blockmv_fake_dev_empty.bin";
    fresh_file(path);
    let shape = BlockShape::new(2, 2).unwrap();
    let dev = MmioBlock::open(Path::new(path), 0, STATUS_OFFSET as u64, shape).unwrap();
    let mut engine = Engine::new(Box::new(dev)).unwrap();
    let mut out = vec![3.0f32; 2];
    for m in [Matrix::zeros(2, 0), Matrix::zeros(0, 0)] {
        let n = m.rows();
        let err = engine.multiply(&m, &[], &mut out[..n], &ComputeOptions::full()).unwrap_err();
        assert!(matches!(err, OffloadError::UnsupportedPrecision { backend: "mmio" }));
    }
    assert_eq!(out, vec![3.0, 3.0]);
    assert_eq!(engine.num_block_calls(), 0);
    // Quantized empty problem needs no device round trip
    let unit = QuantRange::new(8, -63.5, 63.5);
    let y = engine.multiply_vec(&Matrix::zeros(2, 0), &[], &ComputeOptions::quantized(unit, unit)).unwrap();
    assert_eq!(y, vec![0.0, 0.0]);
}
