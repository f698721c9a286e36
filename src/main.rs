use anyhow::Result;
use blockmv::config::EngineConfig;
use blockmv::quant::QuantRange;
use blockmv::{layers, reference, BlockShape, ComputeOptions, Matrix, Tensor3, Tensor4};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offload matrix-vector products onto a block compute unit", long_about = None)]
struct Args {
    /// Engine config (JSON); defaults to a simulated 64x64 block
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override block output length
    #[arg(short = 'm', long)]
    m_size: Option<usize>,

    /// Override block input length
    #[arg(short = 'v', long)]
    v_size: Option<usize>,

    /// Quantize operands before offloading
    #[arg(long)]
    quantized: bool,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Random matrix-vector product checked against the exact result
    Mv {
        #[arg(long, default_value_t = 256)]
        rows: usize,
        #[arg(long, default_value_t = 256)]
        cols: usize,
        #[arg(long, default_value_t = 1)]
        repeat: usize,
    },
    /// Random convolution via lowering checked against direct convolution
    Conv {
        #[arg(long, default_value_t = 8)]
        conv_channels: usize,
        #[arg(long, default_value_t = 3)]
        in_channels: usize,
        #[arg(long, default_value_t = 3)]
        kernel: usize,
        #[arg(long, default_value_t = 16)]
        height: usize,
        #[arg(long, default_value_t = 16)]
        width: usize,
    },
}

fn random_vec(rng: &mut SmallRng, n: usize, std: f32) -> Result<Vec<f32>> {
    let dist = Normal::new(0.0f32, std)?;
    Ok((0..n).map(|_| dist.sample(rng)).collect())
}

/// Symmetric range covering every value, used as the quantization hint.
fn range_of(values: &[f32]) -> QuantRange {
    let a = values.iter().fold(1e-6f32, |m, v| m.max(v.abs()));
    QuantRange::new(8, -a, a)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    if let Some(m) = args.m_size { cfg.block.m_size = m; }
    if let Some(v) = args.v_size { cfg.block.v_size = v; }
    let BlockShape { m_size, v_size } = cfg.block;
    let mut engine = cfg.build_engine()?;
    info!("Engine ready: {} device, block {}x{}", engine.device_name(), m_size, v_size);

    let mut rng = SmallRng::seed_from_u64(args.seed);
    let quantized = args.quantized || cfg.compute.quantized;

    match args.cmd {
        Cmd::Mv { rows, cols, repeat } => {
            let matrix = Matrix::from_vec(rows, cols, random_vec(&mut rng, rows * cols, 0.5)?)?;
            let vector = random_vec(&mut rng, cols, 1.0)?;
            let opts = if quantized {
                ComputeOptions::quantized(range_of(&vector), range_of(matrix.as_slice()))
            } else { cfg.compute };
            let exact = reference::matvec(&matrix, &vector)?;
            let pb = ProgressBar::new(repeat as u64);
            pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {elapsed}")?);
            let start = Instant::now();
            let mut out = vec![0f32; rows];
            for _ in 0..repeat {
                engine.multiply(&matrix, &vector, &mut out, &opts)?;
                pb.inc(1);
            }
            pb.finish_and_clear();
            let elapsed = start.elapsed();
            println!("mv {}x{} quantized={} block={}x{}", rows, cols, opts.quantized, m_size, v_size);
            println!("max abs error: {:.6}", reference::max_abs_diff(&out, &exact));
            println!("block calls: {} ({} per multiply)", engine.num_block_calls(), engine.tile_count(rows, cols));
            println!("elapsed: {:.3}s", elapsed.as_secs_f32());
        }
        Cmd::Conv { conv_channels, in_channels, kernel, height, width } => {
            let w = Tensor4::from_vec(conv_channels, in_channels, kernel, kernel,
                random_vec(&mut rng, conv_channels * in_channels * kernel * kernel, 0.3)?)?;
            let x = Tensor3::from_vec(in_channels, height, width, random_vec(&mut rng, in_channels * height * width, 1.0)?)?;
            let opts = if quantized {
                ComputeOptions::quantized(range_of(x.as_slice()), range_of(w.as_slice()))
            } else { cfg.compute };
            let start = Instant::now();
            let y = layers::conv2d(&mut engine, &w, &x, &opts)?;
            let elapsed = start.elapsed();
            let exact = reference::conv2d(&w, &x)?;
            println!("conv {}x{}x{}x{} over {}x{}x{} -> {}x{}x{}", conv_channels, in_channels, kernel, kernel,
                in_channels, height, width, y.channels, y.height, y.width);
            println!("max abs error: {:.6}", reference::max_abs_diff(y.as_slice(), exact.as_slice()));
            println!("block calls: {}", engine.num_block_calls());
            println!("elapsed: {:.3}s", elapsed.as_secs_f32());
        }
    }
    Ok(())
}
