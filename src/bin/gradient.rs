//! Gradient demo.
//!
//! Builds a kernel that shades one image row per call (red follows the row,
//! blue follows the column, green is fixed), runs it over every row and
//! optionally writes the result as a binary PPM.

use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tapevm::{Builder, Program};

#[derive(Parser)]
#[command(name = "gradient", version, about = "Render a gradient with a tapevm kernel")]
struct Cli {
    /// Image width in pixels
    #[arg(long, default_value = "319")]
    width: usize,

    /// Image height in pixels
    #[arg(long, default_value = "240")]
    height: usize,

    /// Times to render the whole image (for timing)
    #[arg(long, default_value = "1")]
    loops: usize,

    /// Write the image as a binary PPM
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the compiled tape and statistics
    #[arg(long)]
    dump: bool,
}

/// Slot 0 is an interleaved RGB row, slot 1 holds `[row, 1/width, 1/height]`.
fn build_kernel() -> Program {
    let mut b = Builder::new(2);
    let lane = b.lane_id();
    let half = b.splat(0.5);
    let x = b.add(lane, half);
    let y = b.uniform(1, 0.0);
    let inv_w = b.uniform(1, 1.0);
    let inv_h = b.uniform(1, 2.0);

    let r = b.mul(y, inv_h);
    let g = b.splat(0.5);
    let blue = b.mul(x, inv_w);

    let three = b.splat(3.0);
    for (channel, value) in [r, g, blue].into_iter().enumerate() {
        let offset = b.splat(channel as f32);
        let stride = b.mul(lane, three);
        let ix = b.add(stride, offset);
        b.store(0, ix, value);
    }
    b.compile()
}

fn write_ppm(path: &PathBuf, width: usize, height: usize, rgb: &[f32]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write!(out, "P6\n{} {}\n255\n", width, height)?;
    let bytes: Vec<u8> = rgb.iter().map(|&c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8).collect();
    out.write_all(&bytes)?;
    out.flush()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let program = build_kernel();
    if cli.dump {
        print!("{}", program);
        print!("{}", program.stats());
    }

    let (w, h) = (cli.width, cli.height);
    if w == 0 || h == 0 {
        return Err("width and height must be non-zero".into());
    }
    let mut rgb = vec![0.0f32; 3 * w * h];

    let start = Instant::now();
    for _ in 0..cli.loops {
        for (y, row) in rgb.chunks_mut(3 * w).enumerate() {
            let mut uniforms = [y as f32, 1.0 / w as f32, 1.0 / h as f32];
            program.try_execute(w, &mut [row, &mut uniforms[..]])?;
        }
    }
    log::info!("rendered {}x{} {} times in {:?}", w, h, cli.loops, start.elapsed());

    if let Some(path) = &cli.output {
        write_ppm(path, w, h, &rgb)?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}
