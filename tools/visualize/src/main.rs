//! Diagnostic visualizer: renders a suitability map (`pfz run`) or a control
//! surface (`pfz surface`) to PNG. Fill-value cells are drawn dark grey.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use pfz_core::surface::ControlSurface;
use pfz_core::{Raster, SuitabilityMap};

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Render suitability JSON to PNG")]
struct Args {
    /// JSON written by `pfz run` or `pfz surface`.
    input: PathBuf,

    /// PNG path to write.
    #[arg(short, long)]
    output: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Kind::Map)]
    kind: Kind,

    /// Pixels per cell.
    #[arg(short, long, default_value_t = 1)]
    scale: u32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Map,
    Surface,
}

// ── Colour helpers ────────────────────────────────────────────────────────────

const FILL_RGB: [u8; 3] = [40, 40, 40];

/// Score in [0, 100] → blue (poor) through green and yellow to red (best).
fn score_to_rgb(score: f64) -> [u8; 3] {
    const STOPS: [(f64, [f64; 3]); 4] = [
        (0.0, [30.0, 60.0, 200.0]),
        (40.0, [40.0, 180.0, 90.0]),
        (70.0, [240.0, 220.0, 50.0]),
        (100.0, [210.0, 30.0, 30.0]),
    ];
    let s = score.clamp(0.0, 100.0);
    let i = STOPS.iter().rposition(|&(at, _)| at <= s).unwrap_or(0).min(STOPS.len() - 2);
    let (a, ca) = STOPS[i];
    let (b, cb) = STOPS[i + 1];
    let t = (s - a) / (b - a);
    let mix = |k: usize| (ca[k] + (cb[k] - ca[k]) * t).round() as u8;
    [mix(0), mix(1), mix(2)]
}

/// Rescales `[lo, hi]` onto the colour ramp; fill cells stay grey.
fn render(raster: &Raster, fill: f64, lo: f64, hi: f64, scale: u32) -> image::RgbImage {
    let span = (hi - lo).max(f64::EPSILON);
    let scale = scale.max(1);
    let mut img = image::RgbImage::new(raster.cols as u32 * scale, raster.rows as u32 * scale);
    for r in 0..raster.rows {
        for c in 0..raster.cols {
            let v = raster.get(r, c);
            let rgb = if v == fill || v.is_nan() { FILL_RGB } else { score_to_rgb((v - lo) / span * 100.0) };
            for dy in 0..scale {
                for dx in 0..scale {
                    img.put_pixel(c as u32 * scale + dx, r as u32 * scale + dy, image::Rgb(rgb));
                }
            }
        }
    }
    img
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    let json = fs::read_to_string(&args.input).with_context(|| format!("cannot read {}", args.input.display()))?;

    let img = match args.kind {
        Kind::Map => {
            let map: SuitabilityMap = serde_json::from_str(&json).context("not a suitability map")?;
            println!("{} ({}×{}, {})", map.long_name, map.raster.rows, map.raster.cols, map.units);
            let [lo, hi] = map.valid_range;
            render(&map.raster, map.fill_value, lo, hi, args.scale)
        }
        Kind::Surface => {
            let s: ControlSurface = serde_json::from_str(&json).context("not a control surface")?;
            println!(
                "{} × {} surface ({}×{})",
                s.x_axis.covariate, s.y_axis.covariate, s.x.len(), s.y.len()
            );
            // Surfaces stretch their own range; row 0 is the lowest y sample.
            let mut z = s.z.clone();
            for r in 0..z.rows / 2 {
                for c in 0..z.cols {
                    let (top, bottom) = (z.get(r, c), z.get(z.rows - 1 - r, c));
                    z.set(r, c, bottom);
                    z.set(z.rows - 1 - r, c, top);
                }
            }
            let lo = s.min.unwrap_or(0.0);
            let hi = s.max.unwrap_or(100.0);
            render(&z, pfz_core::MISSING_VALUE, lo, hi, args.scale)
        }
    };

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    img.save(&args.output).with_context(|| format!("failed to save {}", args.output.display()))?;
    println!("Wrote {}", args.output.display());
    Ok(())
}
