#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rdintra::{
    search_frames, ChromaFormat, ComponentId, PcmConfig, PcmTieBreak, Picture, ResidualTreeSearch,
    SearchConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Mono,
    #[value(name = "420")]
    Yuv420,
    #[value(name = "444")]
    Yuv444,
}

impl From<Format> for ChromaFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Mono => ChromaFormat::Yuv400,
            Format::Yuv420 => ChromaFormat::Yuv420,
            Format::Yuv444 => ChromaFormat::Yuv444,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Tree {
    Exhaustive,
    CheckFirst,
    NoSplitBelow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Pattern {
    Solid,
    Ramp,
    Grid,
}

/// Runs the intra rate-distortion search over a picture and reports the
/// chosen modes and estimated cost.
#[derive(Debug, Parser)]
#[command(name = "rdintra", version)]
struct Cli {
    /// Y4M input; omit to search a synthetic pattern.
    input: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Pattern::Ramp)]
    pattern: Pattern,
    #[arg(long, default_value_t = 64)]
    width: u32,
    #[arg(long, default_value_t = 64)]
    height: u32,
    /// Sample format of synthetic patterns.
    #[arg(long, value_enum, default_value_t = Format::Yuv420)]
    format: Format,
    /// Bit depth of synthetic patterns.
    #[arg(long, default_value_t = 8)]
    bit_depth: u8,

    #[arg(long, default_value_t = rdintra::config::DEFAULT_QP)]
    qp: i32,
    #[arg(long, default_value_t = 32)]
    max_block: u32,
    #[arg(long, default_value_t = 8)]
    min_block: u32,
    #[arg(long, default_value_t = 32)]
    max_tu: u32,
    #[arg(long, default_value_t = 4)]
    min_tu: u32,
    #[arg(long, default_value_t = 3)]
    max_tu_depth: u8,
    /// Candidates kept by fast pruning; defaults to a per-size table.
    #[arg(long)]
    candidates: Option<usize>,
    #[arg(long, value_enum, default_value_t = Tree::Exhaustive)]
    tree: Tree,
    /// Smallest child size `no-split-below` may create.
    #[arg(long, default_value_t = 16)]
    min_split: u32,
    #[arg(long)]
    no_transform_skip: bool,
    #[arg(long)]
    lossless: bool,
    #[arg(long)]
    dpcm: bool,
    #[arg(long)]
    cross_component: bool,

    #[arg(long)]
    pcm: bool,
    #[arg(long, default_value_t = 8)]
    pcm_min: u32,
    #[arg(long, default_value_t = 32)]
    pcm_max: u32,
    #[arg(long)]
    pcm_bit_depth: Option<u8>,
    #[arg(long)]
    pcm_bit_depth_chroma: Option<u8>,
    /// Choose PCM when its cost equals the best predictive cost.
    #[arg(long)]
    prefer_pcm: bool,

    /// Write the reconstruction as Y4M.
    #[arg(long, short = 'o')]
    recon: Option<PathBuf>,
    /// Print one line per coding block.
    #[arg(long)]
    blocks: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn search_config(&self, format: ChromaFormat, bit_depth: u8) -> SearchConfig {
        let pcm_luma = self.pcm_bit_depth.unwrap_or(bit_depth);
        SearchConfig {
            bit_depth,
            chroma_format: format,
            qp: self.qp,
            max_block_size: self.max_block,
            min_block_size: self.min_block,
            max_tu_size: self.max_tu,
            min_tu_size: self.min_tu,
            max_tu_depth: self.max_tu_depth,
            fast_candidates: self.candidates,
            residual_tree: match self.tree {
                Tree::Exhaustive => ResidualTreeSearch::Exhaustive,
                Tree::CheckFirst => ResidualTreeSearch::CheckFirst,
                Tree::NoSplitBelow => {
                    ResidualTreeSearch::NoSplitBelow { min_split_size: self.min_split }
                }
            },
            transform_skip: !self.no_transform_skip,
            lossless: self.lossless,
            dpcm_first_pass: self.dpcm,
            cross_component: self.cross_component,
            pcm: PcmConfig {
                enabled: self.pcm,
                min_size: self.pcm_min,
                max_size: self.pcm_max,
                bit_depth_luma: pcm_luma,
                bit_depth_chroma: self.pcm_bit_depth_chroma.unwrap_or(pcm_luma),
                tie_break: if self.prefer_pcm {
                    PcmTieBreak::PreferPcm
                } else {
                    PcmTieBreak::PreferPredictive
                },
            },
        }
    }
}

fn synthetic(cli: &Cli) -> Result<Picture> {
    if !(8..=16).contains(&cli.bit_depth) {
        bail!("bit depth {} outside 8..=16", cli.bit_depth);
    }
    let format = ChromaFormat::from(cli.format);
    let max = (1u32 << cli.bit_depth) - 1;
    let mid = 1u16 << (cli.bit_depth - 1);
    let mut pic = Picture::solid(cli.width, cli.height, format, cli.bit_depth, [mid; 3]);
    if cli.pattern == Pattern::Solid {
        return Ok(pic);
    }
    let plane = pic.plane_mut(ComponentId::Y);
    for y in 0..cli.height {
        for x in 0..cli.width {
            let v = match cli.pattern {
                Pattern::Ramp => (x + y) * max / (cli.width + cli.height).max(1),
                Pattern::Grid if (x / 8 + y / 8) % 2 == 0 => max * 3 / 4,
                Pattern::Grid => max / 4,
                Pattern::Solid => mid.into(),
            };
            plane.set(x, y, v as u16);
        }
    }
    Ok(pic)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let frames = match &cli.input {
        Some(path) => rdintra::y4m::read_y4m_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => vec![synthetic(&cli)?],
    };
    let first = &frames[0];
    info!(
        frames = frames.len(),
        width = first.width(),
        height = first.height(),
        format = ?first.format,
        bit_depth = first.bit_depth,
        "input loaded"
    );

    let config = cli.search_config(first.format, first.bit_depth);
    let results = search_frames(&config, &frames).context("search failed")?;

    for (i, frame) in results.iter().enumerate() {
        if cli.blocks {
            for b in &frame.blocks {
                println!(
                    "frame {i} block {:>4},{:<4} {:>2}x{:<2} luma {:>2} chroma {:>4} pcm {:<5} tus {:>3} bits {:>10.1} dist {:>10}",
                    b.area.x,
                    b.area.y,
                    b.area.width,
                    b.area.height,
                    b.luma_mode,
                    b.chroma_mode.map_or_else(|| "-".to_owned(), |m| m.to_string()),
                    b.pcm,
                    b.tus.len(),
                    b.total.frac_bits as f64 / rdintra::cost::FRAC_BITS_SCALE as f64,
                    b.total.distortion,
                );
            }
        }
        let s = &frame.summary;
        println!(
            "frame {i}: {} blocks ({} split, {} PCM), {:.1} bits, distortion {}, cost {:.1}",
            s.blocks,
            s.split_blocks,
            s.pcm_blocks,
            s.bits(),
            s.distortion,
            s.cost
        );
    }

    if let Some(path) = &cli.recon {
        let recon: Vec<Picture> = results.into_iter().map(|r| r.recon).collect();
        fs::write(path, rdintra::y4m::write_y4m(&recon))
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "reconstruction written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_search_config() {
        let cli = Cli::parse_from([
            "rdintra",
            "--qp",
            "27",
            "--tree",
            "no-split-below",
            "--min-split",
            "8",
            "--pcm",
            "--pcm-bit-depth",
            "6",
            "--prefer-pcm",
        ]);
        let config = cli.search_config(ChromaFormat::Yuv420, 8);
        assert_eq!(config.qp, 27);
        assert_eq!(config.residual_tree, ResidualTreeSearch::NoSplitBelow { min_split_size: 8 });
        assert!(config.pcm.enabled);
        assert_eq!(config.pcm.bit_depth_chroma, 6);
        assert_eq!(config.pcm.tie_break, PcmTieBreak::PreferPcm);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn synthetic_grid_alternates() {
        let cli = Cli::parse_from(["rdintra", "--pattern", "grid", "--width", "16", "--height", "16"]);
        let pic = synthetic(&cli).unwrap();
        let y = pic.plane(ComponentId::Y);
        assert_ne!(y.get(0, 0), y.get(8, 0));
        assert_eq!(y.get(0, 0), y.get(8, 8));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
