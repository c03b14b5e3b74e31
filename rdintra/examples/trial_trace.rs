//! Searches one block of a Y4M frame (or a synthetic ramp) and prints every
//! evaluated trial.
//!
//! Usage: trial_trace [input.y4m] [x y size]

use std::env;
use std::path::Path;

use rdintra::{
    ChromaFormat, CodingBlock, ComponentId, IntraSearch, Neighbours, Picture, SearchConfig,
};

fn ramp(width: u32, height: u32) -> Picture {
    let mut pic = Picture::new(width, height, ChromaFormat::Yuv420, 8);
    let plane = pic.plane_mut(ComponentId::Y);
    for y in 0..height {
        for x in 0..width {
            plane.set(x, y, ((x * 4 + y * 2) % 256) as u16);
        }
    }
    pic
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();
    let org = match args.first() {
        Some(path) => rdintra::y4m::read_y4m_file(Path::new(path))?.remove(0),
        None => ramp(32, 32),
    };
    let (x, y, size) = match &args[..] {
        [_, x, y, size] => (x.parse()?, y.parse()?, size.parse()?),
        _ => (0, 0, 16),
    };

    let config = SearchConfig {
        chroma_format: org.format,
        bit_depth: org.bit_depth,
        ..Default::default()
    };
    let mut search = IntraSearch::new(config)?;
    search.record_trials(true);
    let block = CodingBlock::new(x, y, size).with_neighbours(Neighbours::NONE);
    let mut rec = Picture::new(org.width(), org.height(), org.format, org.bit_depth);
    let decision = search.search(&block, &org, &mut rec)?;

    for r in search.trials() {
        println!(
            "{:>3} {:<15} {:>3},{:<3} {:>2}x{:<2} d{} mode {:>2} {:<10} {:>12.1}",
            r.group,
            format!("{:?}", r.stage),
            r.area.x,
            r.area.y,
            r.area.width,
            r.area.height,
            r.depth,
            r.mode,
            r.label,
            r.cost
        );
    }
    println!(
        "luma mode {}, chroma mode {:?}, pcm {}, {} transform units, cost {:.1}",
        decision.luma_mode,
        decision.chroma_mode,
        decision.pcm,
        decision.tus.len(),
        decision.total.cost
    );
    Ok(())
}
