//! Offline gain processing of an audio file.
//!
//! Decodes the input, builds a chain of gain stages on the reference
//! engine, processes the whole file in a single call (the launcher splits
//! it into quantum-sized sub-chunks internally) and writes the result next
//! to the input.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use proclaunch::audio::{self, load_audio, write_wav};
use proclaunch::engine::reference::ReferenceEngine;
use proclaunch::stages::GainSpec;
use proclaunch::Launcher;

/// Samples per channel the session's executor accepts per launch.
const BUFFER_SIZE: u32 = 512;

#[derive(Parser, Debug)]
#[command(about = "Process an audio file through a chain of gain stages")]
struct Args {
    /// Path to the input audio file
    input: PathBuf,

    /// Gain factor per chained stage (repeat for multiple stages)
    #[arg(short, long = "gain", required = true, num_args = 1.., value_name = "FACTOR")]
    gains: Vec<f32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let input = load_audio(&args.input)
        .with_context(|| format!("could not open input from {}", args.input.display()))?;
    let nchannels = input.channel_count();
    let frames = input.frames();

    let engine = Arc::new(ReferenceEngine::new());
    let launcher = Launcher::new(engine, nchannels as u32, BUFFER_SIZE)?;
    for &gain in &args.gains {
        launcher.load_processor("gain", GainSpec::new(gain).as_bytes())?;
    }

    let mut processed = vec![vec![0.0_f32; frames]; nchannels];
    let in_refs = input.channel_slices();
    let mut out_refs = audio::as_mut_slices(&mut processed);
    launcher.process(&in_refs, &mut out_refs, frames)?;
    drop(out_refs);

    let out_path = output_path(&args.input, &args.gains);
    write_wav(&out_path, &processed, input.sample_rate)
        .with_context(|| format!("could not save output to {}", out_path.display()))?;

    println!("wrote {}", out_path.display());
    Ok(())
}

fn output_path(input: &Path, gains: &[f32]) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    let suffix: String = gains.iter().map(|g| format!("_{g}")).collect();
    input.with_file_name(format!("{stem}_gain{suffix}.wav"))
}
