//! Offline IIR band-pass processing of an audio file.
//!
//! The band-pass is parameterized from the command line; the sample rate
//! is taken from the input file. The whole file is processed in a single
//! call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use proclaunch::audio::{self, load_audio, write_wav};
use proclaunch::engine::reference::ReferenceEngine;
use proclaunch::stages::IirSpec;
use proclaunch::Launcher;

/// Samples per channel the session's executor accepts per launch.
const BUFFER_SIZE: u32 = 512;

#[derive(Parser, Debug)]
#[command(about = "Process an audio file through an IIR band-pass stage")]
struct Args {
    /// Path to the input audio file
    input: PathBuf,

    /// Band-pass center frequency in Hz
    #[arg(short, long, default_value_t = 5_000.0)]
    freq: f32,

    /// Filter quality factor
    #[arg(short = 'q', long, default_value_t = 0.5)]
    quality: f32,
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
    let spec = IirSpec::new(input.sample_rate as f32, args.freq, args.quality);
    launcher.load_processor("iir", spec.as_bytes())?;

    let mut processed = vec![vec![0.0_f32; frames]; nchannels];
    let in_refs = input.channel_slices();
    let mut out_refs = audio::as_mut_slices(&mut processed);
    launcher.process(&in_refs, &mut out_refs, frames)?;
    drop(out_refs);

    let out_path = output_path(&args.input, args.freq, args.quality);
    write_wav(&out_path, &processed, input.sample_rate)
        .with_context(|| format!("could not save output to {}", out_path.display()))?;

    println!("wrote {}", out_path.display());
    Ok(())
}

fn output_path(input: &Path, freq: f32, q: f32) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    input.with_file_name(format!("{stem}_iir_{freq}_{q}.wav"))
}
