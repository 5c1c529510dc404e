//! Offline FIR processing of an audio file.
//!
//! Each `--filter LEN[:IDX]` argument adds one FIR stage to the chain,
//! selecting an impulse response of `LEN` taps (index defaults to the
//! middle of the bank). The whole file is processed in a single call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use proclaunch::audio::{self, load_audio, write_wav};
use proclaunch::engine::reference::ReferenceEngine;
use proclaunch::stages::FirSpec;
use proclaunch::Launcher;

/// Samples per channel the session's executor accepts per launch.
const BUFFER_SIZE: u32 = 512;

#[derive(Parser, Debug)]
#[command(about = "Process an audio file through a chain of FIR filter stages")]
struct Args {
    /// Path to the input audio file
    input: PathBuf,

    /// Filter per chained stage as LEN[:IDX] (repeat for multiple stages)
    #[arg(
        short,
        long = "filter",
        required = true,
        num_args = 1..,
        value_parser = parse_filter,
        value_name = "LEN[:IDX]"
    )]
    filters: Vec<(u32, u32)>,
}

fn parse_filter(arg: &str) -> Result<(u32, u32), String> {
    let (len_str, idx_str) = match arg.split_once(':') {
        Some((len, idx)) => (len, Some(idx)),
        None => (arg, None),
    };
    let length: u32 = len_str
        .parse()
        .map_err(|_| format!("invalid filter length `{len_str}`"))?;
    if length == 0 {
        return Err("filter length must be at least 1".to_owned());
    }
    let index = match idx_str {
        Some(idx) => idx
            .parse()
            .map_err(|_| format!("invalid filter index `{idx}`"))?,
        None => length / 2,
    };
    Ok((length, index))
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
    for &(length, index) in &args.filters {
        launcher.load_processor("fir", FirSpec::new(length, index).as_bytes())?;
    }

    let mut processed = vec![vec![0.0_f32; frames]; nchannels];
    let in_refs = input.channel_slices();
    let mut out_refs = audio::as_mut_slices(&mut processed);
    launcher.process(&in_refs, &mut out_refs, frames)?;
    drop(out_refs);

    let out_path = output_path(&args.input, &args.filters);
    write_wav(&out_path, &processed, input.sample_rate)
        .with_context(|| format!("could not save output to {}", out_path.display()))?;

    println!("wrote {}", out_path.display());
    Ok(())
}

fn output_path(input: &Path, filters: &[(u32, u32)]) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    let suffix: String = filters
        .iter()
        .map(|(len, idx)| format!("_{len}_{idx}"))
        .collect();
    input.with_file_name(format!("{stem}_fir{suffix}.wav"))
}
