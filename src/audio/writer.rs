//! WAV output.
//!
//! Minimal 16-bit PCM writer for the offline tools; interleaves planar
//! channel buffers on the way out.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Write planar channel buffers as a 16-bit PCM WAV file.
///
/// All channels must have equal length; samples are clamped to [-1, 1].
pub fn write_wav(path: &Path, channels: &[Vec<f32>], sample_rate: u32) -> std::io::Result<()> {
    let nchannels = channels.len() as u16;
    let frames = channels.first().map_or(0, Vec::len);

    let block_align = nchannels * 2;
    let byte_rate = sample_rate * block_align as u32;
    let data_size = frames as u32 * block_align as u32;
    let file_size = 36 + data_size;

    let mut file = BufWriter::new(File::create(path)?);

    // RIFF header
    file.write_all(b"RIFF")?;
    file.write_all(&file_size.to_le_bytes())?;
    file.write_all(b"WAVE")?;

    // fmt chunk
    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?; // chunk size
    file.write_all(&1u16.to_le_bytes())?; // PCM format
    file.write_all(&nchannels.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&16u16.to_le_bytes())?; // bits per sample

    // data chunk
    file.write_all(b"data")?;
    file.write_all(&data_size.to_le_bytes())?;

    for frame in 0..frames {
        for channel in channels {
            let clamped = channel[frame].clamp(-1.0, 1.0);
            let sample = (clamped * 32767.0) as i16;
            file.write_all(&sample.to_le_bytes())?;
        }
    }

    file.flush()
}
