//! Audio file loading using Symphonia.
//!
//! Decodes WAV, MP3, FLAC and AAC input into planar per-channel buffers,
//! the layout the launcher consumes.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use thiserror::Error;

/// Errors that can occur during audio loading.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("No audio track found in file")]
    NoAudioTrack,

    #[error("Unknown sample rate")]
    UnknownSampleRate,
}

/// Decoded audio with planar channel buffers.
#[derive(Debug, Clone)]
pub struct AudioData {
    /// One buffer per channel, all the same length.
    pub channels: Vec<Vec<f32>>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioData {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration of the audio in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Borrow every channel as an immutable slice, in channel order.
    pub fn channel_slices(&self) -> Vec<&[f32]> {
        self.channels.iter().map(Vec::as_slice).collect()
    }
}

/// Load an audio file into planar f32 channel buffers.
///
/// Samples are normalized to the range -1.0..1.0.
pub fn load_audio(path: &Path) -> Result<AudioData, AudioError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(AudioError::NoAudioTrack)?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(AudioError::UnknownSampleRate)?;
    let nchannels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); nchannels];
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Skip corrupt packets.
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(capacity, spec));
        }

        if let Some(buf) = &mut sample_buf {
            buf.copy_interleaved_ref(decoded);
            // De-interleave into the planar channel buffers.
            for (i, &sample) in buf.samples().iter().enumerate() {
                channels[i % nchannels].push(sample);
            }
        }
    }

    Ok(AudioData {
        channels,
        sample_rate,
    })
}
