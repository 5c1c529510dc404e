//! Planar audio buffers, file glue and test-signal generation for the
//! offline tools and the test suites.

pub mod loader;
pub mod synth;
pub mod writer;

pub use loader::{load_audio, AudioData, AudioError};
pub use writer::write_wav;

/// Borrow planar channel buffers as immutable slices, in channel order.
pub fn as_slices(channels: &[Vec<f32>]) -> Vec<&[f32]> {
    channels.iter().map(Vec::as_slice).collect()
}

/// Borrow planar channel buffers as mutable slices, in channel order.
pub fn as_mut_slices(channels: &mut [Vec<f32>]) -> Vec<&mut [f32]> {
    channels.iter_mut().map(Vec::as_mut_slice).collect()
}
