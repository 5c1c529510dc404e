//! Proclaunch Core
//!
//! Processor-chain launcher for GPU-resident audio engines.
//!
//! # Features
//!
//! - Arm/disarm lifecycle over a device session and processing graph
//! - Named stage chains assembled from opaque configuration records
//! - Chunked dispatch: arbitrarily sized buffers split into engine-sized
//!   sub-chunks with sample ordering preserved across boundaries
//! - Capability traits for the engine boundary, plus a CPU reference
//!   engine for tests and the offline tools
//! - Offline WAV tools (gain / FIR / IIR) via Symphonia decoding
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use proclaunch::engine::reference::ReferenceEngine;
//! use proclaunch::stages::GainSpec;
//! use proclaunch::Launcher;
//!
//! # fn main() -> Result<(), proclaunch::LauncherError> {
//! let engine = Arc::new(ReferenceEngine::new());
//! let launcher = Launcher::new(engine, 2, 256)?;
//! launcher.load_processor("gain", GainSpec::new(0.5).as_bytes())?;
//!
//! // 600 samples exceed the 256-sample quantum; the launcher splits the
//! // request into sub-chunks internally.
//! let input = vec![vec![1.0_f32; 600]; 2];
//! let mut output = vec![vec![0.0_f32; 600]; 2];
//! let in_refs = proclaunch::audio::as_slices(&input);
//! let mut out_refs = proclaunch::audio::as_mut_slices(&mut output);
//! launcher.process(&in_refs, &mut out_refs, 600)?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod engine;
pub mod launcher;
pub mod stages;

// Re-export commonly used types
pub use engine::{AudioEngine, ChunkExecutor, EngineError, ExecutorConfig};
pub use launcher::{Launcher, LauncherBuilder, LauncherError};
pub use stages::{FirSpec, GainSpec, IirSpec, StageKind};
