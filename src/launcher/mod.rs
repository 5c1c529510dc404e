//! Launcher lifecycle, arm/disarm state machine and the process entry
//! point.
//!
//! A [`Launcher`] owns one device session and one processing graph for its
//! whole lifetime. Stages are described with [`Launcher::load_processor`],
//! instantiated and wired by [`Launcher::arm`], torn down (but kept
//! re-armable) by [`Launcher::disarm`], and driven by
//! [`Launcher::process`], which splits arbitrarily sized buffers into
//! engine-sized sub-chunks.

mod chain;
mod dispatch;

use std::sync::{Arc, Mutex};

use log::{debug, info};
use thiserror::Error;

use crate::engine::{
    AudioEngine, ChunkExecutor, EngineError, EngineSession, ExecutorConfig, ProcessingGraph,
};

use chain::{instantiate_chain, StageSlot};
use dispatch::dispatch_chunks;

/// Default retain threshold of the engine's double-buffered submission.
pub const DEFAULT_RETAIN_THRESHOLD: f64 = 0.625;
/// Default launch threshold of the engine's double-buffered submission.
pub const DEFAULT_LAUNCH_THRESHOLD: f64 = 0.7275;

/// Errors surfaced by launcher operations.
#[derive(Debug, Error)]
pub enum LauncherError {
    /// No supported compute device was found.
    #[error("no supported compute device found")]
    DeviceUnavailable,

    /// Device info, session, graph or executor creation failed.
    #[error("engine resource failure")]
    EngineResource(#[source] EngineError),

    /// The requested stage identifier is unknown to the session, or its
    /// module failed to load.
    #[error("stage `{id}` could not be resolved")]
    StageResolution {
        id: String,
        #[source]
        source: Option<EngineError>,
    },

    /// A stage failed to instantiate during arm. The session is left
    /// partially armed; drop the launcher and create a new one.
    #[error("stage `{id}` failed to instantiate")]
    InstanceCreation {
        id: String,
        #[source]
        source: EngineError,
    },

    /// Linking a stage to its predecessor failed during arm. Same recovery
    /// as [`LauncherError::InstanceCreation`].
    #[error("stage `{id}` could not be connected to its predecessor")]
    Connection {
        id: String,
        #[source]
        source: EngineError,
    },

    /// `load_processor` was called while the launcher is armed.
    #[error("cannot load a stage while the launcher is armed")]
    InvalidState,

    /// A sub-chunk execution failed after the launcher was armed. Output
    /// written by already completed sub-chunks remains in place.
    #[error("sub-chunk execution failed")]
    Execution(#[source] EngineError),
}

/// Armed carries the live executor, so the state flag and the resource can
/// never disagree.
enum LaunchState {
    Disarmed,
    Armed { executor: Box<dyn ChunkExecutor> },
}

struct LauncherInner {
    chain: Vec<StageSlot>,
    state: LaunchState,
}

/// Orchestrates a chain of named processing stages on an external compute
/// engine.
pub struct Launcher {
    inner: Mutex<LauncherInner>,
    config: ExecutorConfig,
    // Declaration order doubles as teardown order: the chain (inside
    // `inner`) before the graph, the graph before the session.
    graph: Box<dyn ProcessingGraph>,
    session: Box<dyn EngineSession>,
    _engine: Arc<dyn AudioEngine>,
}

impl Launcher {
    /// Open a launcher session on the default device.
    ///
    /// `max_samples_per_channel` is the engine's per-launch quantum; larger
    /// process requests are split internally.
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        channels: u32,
        max_samples_per_channel: u32,
    ) -> Result<Self, LauncherError> {
        LauncherBuilder::new()
            .channels(channels)
            .max_samples_per_channel(max_samples_per_channel)
            .build(engine)
    }

    pub fn builder() -> LauncherBuilder {
        LauncherBuilder::new()
    }

    /// The session's executor configuration.
    pub fn config(&self) -> ExecutorConfig {
        self.config
    }

    /// Number of stages currently loaded.
    pub fn stage_count(&self) -> usize {
        self.inner.lock().unwrap().chain.len()
    }

    /// Append a stage to the processing chain.
    ///
    /// `spec` is the stage's opaque construction record; it is copied, so
    /// the caller's buffer may be reused immediately. Fails with
    /// [`LauncherError::InvalidState`] while armed; on any failure the
    /// chain is left unchanged.
    pub fn load_processor(&self, stage_id: &str, spec: &[u8]) -> Result<(), LauncherError> {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, LaunchState::Armed { .. }) {
            return Err(LauncherError::InvalidState);
        }

        // First exact id match wins; entries with unreadable info are
        // skipped.
        let mut resolved = None;
        for index in 0..self.session.module_count() {
            if let Ok(info) = self.session.module_info(index) {
                if info.id == stage_id {
                    resolved = Some(info);
                    break;
                }
            }
        }
        let info = resolved.ok_or_else(|| LauncherError::StageResolution {
            id: stage_id.to_owned(),
            source: None,
        })?;
        let module = self
            .session
            .module(&info)
            .map_err(|source| LauncherError::StageResolution {
                id: stage_id.to_owned(),
                source: Some(source),
            })?;

        debug!("loaded stage `{stage_id}` ({} spec bytes)", spec.len());
        inner.chain.push(StageSlot {
            id: stage_id.to_owned(),
            module,
            spec: spec.to_vec(),
            instance: None,
        });
        Ok(())
    }

    /// Instantiate and connect the configured chain. No-op when already
    /// armed.
    ///
    /// On failure the session is left partially armed; already-created
    /// instances are not rolled back. The supported recovery is to drop
    /// the launcher and create a new one.
    pub fn arm(&self) -> Result<(), LauncherError> {
        let mut inner = self.inner.lock().unwrap();
        self.arm_locked(&mut inner)
    }

    fn arm_locked(&self, inner: &mut LauncherInner) -> Result<(), LauncherError> {
        if matches!(inner.state, LaunchState::Armed { .. }) {
            return Ok(());
        }

        let nodes = instantiate_chain(self.graph.as_ref(), &mut inner.chain)?;
        let executor = self
            .session
            .create_executor(self.graph.as_ref(), &nodes, self.config)
            .map_err(LauncherError::EngineResource)?;

        info!("armed processing chain of {} stage(s)", nodes.len());
        inner.state = LaunchState::Armed { executor };
        Ok(())
    }

    /// Tear down live instances, keeping specs and modules so the chain can
    /// be re-armed without reloading. Idempotent; never fails.
    pub fn disarm(&self) {
        let mut inner = self.inner.lock().unwrap();
        Self::disarm_locked(&mut inner);
    }

    fn disarm_locked(inner: &mut LauncherInner) {
        let state = std::mem::replace(&mut inner.state, LaunchState::Disarmed);
        if let LaunchState::Armed { executor } = state {
            // The executor drains in-flight launches on drop; instances are
            // only released afterwards.
            drop(executor);
            for slot in &mut inner.chain {
                slot.instance = None;
            }
            debug!("launcher disarmed");
        }
    }

    /// Process `nsamples` samples per channel from `input` into `output`.
    ///
    /// Arms implicitly on first use. Requests larger than the session's
    /// per-launch quantum are split into consecutive sub-chunks whose
    /// combined effect is identical to a single oversized call. Every
    /// channel slice must hold at least `nsamples` samples.
    pub fn process(
        &self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        nsamples: usize,
    ) -> Result<(), LauncherError> {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, LaunchState::Disarmed) {
            self.arm_locked(&mut inner)?;
        }
        let LaunchState::Armed { executor } = &mut inner.state else {
            unreachable!("arm_locked either armed the launcher or returned an error");
        };

        let quantum = self.config.max_samples_per_channel as usize;
        dispatch_chunks(executor.as_mut(), quantum, input, output, nsamples)
            .map_err(LauncherError::Execution)
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        // Best-effort: release the chain before the graph and session go
        // away (field order handles the rest). Never panics.
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Self::disarm_locked(&mut inner);
    }
}

/// Builder for [`Launcher`] sessions.
///
/// Defaults: 2 channels, 256 samples per channel per launch, device 0 and
/// the stock submission thresholds.
#[derive(Debug, Clone)]
pub struct LauncherBuilder {
    channels: u32,
    max_samples_per_channel: u32,
    device_index: usize,
    retain_threshold: f64,
    launch_threshold: f64,
}

impl Default for LauncherBuilder {
    fn default() -> Self {
        Self {
            channels: 2,
            max_samples_per_channel: 256,
            device_index: 0,
            retain_threshold: DEFAULT_RETAIN_THRESHOLD,
            launch_threshold: DEFAULT_LAUNCH_THRESHOLD,
        }
    }
}

impl LauncherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }

    pub fn max_samples_per_channel(mut self, samples: u32) -> Self {
        self.max_samples_per_channel = samples;
        self
    }

    pub fn device_index(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }

    pub fn retain_threshold(mut self, ratio: f64) -> Self {
        self.retain_threshold = ratio;
        self
    }

    pub fn launch_threshold(mut self, ratio: f64) -> Self {
        self.launch_threshold = ratio;
        self
    }

    /// Select and validate the device, open the session and create an empty
    /// processing graph. A failure at any step releases everything already
    /// acquired.
    pub fn build(self, engine: Arc<dyn AudioEngine>) -> Result<Launcher, LauncherError> {
        if self.device_index >= engine.device_count() {
            return Err(LauncherError::DeviceUnavailable);
        }
        let device = engine
            .device_info(self.device_index)
            .map_err(LauncherError::EngineResource)?;
        info!("using compute device {} (`{}`)", device.index, device.name);

        let session = engine
            .create_session(&device)
            .map_err(LauncherError::EngineResource)?;
        let graph = session
            .create_graph()
            .map_err(LauncherError::EngineResource)?;
        debug!("created processing graph {}", graph.graph_id());

        let config = ExecutorConfig {
            retain_threshold: self.retain_threshold,
            launch_threshold: self.launch_threshold,
            channels_in: self.channels,
            channels_out: self.channels,
            max_samples_per_channel: self.max_samples_per_channel,
        };

        Ok(Launcher {
            inner: Mutex::new(LauncherInner {
                chain: Vec::new(),
                state: LaunchState::Disarmed,
            }),
            config,
            graph,
            session,
            _engine: engine,
        })
    }
}
