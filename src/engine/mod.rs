//! Engine capability boundary.
//!
//! The launcher drives an external, GPU-resident audio engine that it does
//! not implement. This module defines the narrow contract it requires from
//! such an engine: device enumeration and selection, launcher sessions,
//! processing graphs, stage modules, live processor instances and a
//! chunk-bounded synchronous executor.
//!
//! [`reference`] provides a CPU implementation of the full contract for
//! tests, benchmarks and the offline tools.

pub mod reference;

use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by an engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("device index {0} out of range")]
    DeviceOutOfRange(usize),
    #[error("no stage module at index {0}")]
    UnknownModule(usize),
    #[error("invalid stage specification: {0}")]
    InvalidSpecification(String),
    #[error("invalid port reference")]
    InvalidPort,
    #[error("sub-chunk of {requested} samples exceeds executor capacity {capacity}")]
    ChunkTooLarge { requested: usize, capacity: usize },
    #[error("channel count mismatch: executor configured for {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },
    #[error("engine backend failure: {0}")]
    Backend(String),
}

/// Descriptor of a compute device usable for audio processing.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
}

/// Entry of a session's stage-module table.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub index: usize,
    pub id: String,
}

/// Engine-assigned identity of a live processor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorId(pub u64);

/// Opaque reference to a processor's output port, used to wire chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPort {
    pub processor: ProcessorId,
    pub port: u32,
}

/// Immutable per-session executor tuning.
///
/// `retain_threshold` and `launch_threshold` tune the engine's internal
/// double-buffered submission; both are ratios in (0, 1]. The engine never
/// accepts more than `max_samples_per_channel` samples in a single launch.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub retain_threshold: f64,
    pub launch_threshold: f64,
    pub channels_in: u32,
    pub channels_out: u32,
    pub max_samples_per_channel: u32,
}

/// Entry point: a compute engine able to enumerate devices and open
/// launcher sessions on them.
pub trait AudioEngine: Send + Sync {
    fn device_count(&self) -> usize;

    fn device_info(&self, index: usize) -> Result<DeviceInfo, EngineError>;

    /// Open a launcher session bound to `device`.
    fn create_session(&self, device: &DeviceInfo) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// A launcher session bound to one device.
///
/// Owns the stage-module table and creates graphs, instances and executors.
pub trait EngineSession: Send + Sync {
    /// Create an empty processing graph owned by this session.
    fn create_graph(&self) -> Result<Box<dyn ProcessingGraph>, EngineError>;

    /// Number of stage modules known to this session.
    fn module_count(&self) -> usize;

    fn module_info(&self, index: usize) -> Result<ModuleInfo, EngineError>;

    /// Resolve a table entry to a loadable module.
    fn module(&self, info: &ModuleInfo) -> Result<Arc<dyn StageModule>, EngineError>;

    /// Create the synchronous chunk executor for a fully connected chain.
    ///
    /// `chain` lists the live instances in signal-flow order; the executor
    /// keeps whatever engine-side references it needs to launch them.
    fn create_executor(
        &self,
        graph: &dyn ProcessingGraph,
        chain: &[Arc<dyn ProcessorNode>],
        config: ExecutorConfig,
    ) -> Result<Box<dyn ChunkExecutor>, EngineError>;
}

/// Opaque processing graph; processor instances live inside one.
pub trait ProcessingGraph: Send + Sync {
    fn graph_id(&self) -> u64;
}

/// A loadable stage type, resolved from the session module table.
pub trait StageModule: Send + Sync {
    /// Instantiate this stage inside `graph` from its opaque specification
    /// bytes. The engine interprets `spec`; the launcher only stores and
    /// forwards it.
    fn create_processor(
        &self,
        graph: &dyn ProcessingGraph,
        spec: &[u8],
    ) -> Result<Arc<dyn ProcessorNode>, EngineError>;
}

/// A live processor instance.
///
/// Engine-side resources are released when the last handle is dropped.
pub trait ProcessorNode: Send + Sync {
    fn id(&self) -> ProcessorId;

    fn output_port(&self, port: u32) -> Result<OutputPort, EngineError>;

    fn connect_input(&self, port: u32, source: OutputPort) -> Result<(), EngineError>;
}

/// Synchronous, chunk-bounded execution primitive.
///
/// `execute` blocks until the sub-chunk's processed samples are written to
/// `output`. Implementations must reject requests larger than the
/// configured `max_samples_per_channel`. Dropping an executor drains any
/// in-flight launches before engine-side resources are released. Behavior
/// over an empty chain is engine-defined; the reference engine passes
/// input through unchanged.
pub trait ChunkExecutor: Send {
    fn execute(
        &mut self,
        nsamples: usize,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
    ) -> Result<(), EngineError>;
}
