//! CPU reference engine.
//!
//! Implements the full engine contract on the host so the launcher's state
//! machine and chunked dispatch can be exercised end-to-end without GPU
//! hardware. Used by the test suites, the benchmarks and the offline WAV
//! tools. The kernels here stand in for the GPU backend; they do not
//! define it.

use std::collections::HashMap;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::info;

use crate::stages::{FirSpec, GainSpec, IirSpec, StageKind};

use super::{
    AudioEngine, ChunkExecutor, DeviceInfo, EngineError, EngineSession, ExecutorConfig,
    ModuleInfo, OutputPort, ProcessingGraph, ProcessorId, ProcessorNode, StageModule,
};

/// Counters describing what the engine has done so far.
///
/// Tests use these to observe behavior the launcher API deliberately hides:
/// how many instances were created or released, how many port connections
/// were made, how many launches the executor performed and how large each
/// launch was.
#[derive(Debug, Default)]
pub struct EngineStats {
    processors_created: AtomicUsize,
    processors_dropped: AtomicUsize,
    connections: AtomicUsize,
    launches: AtomicUsize,
    launch_sizes: Mutex<Vec<usize>>,
}

impl EngineStats {
    pub fn processors_created(&self) -> usize {
        self.processors_created.load(Ordering::Relaxed)
    }

    pub fn processors_dropped(&self) -> usize {
        self.processors_dropped.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::Relaxed)
    }

    /// Sample count of every launch, in submission order.
    pub fn launch_sizes(&self) -> Vec<usize> {
        self.launch_sizes.lock().unwrap().clone()
    }

    fn record_launch(&self, nsamples: usize) {
        self.launches.fetch_add(1, Ordering::Relaxed);
        self.launch_sizes.lock().unwrap().push(nsamples);
    }
}

/// Host-side engine exposing one virtual device and the built-in stage
/// modules (`gain`, `fir`, `iir`).
#[derive(Debug, Default)]
pub struct ReferenceEngine {
    stats: Arc<EngineStats>,
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }
}

impl AudioEngine for ReferenceEngine {
    fn device_count(&self) -> usize {
        1
    }

    fn device_info(&self, index: usize) -> Result<DeviceInfo, EngineError> {
        if index >= self.device_count() {
            return Err(EngineError::DeviceOutOfRange(index));
        }
        Ok(DeviceInfo {
            index,
            name: "cpu-reference".to_owned(),
        })
    }

    fn create_session(&self, device: &DeviceInfo) -> Result<Box<dyn EngineSession>, EngineError> {
        if device.index >= self.device_count() {
            return Err(EngineError::DeviceOutOfRange(device.index));
        }
        info!("opened reference engine session on `{}`", device.name);
        Ok(Box::new(ReferenceSession {
            registry: Arc::new(Mutex::new(Registry::default())),
            stats: Arc::clone(&self.stats),
            next_processor: Arc::new(AtomicU64::new(1)),
            next_graph: AtomicU64::new(1),
        }))
    }
}

/// Live kernels of a session, keyed by processor id.
#[derive(Default)]
struct Registry {
    kernels: HashMap<u64, KernelSlot>,
}

struct KernelSlot {
    kernel: Kernel,
    input: Option<OutputPort>,
}

struct ReferenceSession {
    registry: Arc<Mutex<Registry>>,
    stats: Arc<EngineStats>,
    next_processor: Arc<AtomicU64>,
    next_graph: AtomicU64,
}

impl EngineSession for ReferenceSession {
    fn create_graph(&self) -> Result<Box<dyn ProcessingGraph>, EngineError> {
        Ok(Box::new(ReferenceGraph {
            id: self.next_graph.fetch_add(1, Ordering::Relaxed),
        }))
    }

    fn module_count(&self) -> usize {
        StageKind::all().len()
    }

    fn module_info(&self, index: usize) -> Result<ModuleInfo, EngineError> {
        StageKind::all()
            .get(index)
            .map(|kind| ModuleInfo {
                index,
                id: kind.id().to_owned(),
            })
            .ok_or(EngineError::UnknownModule(index))
    }

    fn module(&self, info: &ModuleInfo) -> Result<Arc<dyn StageModule>, EngineError> {
        let kind = StageKind::from_id(&info.id).ok_or(EngineError::UnknownModule(info.index))?;
        Ok(Arc::new(ReferenceModule {
            kind,
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            next_processor: Arc::clone(&self.next_processor),
        }))
    }

    fn create_executor(
        &self,
        _graph: &dyn ProcessingGraph,
        chain: &[Arc<dyn ProcessorNode>],
        config: ExecutorConfig,
    ) -> Result<Box<dyn ChunkExecutor>, EngineError> {
        let ids: Vec<u64> = chain.iter().map(|node| node.id().0).collect();

        // The chain must already be wired front to back before an executor
        // can be bound to it.
        let registry = self.registry.lock().unwrap();
        for (i, &id) in ids.iter().enumerate() {
            let slot = registry.kernels.get(&id).ok_or(EngineError::InvalidPort)?;
            if i > 0 {
                let expected = OutputPort {
                    processor: ProcessorId(ids[i - 1]),
                    port: 0,
                };
                if slot.input != Some(expected) {
                    return Err(EngineError::Backend(
                        "executor chain is not fully connected".to_owned(),
                    ));
                }
            }
        }
        drop(registry);

        let max = config.max_samples_per_channel as usize;
        let channels = config.channels_in.max(config.channels_out) as usize;
        Ok(Box::new(ReferenceExecutor {
            ids,
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            config,
            scratch_a: vec![vec![0.0; max]; channels],
            scratch_b: vec![vec![0.0; max]; channels],
        }))
    }
}

struct ReferenceGraph {
    id: u64,
}

impl ProcessingGraph for ReferenceGraph {
    fn graph_id(&self) -> u64 {
        self.id
    }
}

struct ReferenceModule {
    kind: StageKind,
    registry: Arc<Mutex<Registry>>,
    stats: Arc<EngineStats>,
    next_processor: Arc<AtomicU64>,
}

impl StageModule for ReferenceModule {
    fn create_processor(
        &self,
        _graph: &dyn ProcessingGraph,
        spec: &[u8],
    ) -> Result<Arc<dyn ProcessorNode>, EngineError> {
        let kernel = Kernel::from_spec(self.kind, spec)?;
        let id = ProcessorId(self.next_processor.fetch_add(1, Ordering::Relaxed));
        self.registry.lock().unwrap().kernels.insert(
            id.0,
            KernelSlot {
                kernel,
                input: None,
            },
        );
        self.stats.processors_created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(ReferenceNode {
            id,
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct ReferenceNode {
    id: ProcessorId,
    registry: Arc<Mutex<Registry>>,
    stats: Arc<EngineStats>,
}

impl ProcessorNode for ReferenceNode {
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn output_port(&self, port: u32) -> Result<OutputPort, EngineError> {
        if port != 0 {
            return Err(EngineError::InvalidPort);
        }
        Ok(OutputPort {
            processor: self.id,
            port,
        })
    }

    fn connect_input(&self, port: u32, source: OutputPort) -> Result<(), EngineError> {
        if port != 0 || source.port != 0 {
            return Err(EngineError::InvalidPort);
        }
        let mut registry = self.registry.lock().unwrap();
        if !registry.kernels.contains_key(&source.processor.0) {
            return Err(EngineError::InvalidPort);
        }
        let slot = registry
            .kernels
            .get_mut(&self.id.0)
            .ok_or(EngineError::InvalidPort)?;
        slot.input = Some(source);
        self.stats.connections.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for ReferenceNode {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.kernels.remove(&self.id.0);
        }
        self.stats.processors_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

struct ReferenceExecutor {
    ids: Vec<u64>,
    registry: Arc<Mutex<Registry>>,
    stats: Arc<EngineStats>,
    config: ExecutorConfig,
    scratch_a: Vec<Vec<f32>>,
    scratch_b: Vec<Vec<f32>>,
}

impl ChunkExecutor for ReferenceExecutor {
    fn execute(
        &mut self,
        nsamples: usize,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
    ) -> Result<(), EngineError> {
        let capacity = self.config.max_samples_per_channel as usize;
        if nsamples > capacity {
            return Err(EngineError::ChunkTooLarge {
                requested: nsamples,
                capacity,
            });
        }
        if input.len() != self.config.channels_in as usize {
            return Err(EngineError::ChannelMismatch {
                expected: self.config.channels_in as usize,
                got: input.len(),
            });
        }
        if output.len() != self.config.channels_out as usize {
            return Err(EngineError::ChannelMismatch {
                expected: self.config.channels_out as usize,
                got: output.len(),
            });
        }
        for channel in input {
            if channel.len() < nsamples {
                return Err(EngineError::Backend(
                    "input channel shorter than sub-chunk".to_owned(),
                ));
            }
        }
        for channel in output.iter() {
            if channel.len() < nsamples {
                return Err(EngineError::Backend(
                    "output channel shorter than sub-chunk".to_owned(),
                ));
            }
        }

        self.stats.record_launch(nsamples);

        if self.ids.is_empty() {
            // Empty chain passes input through unchanged.
            for (src, dst) in input.iter().zip(output.iter_mut()) {
                dst[..nsamples].copy_from_slice(&src[..nsamples]);
            }
            return Ok(());
        }

        for (ch, src) in input.iter().enumerate() {
            self.scratch_a[ch][..nsamples].copy_from_slice(&src[..nsamples]);
        }

        let mut registry = self.registry.lock().unwrap();
        for &id in &self.ids {
            let slot = registry.kernels.get_mut(&id).ok_or_else(|| {
                EngineError::Backend("processor released while executor alive".to_owned())
            })?;
            for ch in 0..input.len() {
                slot.kernel.process(
                    ch,
                    &self.scratch_a[ch][..nsamples],
                    &mut self.scratch_b[ch][..nsamples],
                );
            }
            std::mem::swap(&mut self.scratch_a, &mut self.scratch_b);
        }

        for (ch, dst) in output.iter_mut().enumerate() {
            dst[..nsamples].copy_from_slice(&self.scratch_a[ch][..nsamples]);
        }
        Ok(())
    }
}

/// Per-stage processing state. FIR and IIR carry per-channel state across
/// launches so sub-chunk boundaries are seamless.
enum Kernel {
    Gain {
        gain: f32,
    },
    Fir {
        taps: Vec<f32>,
        history: Vec<Vec<f32>>,
    },
    Iir {
        coeffs: Biquad,
        state: Vec<[f32; 4]>,
    },
}

impl Kernel {
    fn from_spec(kind: StageKind, spec: &[u8]) -> Result<Self, EngineError> {
        match kind {
            StageKind::Gain => {
                let spec: GainSpec = bytemuck::try_pod_read_unaligned(spec)
                    .map_err(|e| EngineError::InvalidSpecification(format!("gain record: {e}")))?;
                if !spec.magic_ok() {
                    return Err(EngineError::InvalidSpecification(
                        "gain record magic mismatch".to_owned(),
                    ));
                }
                Ok(Kernel::Gain {
                    gain: spec.params.gain_value,
                })
            }
            StageKind::Fir => {
                let spec: FirSpec = bytemuck::try_pod_read_unaligned(spec)
                    .map_err(|e| EngineError::InvalidSpecification(format!("fir record: {e}")))?;
                if !spec.magic_ok() {
                    return Err(EngineError::InvalidSpecification(
                        "fir record magic mismatch".to_owned(),
                    ));
                }
                if spec.filter_length == 0 {
                    return Err(EngineError::InvalidSpecification(
                        "fir filter length must be at least 1".to_owned(),
                    ));
                }
                // Reference IR bank: an order-`filter_length` moving average.
                let len = spec.filter_length as usize;
                Ok(Kernel::Fir {
                    taps: vec![1.0 / len as f32; len],
                    history: Vec::new(),
                })
            }
            StageKind::Iir => {
                let spec: IirSpec = bytemuck::try_pod_read_unaligned(spec)
                    .map_err(|e| EngineError::InvalidSpecification(format!("iir record: {e}")))?;
                if !spec.magic_ok() {
                    return Err(EngineError::InvalidSpecification(
                        "iir record magic mismatch".to_owned(),
                    ));
                }
                if spec.sample_rate <= 0.0
                    || spec.band_pass_freq <= 0.0
                    || spec.band_pass_freq >= spec.sample_rate / 2.0
                    || spec.band_pass_q <= 0.0
                {
                    return Err(EngineError::InvalidSpecification(
                        "iir band-pass parameters out of range".to_owned(),
                    ));
                }
                Ok(Kernel::Iir {
                    coeffs: Biquad::band_pass(
                        spec.sample_rate,
                        spec.band_pass_freq,
                        spec.band_pass_q,
                    ),
                    state: Vec::new(),
                })
            }
        }
    }

    fn process(&mut self, channel: usize, input: &[f32], output: &mut [f32]) {
        match self {
            Kernel::Gain { gain } => {
                for (out, sample) in output.iter_mut().zip(input) {
                    *out = sample * *gain;
                }
            }
            Kernel::Fir { taps, history } => {
                while history.len() <= channel {
                    history.push(vec![0.0; taps.len() - 1]);
                }
                let hist = &mut history[channel];
                for n in 0..input.len() {
                    let mut acc = 0.0;
                    for (k, tap) in taps.iter().enumerate() {
                        let x = if n >= k {
                            input[n - k]
                        } else {
                            hist[hist.len() - (k - n)]
                        };
                        acc += tap * x;
                    }
                    output[n] = acc;
                }
                let keep = taps.len() - 1;
                if keep > 0 {
                    if input.len() >= keep {
                        hist.clear();
                        hist.extend_from_slice(&input[input.len() - keep..]);
                    } else {
                        hist.drain(..input.len());
                        hist.extend_from_slice(input);
                    }
                }
            }
            Kernel::Iir { coeffs, state } => {
                while state.len() <= channel {
                    state.push([0.0; 4]);
                }
                let s = &mut state[channel];
                for (out, &x) in output.iter_mut().zip(input) {
                    let y = coeffs.b0 * x + coeffs.b1 * s[0] + coeffs.b2 * s[1]
                        - coeffs.a1 * s[2]
                        - coeffs.a2 * s[3];
                    s[1] = s[0];
                    s[0] = x;
                    s[3] = s[2];
                    s[2] = y;
                    *out = y;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Biquad {
    /// Band-pass with 0 dB peak gain, per the audio EQ cookbook.
    fn band_pass(sample_rate: f32, freq: f32, q: f32) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let alpha = omega.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * omega.cos() / a0,
            a2: (1.0 - alpha) / a0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(kind: StageKind, spec: &[u8]) -> Kernel {
        Kernel::from_spec(kind, spec).expect("kernel")
    }

    #[test]
    fn test_module_table_lists_builtin_stages() {
        let engine = ReferenceEngine::new();
        let device = engine.device_info(0).unwrap();
        let session = engine.create_session(&device).unwrap();

        assert_eq!(session.module_count(), 3);
        let ids: Vec<String> = (0..session.module_count())
            .map(|i| session.module_info(i).unwrap().id)
            .collect();
        assert_eq!(ids, ["gain", "fir", "iir"]);
        assert!(session.module_info(3).is_err());
    }

    #[test]
    fn test_gain_kernel_scales_samples() {
        let mut k = kernel(StageKind::Gain, GainSpec::new(2.5).as_bytes());
        let input = [1.0, -0.5, 0.0];
        let mut output = [0.0; 3];
        k.process(0, &input, &mut output);
        assert_eq!(output, [2.5, -1.25, 0.0]);
    }

    #[test]
    fn test_gain_kernel_rejects_bad_magic() {
        let mut bytes = GainSpec::new(1.0).as_bytes().to_vec();
        bytes[0] ^= 0xFF;
        assert!(matches!(
            Kernel::from_spec(StageKind::Gain, &bytes),
            Err(EngineError::InvalidSpecification(_))
        ));
    }

    #[test]
    fn test_kernel_rejects_truncated_record() {
        assert!(matches!(
            Kernel::from_spec(StageKind::Fir, &[0u8; 3]),
            Err(EngineError::InvalidSpecification(_))
        ));
    }

    #[test]
    fn test_fir_history_spans_chunk_boundaries() {
        let spec = FirSpec::new(8, 4);

        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.3).sin()).collect();

        let mut whole = kernel(StageKind::Fir, spec.as_bytes());
        let mut expected = vec![0.0; 64];
        whole.process(0, &input, &mut expected);

        let mut split = kernel(StageKind::Fir, spec.as_bytes());
        let mut got = vec![0.0; 64];
        split.process(0, &input[..20], &mut got[..20]);
        split.process(0, &input[20..23], &mut got[20..23]);
        split.process(0, &input[23..], &mut got[23..]);

        assert_eq!(expected, got);
    }

    #[test]
    fn test_iir_state_spans_chunk_boundaries() {
        let spec = IirSpec::new(48_000.0, 2_000.0, 0.7);

        let input: Vec<f32> = (0..128).map(|i| (i as f32 * 0.11).sin()).collect();

        let mut whole = kernel(StageKind::Iir, spec.as_bytes());
        let mut expected = vec![0.0; 128];
        whole.process(0, &input, &mut expected);

        let mut split = kernel(StageKind::Iir, spec.as_bytes());
        let mut got = vec![0.0; 128];
        split.process(0, &input[..50], &mut got[..50]);
        split.process(0, &input[50..], &mut got[50..]);

        assert_eq!(expected, got);
    }

    #[test]
    fn test_iir_rejects_out_of_range_band() {
        let spec = IirSpec::new(48_000.0, 30_000.0, 0.7);
        assert!(matches!(
            Kernel::from_spec(StageKind::Iir, spec.as_bytes()),
            Err(EngineError::InvalidSpecification(_))
        ));
    }

    #[test]
    fn test_kernels_keep_channels_independent() {
        let mut k = kernel(StageKind::Fir, FirSpec::new(4, 2).as_bytes());
        let left = [1.0; 16];
        let right = [0.0; 16];
        let mut out_left = [0.0; 16];
        let mut out_right = [0.0; 16];
        k.process(0, &left, &mut out_left);
        k.process(1, &right, &mut out_right);

        // The moving average of a constant settles on that constant.
        assert!((out_left[15] - 1.0).abs() < 1e-6);
        assert_eq!(out_right, [0.0; 16]);
    }
}
