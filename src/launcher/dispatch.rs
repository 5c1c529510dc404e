//! Chunked dispatch of oversized process requests.

use log::trace;

use crate::engine::{ChunkExecutor, EngineError};

/// Feed `nsamples` samples per channel through `executor` in engine-sized
/// sub-chunks.
///
/// Requests of up to `quantum` samples forward the caller's channel slice
/// arrays untouched. Larger requests advance a cursor and materialize
/// per-sub-chunk slice arrays, so the combined effect is identical to the
/// single oversized call the engine cannot actually accept. `nsamples == 0`
/// performs no sub-calls.
pub(crate) fn dispatch_chunks(
    executor: &mut dyn ChunkExecutor,
    quantum: usize,
    input: &[&[f32]],
    output: &mut [&mut [f32]],
    nsamples: usize,
) -> Result<(), EngineError> {
    if nsamples == 0 {
        return Ok(());
    }
    if nsamples <= quantum {
        return executor.execute(nsamples, input, output);
    }

    trace!("splitting {nsamples}-sample request into {quantum}-sample sub-chunks");
    let mut cursor = 0;
    while cursor < nsamples {
        let len = quantum.min(nsamples - cursor);
        let sub_in: Vec<&[f32]> = input.iter().map(|ch| &ch[cursor..cursor + len]).collect();
        let mut sub_out: Vec<&mut [f32]> = output
            .iter_mut()
            .map(|ch| &mut ch[cursor..cursor + len])
            .collect();
        executor.execute(len, &sub_in, &mut sub_out)?;
        cursor += len;
    }
    Ok(())
}
