//! Processor chain slots and assembly.

use std::sync::Arc;

use crate::engine::{ProcessingGraph, ProcessorNode, StageModule};

use super::LauncherError;

/// Everything required to (re)create one live stage instance.
///
/// The specification bytes are copied at load time and stay valid across
/// arm/disarm cycles. `instance` is `Some` only while the launcher is
/// armed and this slot did not fail construction.
pub(crate) struct StageSlot {
    pub(crate) id: String,
    pub(crate) module: Arc<dyn StageModule>,
    pub(crate) spec: Vec<u8>,
    pub(crate) instance: Option<Arc<dyn ProcessorNode>>,
}

/// Instantiate every slot in chain order and connect each instance after
/// the first to its predecessor (input port 0 ← output port 0).
///
/// Fails fast: the error is returned as soon as a creation or connection
/// call fails. Instances created up to that point stay in their slots —
/// there is no rollback, the session is expected to be torn down (see
/// [`LauncherError`]).
pub(crate) fn instantiate_chain(
    graph: &dyn ProcessingGraph,
    slots: &mut [StageSlot],
) -> Result<Vec<Arc<dyn ProcessorNode>>, LauncherError> {
    let mut nodes: Vec<Arc<dyn ProcessorNode>> = Vec::with_capacity(slots.len());
    for slot in slots.iter_mut() {
        let node = slot
            .module
            .create_processor(graph, &slot.spec)
            .map_err(|source| LauncherError::InstanceCreation {
                id: slot.id.clone(),
                source,
            })?;
        slot.instance = Some(Arc::clone(&node));

        if let Some(prev) = nodes.last() {
            let source_port =
                prev.output_port(0)
                    .map_err(|source| LauncherError::Connection {
                        id: slot.id.clone(),
                        source,
                    })?;
            node.connect_input(0, source_port)
                .map_err(|source| LauncherError::Connection {
                    id: slot.id.clone(),
                    source,
                })?;
        }
        nodes.push(node);
    }
    Ok(nodes)
}
