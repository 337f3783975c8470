/*! The layer trait implemented by every pipeline stage.

Layers are the building blocks of a simulation. Each one does one stage of
the data path, owns its own state, and is driven by the pipeline. A layer's
`process()` runs a unit of work (a frame or a packet burst) to completion;
the pipeline moves the produced value to the next layer.
*/

use crate::Result;

/// Pipeline stage trait.
///
/// Configuration happens at construction (each layer has a `new(config)`),
/// so the trait covers only the run-time capability set: process a unit,
/// reset, and report status.
pub trait Layer {
    /// Input unit consumed per `process()` call.
    type Input;

    /// Output produced per `process()` call.
    type Output;

    /// Name of the layer, e.g. `McuLayer`.
    fn layer_name(&self) -> &'static str;

    /// Run one unit of work to completion.
    fn process(&mut self, input: Self::Input) -> Result<Self::Output>;

    /// Drop all in-flight state and zero the status counters.
    fn reset(&mut self);

    /// Human-readable counter summary.
    fn status(&self) -> String {
        format!("{}: {}", self.layer_name(), self.stats())
    }

    /// Current counters.
    fn stats(&self) -> LayerStats;
}

/// Counters every layer reports through `status()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerStats {
    /// Frames accepted by this layer.
    pub frames_received: u64,
    /// Frames dropped (overflow, timeout policy, storm).
    pub frames_dropped: u64,
    /// Per-packet CRC failures, line or header.
    pub crc_errors: u64,
    /// Reassembly slots that hit their deadline.
    pub timeouts: u64,
}

impl std::fmt::Display for LayerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frames_received={} frames_dropped={} crc_errors={} timeouts={}",
            self.frames_received, self.frames_dropped, self.crc_errors, self.timeouts
        )
    }
}
