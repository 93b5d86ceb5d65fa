use serde::{Deserialize, Serialize};

/// Numeric backend used to execute the per-step primitives.
///
/// All variants produce the same spike trains and weight trajectories for the
/// same network and input sequence. The choice is made once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Full `N x N` weight and delay arrays.
    Dense,
    /// Compressed rows per pre-synaptic neuron.
    Sparse,
    /// Synapse matrix partitioned over a pool of worker threads.
    Accelerated,
    /// Resolved to one of the above from network size and density.
    Auto,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Auto
    }
}
