use serde::{Deserialize, Serialize};

/// Read view of the whole network at the end of step `t`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// `None` before the first step.
    pub t: Option<usize>,
    pub neuron_states: Vec<NeuronState>,
    pub synapse_states: Vec<SynapseState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuronState {
    pub potential: f32,
    pub refractory_counter: u32,
    pub last_spike_t: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynapseState {
    pub pre: usize,
    pub post: usize,
    pub delay: usize,
    pub weight: f32,
    pub stdp_enabled: bool,
}
