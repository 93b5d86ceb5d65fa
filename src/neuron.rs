//! Elementwise LIF kernels over neuron state vectors.

use crate::params::NeuronParams;

/// Immutable per-neuron parameters, one entry per neuron.
#[derive(Debug, Clone, Default)]
pub struct NeuronVectors {
    pub thresholds: Vec<f32>,
    pub leaks: Vec<f32>,
    pub reset_states: Vec<f32>,
    pub refractory_periods: Vec<u32>,
}

impl NeuronVectors {
    pub fn from_params(neuron_params: &[NeuronParams]) -> Self {
        Self {
            thresholds: neuron_params.iter().map(|p| p.threshold).collect(),
            leaks: neuron_params.iter().map(|p| p.leak).collect(),
            reset_states: neuron_params.iter().map(|p| p.reset_state).collect(),
            refractory_periods: neuron_params.iter().map(|p| p.refractory_period).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }
}

/// Moves the potential of every non-refractory neuron toward its reset state
/// by the fraction `leak`.
pub fn apply_leak(potentials: &mut [f32], neurons: &NeuronVectors, refractory_counters: &[u32]) {
    for (nid, potential) in potentials.iter_mut().enumerate() {
        if refractory_counters[nid] == 0 {
            let reset_state = neurons.reset_states[nid];
            *potential = reset_state + (*potential - reset_state) * (1.0 - neurons.leaks[nid]);
        }
    }
}

/// Adds input current to non-refractory neurons; refractory neurons hold their potential.
pub fn integrate(potentials: &mut [f32], currents: &[f32], refractory_counters: &[u32]) {
    for (nid, potential) in potentials.iter_mut().enumerate() {
        if refractory_counters[nid] == 0 {
            *potential += currents[nid];
        }
    }
}

pub fn threshold_compare(
    potentials: &[f32],
    neurons: &NeuronVectors,
    refractory_counters: &[u32],
    spiking_mask: &mut [bool],
) {
    for (nid, is_spiking) in spiking_mask.iter_mut().enumerate() {
        *is_spiking = refractory_counters[nid] == 0 && potentials[nid] >= neurons.thresholds[nid];
    }
}

/// Index of the first non-finite potential.
pub fn find_non_finite(potentials: &[f32]) -> Option<usize> {
    potentials.iter().position(|potential| !potential.is_finite())
}

/// Counts down refractory periods of neurons that did not fire in this step.
pub fn decay_refractory(refractory_counters: &mut [u32], spiking_mask: &[bool]) {
    for (counter, is_spiking) in refractory_counters.iter_mut().zip(spiking_mask) {
        if !is_spiking && *counter > 0 {
            *counter -= 1;
        }
    }
}
