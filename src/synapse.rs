use crate::params::SynapseParams;

/// Immutable part of a synapse. The weight lives in the backend's representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Synapse {
    pub pre: usize,
    pub post: usize,
    pub delay: usize,
    pub stdp_enabled: bool,
}

impl From<&SynapseParams> for Synapse {
    fn from(params: &SynapseParams) -> Self {
        Self {
            pre: params.pre,
            post: params.post,
            delay: params.delay,
            stdp_enabled: params.stdp_enabled,
        }
    }
}

/// Current in flight from a firing neuron to `post`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transmission {
    pub post: usize,
    pub current: f32,
}

pub fn max_delay(synapses: &[Synapse]) -> usize {
    synapses
        .iter()
        .map(|synapse| synapse.delay)
        .max()
        .unwrap_or(1)
}

/// Limits `weight` to `[min_weight, max_weight]`; an absent bound does not limit.
pub fn clamp_weight(weight: f32, min_weight: Option<f32>, max_weight: Option<f32>) -> f32 {
    let mut weight = weight;

    if let Some(max_weight) = max_weight {
        weight = weight.min(max_weight);
    }

    if let Some(min_weight) = min_weight {
        weight = weight.max(min_weight);
    }

    weight
}
