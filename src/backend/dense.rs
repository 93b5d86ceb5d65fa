use std::sync::Arc;

use crate::{
    api::BackendKind,
    error::{Error, Result},
    state_store::DelayBuffer,
    stdp::{PlasticityInput, StdpUpdater},
    synapse::{Synapse, Transmission},
};

use super::{plastic_weight, track_non_finite, unknown_synapse, weight_overflow, Backend};

/// Largest `N * N` the dense backend accepts.
pub const MAX_DENSE_ENTRIES: usize = 1 << 26;

/// Row-major `N x N` arrays, row = pre, column = post. A delay of 0 marks an
/// absent synapse.
pub struct DenseBackend {
    num_neurons: usize,
    weights: Vec<f32>,
    delays: Vec<u32>,
    stdp_enabled: Vec<bool>,
    syn_idx_at: Vec<usize>,
    flat_idx_of_syn: Vec<usize>,
    stdp_updater: Option<StdpUpdater>,
}

impl DenseBackend {
    pub fn new(
        num_neurons: usize,
        synapses: &[Synapse],
        weights: &[f32],
        stdp_updater: Option<StdpUpdater>,
    ) -> Result<Self> {
        let num_entries = num_neurons
            .checked_mul(num_neurons)
            .filter(|num_entries| *num_entries <= MAX_DENSE_ENTRIES)
            .ok_or_else(|| {
                Error::BackendMismatch(format!(
                    "dense backend cannot hold {} neurons (at most {} matrix entries)",
                    num_neurons, MAX_DENSE_ENTRIES
                ))
            })?;

        let mut result = Self {
            num_neurons,
            weights: vec![0.0; num_entries],
            delays: vec![0; num_entries],
            stdp_enabled: vec![false; num_entries],
            syn_idx_at: vec![usize::MAX; num_entries],
            flat_idx_of_syn: Vec::with_capacity(synapses.len()),
            stdp_updater,
        };

        for (syn_idx, synapse) in synapses.iter().enumerate() {
            let flat_idx = result.flat_idx(synapse.pre, synapse.post);
            result.weights[flat_idx] = weights[syn_idx];
            result.delays[flat_idx] = synapse.delay as u32;
            result.stdp_enabled[flat_idx] = synapse.stdp_enabled;
            result.syn_idx_at[flat_idx] = syn_idx;
            result.flat_idx_of_syn.push(flat_idx);
        }

        Ok(result)
    }

    fn flat_idx(&self, pre: usize, post: usize) -> usize {
        pre * self.num_neurons + post
    }

    fn is_plastic(&self, flat_idx: usize) -> bool {
        self.delays[flat_idx] != 0 && self.stdp_enabled[flat_idx]
    }

    fn update_weight(
        &mut self,
        updater: &StdpUpdater,
        input: &PlasticityInput,
        pre: usize,
        post: usize,
        first_non_finite: &mut Option<usize>,
    ) {
        let flat_idx = self.flat_idx(pre, post);

        if !self.is_plastic(flat_idx) {
            return;
        }

        if let Some(weight) = plastic_weight(updater, input, pre, post, self.weights[flat_idx]) {
            self.weights[flat_idx] = weight;
            track_non_finite(first_non_finite, self.syn_idx_at[flat_idx], weight);
        }
    }
}

impl Backend for DenseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dense
    }

    fn propagate(
        &mut self,
        spiking_nids: &[usize],
        delay_buffer: &mut DelayBuffer,
    ) -> Result<usize> {
        let mut count = 0;

        for &pre in spiking_nids {
            let row_start = self.flat_idx(pre, 0);

            for post in 0..self.num_neurons {
                let delay = self.delays[row_start + post];

                if delay != 0 {
                    delay_buffer.push_at_offset(
                        delay as usize,
                        Transmission {
                            post,
                            current: self.weights[row_start + post],
                        },
                    );
                    count += 1;
                }
            }
        }

        Ok(count)
    }

    fn apply_stdp(&mut self, input: &Arc<PlasticityInput>) -> Result<()> {
        let updater = match self.stdp_updater.take() {
            Some(updater) => updater,
            None => return Ok(()),
        };

        let mut first_non_finite = None;

        // columns of firing posts, then rows of firing pres whose post did not fire
        for &post in &input.spiking_nids {
            for pre in 0..self.num_neurons {
                self.update_weight(&updater, input, pre, post, &mut first_non_finite);
            }
        }

        for &pre in &input.spiking_nids {
            for post in 0..self.num_neurons {
                if !input.spiking_mask[post] {
                    self.update_weight(&updater, input, pre, post, &mut first_non_finite);
                }
            }
        }

        self.stdp_updater = Some(updater);

        match first_non_finite {
            Some(syn_idx) => Err(weight_overflow(syn_idx)),
            None => Ok(()),
        }
    }

    fn weights(&mut self) -> Result<Vec<f32>> {
        Ok(self
            .flat_idx_of_syn
            .iter()
            .map(|flat_idx| self.weights[*flat_idx])
            .collect())
    }

    fn weight(&mut self, syn_idx: usize) -> Result<f32> {
        self.flat_idx_of_syn
            .get(syn_idx)
            .map(|flat_idx| self.weights[*flat_idx])
            .ok_or_else(|| unknown_synapse(syn_idx, self.flat_idx_of_syn.len()))
    }

    fn set_weight(&mut self, syn_idx: usize, weight: f32) -> Result<()> {
        let flat_idx = self.flat_idx_of_syn[syn_idx];
        self.weights[flat_idx] = weight;
        Ok(())
    }
}
