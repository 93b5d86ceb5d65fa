use std::ops::Range;
use std::sync::Arc;

use itertools::Itertools;

use crate::{
    api::BackendKind,
    error::Result,
    state_store::DelayBuffer,
    stdp::{PlasticityInput, StdpUpdater},
    synapse::{Synapse, Transmission},
    types::HashMap,
};

use super::{plastic_weight, track_non_finite, unknown_synapse, weight_overflow, Backend};

/// Synapses onto the post-neurons in `post_range`, stored in compressed rows
/// by pre-neuron. Within a row, entries are sorted by post-neuron.
///
/// Each plastic entry is also listed under its post-neuron, so plasticity
/// can visit the incoming synapses of a firing neuron without a row scan.
pub struct SparseMatrix {
    post_range: Range<usize>,
    row_starts: Vec<usize>,
    posts: Vec<usize>,
    weights: Vec<f32>,
    delays: Vec<usize>,
    stdp_enabled: Vec<bool>,
    syn_indexes: Vec<usize>,
    plastic_entries_by_post: Vec<Vec<usize>>,
    syn_idx_to_entry: HashMap<usize, usize>,
    stdp_updater: Option<StdpUpdater>,
}

impl SparseMatrix {
    pub fn new(
        num_neurons: usize,
        synapses: &[Synapse],
        weights: &[f32],
        post_range: Range<usize>,
        stdp_updater: Option<StdpUpdater>,
    ) -> Self {
        let syn_indexes: Vec<usize> = synapses
            .iter()
            .enumerate()
            .filter(|(_, synapse)| post_range.contains(&synapse.post))
            .sorted_by_key(|(_, synapse)| (synapse.pre, synapse.post))
            .map(|(syn_idx, _)| syn_idx)
            .collect();

        let mut row_starts = vec![0; num_neurons + 1];
        for syn_idx in &syn_indexes {
            row_starts[synapses[*syn_idx].pre + 1] += 1;
        }
        for pre in 0..num_neurons {
            row_starts[pre + 1] += row_starts[pre];
        }

        let mut plastic_entries_by_post = vec![Vec::new(); post_range.len()];
        let mut syn_idx_to_entry = HashMap::default();

        for (entry, syn_idx) in syn_indexes.iter().enumerate() {
            let synapse = &synapses[*syn_idx];

            if synapse.stdp_enabled {
                plastic_entries_by_post[synapse.post - post_range.start].push(entry);
            }

            syn_idx_to_entry.insert(*syn_idx, entry);
        }

        Self {
            row_starts,
            posts: syn_indexes.iter().map(|i| synapses[*i].post).collect(),
            weights: syn_indexes.iter().map(|i| weights[*i]).collect(),
            delays: syn_indexes.iter().map(|i| synapses[*i].delay).collect(),
            stdp_enabled: syn_indexes.iter().map(|i| synapses[*i].stdp_enabled).collect(),
            post_range,
            syn_indexes,
            plastic_entries_by_post,
            syn_idx_to_entry,
            stdp_updater,
        }
    }

    pub fn post_range(&self) -> &Range<usize> {
        &self.post_range
    }

    pub fn num_entries(&self) -> usize {
        self.syn_indexes.len()
    }

    fn row(&self, pre: usize) -> Range<usize> {
        self.row_starts[pre]..self.row_starts[pre + 1]
    }

    /// Calls `emit(delay, transmission)` for every synapse leaving a spiking
    /// neuron, in order of pre- then post-neuron.
    pub fn propagate_into<F>(&self, spiking_nids: &[usize], mut emit: F) -> usize
    where
        F: FnMut(usize, Transmission),
    {
        let mut count = 0;

        for &pre in spiking_nids {
            for entry in self.row(pre) {
                emit(
                    self.delays[entry],
                    Transmission {
                        post: self.posts[entry],
                        current: self.weights[entry],
                    },
                );
            }

            count += self.row(pre).len();
        }

        count
    }

    /// Returns the lowest synapse index whose updated weight is not finite.
    pub fn apply_stdp(&mut self, input: &PlasticityInput) -> Option<usize> {
        let updater = self.stdp_updater.take()?;
        let mut first_non_finite = None;

        for &post in &input.spiking_nids {
            if !self.post_range.contains(&post) {
                continue;
            }

            for entry_idx in 0..self.plastic_entries_by_post[post - self.post_range.start].len() {
                let entry = self.plastic_entries_by_post[post - self.post_range.start][entry_idx];
                let pre = self.pre_of(entry);
                self.update_entry(&updater, input, pre, entry, &mut first_non_finite);
            }
        }

        for &pre in &input.spiking_nids {
            for entry in self.row(pre) {
                if self.stdp_enabled[entry] && !input.spiking_mask[self.posts[entry]] {
                    self.update_entry(&updater, input, pre, entry, &mut first_non_finite);
                }
            }
        }

        self.stdp_updater = Some(updater);
        first_non_finite
    }

    fn pre_of(&self, entry: usize) -> usize {
        // the last row starting at or before `entry`
        self.row_starts.partition_point(|row_start| *row_start <= entry) - 1
    }

    fn update_entry(
        &mut self,
        updater: &StdpUpdater,
        input: &PlasticityInput,
        pre: usize,
        entry: usize,
        first_non_finite: &mut Option<usize>,
    ) {
        if let Some(weight) =
            plastic_weight(updater, input, pre, self.posts[entry], self.weights[entry])
        {
            self.weights[entry] = weight;
            track_non_finite(first_non_finite, self.syn_indexes[entry], weight);
        }
    }

    /// Pairs of synapse index and weight for every entry.
    pub fn weights_by_syn_idx(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.syn_indexes
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
    }

    /// `None` if the synapse is not stored in this matrix.
    pub fn weight(&self, syn_idx: usize) -> Option<f32> {
        self.syn_idx_to_entry
            .get(&syn_idx)
            .map(|entry| self.weights[*entry])
    }

    /// Returns false if the synapse is not stored in this matrix.
    pub fn set_weight(&mut self, syn_idx: usize, weight: f32) -> bool {
        match self.syn_idx_to_entry.get(&syn_idx) {
            Some(entry) => {
                self.weights[*entry] = weight;
                true
            }
            None => false,
        }
    }
}

pub struct SparseBackend {
    matrix: SparseMatrix,
    num_synapses: usize,
}

impl SparseBackend {
    pub fn new(
        num_neurons: usize,
        synapses: &[Synapse],
        weights: &[f32],
        stdp_updater: Option<StdpUpdater>,
    ) -> Self {
        Self {
            matrix: SparseMatrix::new(num_neurons, synapses, weights, 0..num_neurons, stdp_updater),
            num_synapses: synapses.len(),
        }
    }
}

impl Backend for SparseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sparse
    }

    fn propagate(
        &mut self,
        spiking_nids: &[usize],
        delay_buffer: &mut DelayBuffer,
    ) -> Result<usize> {
        Ok(self
            .matrix
            .propagate_into(spiking_nids, |delay, transmission| {
                delay_buffer.push_at_offset(delay, transmission)
            }))
    }

    fn apply_stdp(&mut self, input: &Arc<PlasticityInput>) -> Result<()> {
        match self.matrix.apply_stdp(input) {
            Some(syn_idx) => Err(weight_overflow(syn_idx)),
            None => Ok(()),
        }
    }

    fn weights(&mut self) -> Result<Vec<f32>> {
        let mut weights = vec![0.0; self.num_synapses];

        for (syn_idx, weight) in self.matrix.weights_by_syn_idx() {
            weights[syn_idx] = weight;
        }

        Ok(weights)
    }

    fn weight(&mut self, syn_idx: usize) -> Result<f32> {
        self.matrix
            .weight(syn_idx)
            .ok_or_else(|| unknown_synapse(syn_idx, self.num_synapses))
    }

    fn set_weight(&mut self, syn_idx: usize, weight: f32) -> Result<()> {
        self.matrix.set_weight(syn_idx, weight);
        Ok(())
    }
}
