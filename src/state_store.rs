use crate::{
    batched_ring_buffer::BatchedRingBuffer,
    error::{Error, IndexKind, Result},
    neuron::NeuronVectors,
    params::{NetworkParams, MAX_DELAY},
    spike_history::SpikeHistory,
    synapse::{self, Synapse, Transmission},
    types::HashMap,
};

pub type DelayBuffer = BatchedRingBuffer<Transmission>;

/// Owner of all mutable per-neuron state, the synapse topology and the
/// in-flight transmissions.
pub struct StateStore {
    pub(crate) neurons: NeuronVectors,
    initial_potentials: Vec<f32>,
    pub(crate) potentials: Vec<f32>,
    pub(crate) refractory_counters: Vec<u32>,
    synapses: Vec<Synapse>,
    pair_to_syn_idx: HashMap<(usize, usize), usize>,
    pub(crate) delay_buffer: DelayBuffer,
    pub(crate) spike_history: SpikeHistory,
}

impl StateStore {
    pub fn new(params: &NetworkParams) -> Result<Self> {
        let num_neurons = params.neurons.len();
        let mut synapses = Vec::with_capacity(params.synapses.len());
        let mut pair_to_syn_idx = HashMap::default();

        for (syn_idx, synapse_params) in params.synapses.iter().enumerate() {
            for nid in [synapse_params.pre, synapse_params.post] {
                if nid >= num_neurons {
                    return Err(Error::neuron_out_of_range(nid, num_neurons));
                }
            }

            if synapse_params.delay == 0 || synapse_params.delay > MAX_DELAY {
                return Err(Error::InvalidDelay {
                    synapse: syn_idx,
                    delay: synapse_params.delay,
                });
            }

            pair_to_syn_idx.insert((synapse_params.pre, synapse_params.post), syn_idx);
            synapses.push(Synapse::from(synapse_params));
        }

        let initial_potentials: Vec<f32> = params
            .neurons
            .iter()
            .map(|p| p.initial_potential.unwrap_or(p.reset_state))
            .collect();

        let refractory_counters = params
            .neurons
            .iter()
            .map(|p| p.initial_refractory)
            .collect();

        Ok(Self {
            neurons: NeuronVectors::from_params(&params.neurons),
            potentials: initial_potentials.clone(),
            initial_potentials,
            refractory_counters,
            delay_buffer: DelayBuffer::with_max_offset(synapse::max_delay(&synapses)),
            synapses,
            pair_to_syn_idx,
            spike_history: SpikeHistory::new(num_neurons),
        })
    }

    pub fn num_neurons(&self) -> usize {
        self.neurons.len()
    }

    pub fn num_synapses(&self) -> usize {
        self.synapses.len()
    }

    pub fn potentials(&self) -> &[f32] {
        &self.potentials
    }

    pub fn refractory_counters(&self) -> &[u32] {
        &self.refractory_counters
    }

    pub fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }

    pub fn spike_history(&self) -> &SpikeHistory {
        &self.spike_history
    }

    pub fn check_nid(&self, nid: usize) -> Result<()> {
        if nid < self.num_neurons() {
            Ok(())
        } else {
            Err(Error::neuron_out_of_range(nid, self.num_neurons()))
        }
    }

    pub fn check_syn_idx(&self, syn_idx: usize) -> Result<()> {
        if syn_idx < self.num_synapses() {
            Ok(())
        } else {
            Err(Error::OutOfRangeIndex {
                kind: IndexKind::Synapse,
                index: syn_idx,
                bound: self.num_synapses(),
            })
        }
    }

    pub fn syn_idx(&self, pre: usize, post: usize) -> Option<usize> {
        self.pair_to_syn_idx.get(&(pre, post)).copied()
    }

    /// Adds every transmission due in the current step to `currents` and
    /// returns how many there were.
    pub fn deliver_due(&mut self, currents: &mut [f32]) -> usize {
        let count = self.delay_buffer.due_batch_size();

        for transmission in self.delay_buffer.drain_due() {
            currents[transmission.post] += transmission.current;
        }

        count
    }

    /// Resets potential, enters the refractory period and records the spike.
    pub fn fire(&mut self, t: usize, nid: usize) {
        self.potentials[nid] = self.neurons.reset_states[nid];
        self.refractory_counters[nid] = self.neurons.refractory_periods[nid];
        self.spike_history.record(t, nid);
    }

    pub fn advance(&mut self) {
        self.delay_buffer.advance();
    }

    /// Potentials back to their initial values, refractory counters cleared
    /// (`initial_refractory` only applies at construction), delay buffer emptied
    /// and the plasticity lookback forgotten.
    pub fn reset_ephemeral_state(&mut self) {
        self.potentials.copy_from_slice(&self.initial_potentials);
        self.refractory_counters.iter_mut().for_each(|c| *c = 0);
        self.delay_buffer.clear();
        self.spike_history.forget_recent();
    }
}
