use log::debug;
use simple_error::SimpleError;

use crate::{
    api::BackendKind,
    backend::{self, AnyBackend, Backend},
    engine::StepEngine,
    error::Result,
    params::{self, NetworkParams},
    state_snapshot::StateSnapshot,
    state_store::StateStore,
};

/// Validates `params` and builds the state store and the selected backend.
/// Nothing is retained if any part of the construction fails.
pub fn create_network(params: NetworkParams) -> Result<Network> {
    params::validate_network_params(&params)?;

    let store = StateStore::new(&params)?;
    let backend = backend::create_backend(&params, store.synapses())?;

    let any_plastic = store.synapses().iter().any(|synapse| synapse.stdp_enabled);
    let stdp_window = params
        .stdp_params
        .as_ref()
        .filter(|_| any_plastic)
        .map(|stdp_params| stdp_params.window);

    debug!(
        "created network: {} neurons, {} synapses, backend {:?}, max delay {}, stdp window {:?}",
        store.num_neurons(),
        store.num_synapses(),
        backend.kind(),
        store.delay_buffer.max_offset(),
        stdp_window
    );

    Ok(Network {
        engine: StepEngine::new(store, backend, stdp_window),
    })
}

#[derive(Debug, Clone)]
pub struct StepInput {
    /// Extra current per neuron, added like delivered synaptic current.
    pub input_currents: Vec<(usize, f32)>,
    /// Neurons that fire in this step regardless of potential and refractory state.
    pub force_spiking_nids: Vec<usize>,
    pub extract_state_snapshot: bool,
}

impl StepInput {
    pub fn new() -> Self {
        EMPTY_STEP_INPUT.clone()
    }

    pub fn from_force_spiking_nids(force_spiking_nids: &[usize]) -> Self {
        let mut result = EMPTY_STEP_INPUT.clone();
        result
            .force_spiking_nids
            .extend_from_slice(force_spiking_nids);
        result
    }

    pub fn from_input_currents(input_currents: &[(usize, f32)]) -> Self {
        let mut result = EMPTY_STEP_INPUT.clone();
        result.input_currents.extend_from_slice(input_currents);
        result
    }

    pub fn reset(&mut self) {
        self.input_currents.clear();
        self.force_spiking_nids.clear();
        self.extract_state_snapshot = false;
    }
}

impl Default for StepInput {
    fn default() -> Self {
        Self::new()
    }
}

static EMPTY_STEP_INPUT: StepInput = StepInput {
    input_currents: Vec::new(),
    force_spiking_nids: Vec::new(),
    extract_state_snapshot: false,
};

#[derive(Debug)]
pub struct StepResult {
    pub t: usize,
    /// Ascending.
    pub spiking_nids: Vec<usize>,
    /// Transmissions delivered in this step.
    pub synaptic_transmission_count: usize,
    pub state_snapshot: Option<StateSnapshot>,
}

pub struct Network {
    engine: StepEngine<AnyBackend>,
}

impl Network {
    pub fn step(&mut self, input: &StepInput) -> Result<StepResult> {
        self.engine.step(input)
    }

    pub fn step_no_input(&mut self) -> Result<StepResult> {
        self.engine.step(&EMPTY_STEP_INPUT)
    }

    pub fn step_n(&mut self, n: usize) -> Result<Vec<StepResult>> {
        (0..n).map(|_| self.step_no_input()).collect()
    }

    /// Steps without input until the clock reaches `t`.
    pub fn step_until(&mut self, t: usize) -> Result<()> {
        while self.clock() < t {
            self.step_no_input()?;
        }

        Ok(())
    }

    pub fn clock(&self) -> usize {
        self.engine.clock()
    }

    pub fn num_neurons(&self) -> usize {
        self.engine.store().num_neurons()
    }

    pub fn num_synapses(&self) -> usize {
        self.engine.store().num_synapses()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.engine.backend().kind()
    }

    pub fn is_halted(&self) -> bool {
        self.engine.is_halted()
    }

    pub fn potentials(&self) -> &[f32] {
        self.engine.store().potentials()
    }

    pub fn refractory_counters(&self) -> &[u32] {
        self.engine.store().refractory_counters()
    }

    /// Current weights in the order the synapses were supplied.
    pub fn weights(&mut self) -> Result<Vec<f32>> {
        self.engine.weights()
    }

    /// Weight of the synapse `pre -> post`, `None` if there is no such synapse.
    pub fn weight(&mut self, pre: usize, post: usize) -> Result<Option<f32>> {
        self.engine.store().check_nid(pre)?;
        self.engine.store().check_nid(post)?;

        match self.engine.store().syn_idx(pre, post) {
            Some(syn_idx) => self.engine.weight(syn_idx).map(Some),
            None => Ok(None),
        }
    }

    pub fn set_weight(&mut self, pre: usize, post: usize, weight: f32) -> Result<()> {
        self.engine.store().check_nid(pre)?;
        self.engine.store().check_nid(post)?;

        let syn_idx = self.engine.store().syn_idx(pre, post).ok_or_else(|| {
            SimpleError::new(format!("no synapse from neuron {} to neuron {}", pre, post))
        })?;

        self.engine.set_weight(syn_idx, weight)
    }

    pub fn spike_train(&self, nid: usize) -> Result<&[usize]> {
        self.engine.store().check_nid(nid)?;
        Ok(self.engine.store().spike_history().spike_train(nid))
    }

    pub fn spike_trains(&self) -> &[Vec<usize>] {
        self.engine.store().spike_history().spike_trains()
    }

    pub fn spike_counts(&self) -> Vec<usize> {
        self.engine.store().spike_history().spike_counts()
    }

    /// Queues an input current for neuron `nid` at step `t`; `t` must not be
    /// earlier than the clock.
    pub fn add_input(&mut self, t: usize, nid: usize, value: f32) -> Result<()> {
        self.engine.add_input(t, nid, value)
    }

    pub fn reset_ephemeral_state(&mut self) {
        self.engine.reset_ephemeral_state();
    }

    pub fn state_snapshot(&mut self) -> Result<StateSnapshot> {
        self.engine.state_snapshot()
    }
}
