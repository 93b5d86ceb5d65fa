use std::collections::BTreeMap;
use std::sync::Arc;

use log::{trace, warn};
use simple_error::SimpleError;

use crate::{
    backend::Backend,
    error::{Error, OverflowSite, Result},
    network::{StepInput, StepResult},
    neuron,
    state_snapshot::{NeuronState, StateSnapshot, SynapseState},
    state_store::StateStore,
    stdp::PlasticityInput,
};

/// Drives one network through discrete timesteps.
///
/// Each call to [`step`](StepEngine::step) runs delivery, integration, the
/// firing decision, post-fire effects, refractory decay, plasticity and the
/// clock advance, in this order. Once a step fails with
/// [`Error::NumericOverflow`] the engine is halted and every later step
/// returns the same error.
pub struct StepEngine<B: Backend> {
    store: StateStore,
    backend: B,
    stdp_window: Option<usize>,
    t: usize,
    currents: Vec<f32>,
    spiking_mask: Vec<bool>,
    spiking_nids: Vec<usize>,
    plasticity_input: Arc<PlasticityInput>,
    scheduled_input: BTreeMap<usize, Vec<(usize, f32)>>,
    halted: Option<(OverflowSite, usize)>,
}

impl<B: Backend> StepEngine<B> {
    /// `stdp_window` is `None` when no synapse is plastic.
    pub fn new(store: StateStore, backend: B, stdp_window: Option<usize>) -> Self {
        let num_neurons = store.num_neurons();

        Self {
            store,
            backend,
            stdp_window,
            t: 0,
            currents: vec![0.0; num_neurons],
            spiking_mask: vec![false; num_neurons],
            spiking_nids: Vec::new(),
            plasticity_input: Arc::new(PlasticityInput::default()),
            scheduled_input: BTreeMap::new(),
            halted: None,
        }
    }

    pub fn clock(&self) -> usize {
        self.t
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn step(&mut self, input: &StepInput) -> Result<StepResult> {
        if let Some((what, index)) = self.halted {
            return Err(Error::NumericOverflow { what, index });
        }

        self.validate_input(input)?;

        let t = self.t;

        // delivery
        self.currents.iter_mut().for_each(|current| *current = 0.0);
        let synaptic_transmission_count = self.store.deliver_due(&mut self.currents);

        for (nid, value) in &input.input_currents {
            self.currents[*nid] += value;
        }

        if let Some(scheduled) = self.scheduled_input.remove(&t) {
            for (nid, value) in scheduled {
                self.currents[nid] += value;
            }
        }

        // integration
        self.backend.apply_leak(
            &mut self.store.potentials,
            &self.store.neurons,
            &self.store.refractory_counters,
        );
        neuron::integrate(
            &mut self.store.potentials,
            &self.currents,
            &self.store.refractory_counters,
        );

        if let Some(nid) = neuron::find_non_finite(&self.store.potentials) {
            return Err(self.halt(OverflowSite::Potential, nid));
        }

        // firing decision
        self.backend.threshold_compare(
            &self.store.potentials,
            &self.store.neurons,
            &self.store.refractory_counters,
            &mut self.spiking_mask,
        );

        for nid in &input.force_spiking_nids {
            self.spiking_mask[*nid] = true;
        }

        self.spiking_nids.clear();
        self.spiking_nids.extend(
            self.spiking_mask
                .iter()
                .enumerate()
                .filter(|(_, is_spiking)| **is_spiking)
                .map(|(nid, _)| nid),
        );

        // post-fire effects
        for nid in &self.spiking_nids {
            self.store.fire(t, *nid);
        }

        if !self.spiking_nids.is_empty() {
            self.backend
                .propagate(&self.spiking_nids, &mut self.store.delay_buffer)?;
        }

        // refractory decay
        neuron::decay_refractory(&mut self.store.refractory_counters, &self.spiking_mask);

        // plasticity
        if let Some(window) = self.stdp_window {
            if !self.spiking_nids.is_empty() {
                self.update_plasticity_input(t, window);

                match self.backend.apply_stdp(&self.plasticity_input) {
                    Err(Error::NumericOverflow { what, index }) => {
                        return Err(self.halt(what, index))
                    }
                    other => other?,
                }
            }
        }

        trace!(
            "t = {}: {} spikes, {} transmissions delivered, {} in flight",
            t,
            self.spiking_nids.len(),
            synaptic_transmission_count,
            self.store.delay_buffer.pending_count()
        );

        let state_snapshot = if input.extract_state_snapshot {
            Some(self.snapshot(Some(t))?)
        } else {
            None
        };

        // clock advance
        self.store.advance();
        self.t += 1;

        Ok(StepResult {
            t,
            spiking_nids: self.spiking_nids.clone(),
            synaptic_transmission_count,
            state_snapshot,
        })
    }

    fn update_plasticity_input(&mut self, t: usize, window: usize) {
        let plasticity_input = Arc::make_mut(&mut self.plasticity_input);
        plasticity_input.t = t;
        plasticity_input.spiking_nids.clone_from(&self.spiking_nids);
        plasticity_input.spiking_mask.clone_from(&self.spiking_mask);
        self.store.spike_history.fill_prior_spike_times(
            t,
            window,
            &mut plasticity_input.prior_spike_t,
        );
    }

    fn halt(&mut self, what: OverflowSite, index: usize) -> Error {
        let err = Error::NumericOverflow { what, index };
        warn!("halting simulation at t = {}: {}", self.t, err);
        self.halted = Some((what, index));
        err
    }

    fn validate_input(&self, input: &StepInput) -> Result<()> {
        for nid in &input.force_spiking_nids {
            self.store.check_nid(*nid)?;
        }

        for (nid, value) in &input.input_currents {
            self.store.check_nid(*nid)?;
            check_finite_input(*value)?;
        }

        Ok(())
    }

    /// Queues `value` to be added to the input of neuron `nid` in step `t`.
    pub fn add_input(&mut self, t: usize, nid: usize, value: f32) -> Result<()> {
        if t < self.t {
            return Err(SimpleError::new(format!(
                "cannot schedule input at t = {} before the current clock {}",
                t, self.t
            ))
            .into());
        }

        self.store.check_nid(nid)?;
        check_finite_input(value)?;

        self.scheduled_input
            .entry(t)
            .or_insert_with(Vec::new)
            .push((nid, value));

        Ok(())
    }

    pub fn weights(&mut self) -> Result<Vec<f32>> {
        self.backend.weights()
    }

    pub fn weight(&mut self, syn_idx: usize) -> Result<f32> {
        self.store.check_syn_idx(syn_idx)?;
        self.backend.weight(syn_idx)
    }

    pub fn set_weight(&mut self, syn_idx: usize, weight: f32) -> Result<()> {
        self.store.check_syn_idx(syn_idx)?;

        if !weight.is_finite() {
            return Err(SimpleError::new("weight must be finite").into());
        }

        self.backend.set_weight(syn_idx, weight)
    }

    /// Potentials back to their initial values, refractory counters cleared,
    /// nothing in flight. Weights, spike trains and the clock are kept.
    pub fn reset_ephemeral_state(&mut self) {
        self.store.reset_ephemeral_state();
        self.scheduled_input.clear();
    }

    /// Snapshot of the state left by the last completed step.
    pub fn state_snapshot(&mut self) -> Result<StateSnapshot> {
        self.snapshot(self.t.checked_sub(1))
    }

    fn snapshot(&mut self, t: Option<usize>) -> Result<StateSnapshot> {
        let weights = self.backend.weights()?;
        let history = self.store.spike_history();

        let neuron_states = self
            .store
            .potentials()
            .iter()
            .zip(self.store.refractory_counters())
            .enumerate()
            .map(|(nid, (potential, refractory_counter))| NeuronState {
                potential: *potential,
                refractory_counter: *refractory_counter,
                last_spike_t: history.spike_train(nid).last().copied(),
            })
            .collect();

        let synapse_states = self
            .store
            .synapses()
            .iter()
            .zip(weights)
            .map(|(synapse, weight)| SynapseState {
                pre: synapse.pre,
                post: synapse.post,
                delay: synapse.delay,
                weight,
                stdp_enabled: synapse.stdp_enabled,
            })
            .collect();

        Ok(StateSnapshot {
            t,
            neuron_states,
            synapse_states,
        })
    }
}

fn check_finite_input(value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimpleError::new("input current must be finite").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DenseBackend;
    use crate::params::{NetworkParams, NeuronParams, StdpParams, SynapseParams};
    use crate::stdp::StdpUpdater;
    use crate::synapse::Synapse;
    use float_cmp::assert_approx_eq;

    fn create_engine(params: &NetworkParams) -> StepEngine<DenseBackend> {
        let store = StateStore::new(params).unwrap();
        let synapses: Vec<Synapse> = params.synapses.iter().map(Synapse::from).collect();
        let weights: Vec<f32> = params.synapses.iter().map(|p| p.weight).collect();
        let stdp_updater = params.stdp_params.clone().map(StdpUpdater::new);
        let stdp_window = params.stdp_params.as_ref().map(|p| p.window);
        let backend =
            DenseBackend::new(params.neurons.len(), &synapses, &weights, stdp_updater).unwrap();

        StepEngine::new(store, backend, stdp_window)
    }

    fn chain_params() -> NetworkParams {
        NetworkParams {
            neurons: vec![NeuronParams::default(); 2],
            synapses: vec![SynapseParams::new(0, 1, 1.5, 2)],
            ..Default::default()
        }
    }

    #[test]
    fn clock_advances_once_per_step() {
        let mut sut = create_engine(&chain_params());

        for expected_t in 0..5 {
            let result = sut.step(&StepInput::new()).unwrap();
            assert_eq!(result.t, expected_t);
        }

        assert_eq!(sut.clock(), 5);
    }

    #[test]
    fn delayed_delivery() {
        let mut sut = create_engine(&chain_params());

        let result = sut.step(&StepInput::from_force_spiking_nids(&[0])).unwrap();
        assert_eq!(result.spiking_nids, vec![0]);

        let result = sut.step(&StepInput::new()).unwrap();
        assert!(result.spiking_nids.is_empty());
        assert_eq!(result.synaptic_transmission_count, 0);

        let result = sut.step(&StepInput::new()).unwrap();
        assert_eq!(result.synaptic_transmission_count, 1);
        assert_eq!(result.spiking_nids, vec![1]);
    }

    #[test]
    fn scheduled_input() {
        let mut sut = create_engine(&chain_params());
        sut.add_input(2, 0, 1.0).unwrap();

        assert!(sut.step(&StepInput::new()).unwrap().spiking_nids.is_empty());
        assert!(sut.step(&StepInput::new()).unwrap().spiking_nids.is_empty());
        assert_eq!(sut.step(&StepInput::new()).unwrap().spiking_nids, vec![0]);

        assert!(matches!(
            sut.add_input(1, 0, 1.0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn invalid_input_leaves_state_untouched() {
        let mut sut = create_engine(&chain_params());

        let mut input = StepInput::new();
        input.input_currents.push((0, 0.5));
        input.force_spiking_nids.push(2);

        assert!(matches!(
            sut.step(&input),
            Err(Error::OutOfRangeIndex { index: 2, .. })
        ));
        assert_eq!(sut.clock(), 0);
        assert_approx_eq!(f32, sut.store().potentials()[0], 0.0);

        let input = StepInput::from_input_currents(&[(1, f32::NAN)]);
        assert!(matches!(sut.step(&input), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn potential_overflow_halts() {
        let mut params = chain_params();
        params.neurons[1].threshold = f32::MAX;
        params.neurons[1].leak = 0.0;
        params.synapses[0].weight = 0.75 * f32::MAX;
        let mut sut = create_engine(&params);

        sut.step(&StepInput::from_force_spiking_nids(&[0])).unwrap();
        sut.step(&StepInput::from_force_spiking_nids(&[0])).unwrap();
        sut.step(&StepInput::new()).unwrap();

        // the second delivery pushes neuron 1 past f32::MAX
        let err = sut.step(&StepInput::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::NumericOverflow {
                what: OverflowSite::Potential,
                index: 1
            }
        ));

        assert!(sut.is_halted());
        assert!(matches!(
            sut.step(&StepInput::new()),
            Err(Error::NumericOverflow { index: 1, .. })
        ));
    }

    #[test]
    fn plasticity_after_post_spike() {
        let mut params = chain_params();
        params.synapses[0] = SynapseParams::plastic(0, 1, 0.5, 1);
        params.stdp_params = Some(StdpParams::default());
        let mut sut = create_engine(&params);

        sut.step(&StepInput::from_force_spiking_nids(&[0])).unwrap();
        sut.step(&StepInput::from_force_spiking_nids(&[1])).unwrap();

        let weights = sut.weights().unwrap();
        assert_approx_eq!(f32, weights[0], 0.5 + 0.1 * (-1.0 / 20.0f32).exp());
    }

    #[test]
    fn snapshot_at_end_of_step() {
        let mut sut = create_engine(&chain_params());
        assert_eq!(sut.state_snapshot().unwrap().t, None);

        let mut input = StepInput::from_force_spiking_nids(&[0]);
        input.extract_state_snapshot = true;
        let snapshot = sut.step(&input).unwrap().state_snapshot.unwrap();

        assert_eq!(snapshot.t, Some(0));
        assert_eq!(snapshot.neuron_states[0].last_spike_t, Some(0));
        assert_eq!(snapshot.neuron_states[1].last_spike_t, None);
        assert_eq!(snapshot.synapse_states[0].delay, 2);
        assert_approx_eq!(f32, snapshot.synapse_states[0].weight, 1.5);

        let direct_snapshot = sut.state_snapshot().unwrap();
        assert_eq!(direct_snapshot.t, Some(0));
        assert_eq!(direct_snapshot.neuron_states[0].last_spike_t, Some(0));
    }

    #[test]
    fn set_weight_validation() {
        let mut sut = create_engine(&chain_params());

        assert!(matches!(
            sut.set_weight(1, 0.5),
            Err(Error::OutOfRangeIndex { .. })
        ));
        assert!(matches!(
            sut.set_weight(0, f32::INFINITY),
            Err(Error::InvalidParameter(_))
        ));

        sut.set_weight(0, 0.25).unwrap();
        assert_approx_eq!(f32, sut.weights().unwrap()[0], 0.25);
        assert_approx_eq!(f32, sut.weight(0).unwrap(), 0.25);
        assert!(matches!(
            sut.weight(1),
            Err(Error::OutOfRangeIndex { .. })
        ));
    }
}
