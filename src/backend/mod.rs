//! Numeric backends for the per-step primitives.
//!
//! A backend owns the weight representation. Everything else (potentials,
//! refractory counters, spike history, the delay buffer) lives in the
//! [`StateStore`](crate::state_store::StateStore) and is passed in.

mod accelerated;
mod dense;
mod partition;
mod sparse;

use std::sync::Arc;

use log::debug;

pub use accelerated::AcceleratedBackend;
pub use dense::DenseBackend;
pub use sparse::{SparseBackend, SparseMatrix};

use crate::{
    api::BackendKind,
    error::{Error, IndexKind, OverflowSite, Result},
    neuron::{self, NeuronVectors},
    params::NetworkParams,
    state_store::DelayBuffer,
    stdp::{PlasticityInput, StdpUpdater},
    synapse::{self, Synapse},
};

/// Networks with at least this many neurons go to the accelerated backend
/// when `Auto` is requested and more than one CPU is available.
pub const ACCELERATED_MIN_NEURONS: usize = 10_000;

/// `Auto` prefers the sparse backend below this synapse density.
pub const SPARSE_MAX_DENSITY: f64 = 0.1;

pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Enqueues one transmission per outgoing synapse of every spiking
    /// neuron, carrying the synapse's current weight, at the synapse's delay.
    /// Returns the number of enqueued transmissions.
    ///
    /// `spiking_nids` must be sorted ascending.
    fn propagate(&mut self, spiking_nids: &[usize], delay_buffer: &mut DelayBuffer)
        -> Result<usize>;

    fn apply_leak(
        &self,
        potentials: &mut [f32],
        neurons: &NeuronVectors,
        refractory_counters: &[u32],
    ) {
        neuron::apply_leak(potentials, neurons, refractory_counters);
    }

    fn threshold_compare(
        &self,
        potentials: &[f32],
        neurons: &NeuronVectors,
        refractory_counters: &[u32],
        spiking_mask: &mut [bool],
    ) {
        neuron::threshold_compare(potentials, neurons, refractory_counters, spiking_mask);
    }

    /// Updates every plastic synapse adjacent to a neuron that fired at
    /// `input.t`. Fails if an updated weight is not finite.
    fn apply_stdp(&mut self, input: &Arc<PlasticityInput>) -> Result<()>;

    /// All weights, in synapse order.
    fn weights(&mut self) -> Result<Vec<f32>>;

    /// Weight of a single synapse. `syn_idx` must be in range.
    fn weight(&mut self, syn_idx: usize) -> Result<f32>;

    fn set_weight(&mut self, syn_idx: usize, weight: f32) -> Result<()>;
}

pub enum AnyBackend {
    Dense(DenseBackend),
    Sparse(SparseBackend),
    Accelerated(AcceleratedBackend),
}

impl Backend for AnyBackend {
    fn kind(&self) -> BackendKind {
        match self {
            AnyBackend::Dense(backend) => backend.kind(),
            AnyBackend::Sparse(backend) => backend.kind(),
            AnyBackend::Accelerated(backend) => backend.kind(),
        }
    }

    fn propagate(
        &mut self,
        spiking_nids: &[usize],
        delay_buffer: &mut DelayBuffer,
    ) -> Result<usize> {
        match self {
            AnyBackend::Dense(backend) => backend.propagate(spiking_nids, delay_buffer),
            AnyBackend::Sparse(backend) => backend.propagate(spiking_nids, delay_buffer),
            AnyBackend::Accelerated(backend) => backend.propagate(spiking_nids, delay_buffer),
        }
    }

    fn apply_stdp(&mut self, input: &Arc<PlasticityInput>) -> Result<()> {
        match self {
            AnyBackend::Dense(backend) => backend.apply_stdp(input),
            AnyBackend::Sparse(backend) => backend.apply_stdp(input),
            AnyBackend::Accelerated(backend) => backend.apply_stdp(input),
        }
    }

    fn weights(&mut self) -> Result<Vec<f32>> {
        match self {
            AnyBackend::Dense(backend) => backend.weights(),
            AnyBackend::Sparse(backend) => backend.weights(),
            AnyBackend::Accelerated(backend) => backend.weights(),
        }
    }

    fn weight(&mut self, syn_idx: usize) -> Result<f32> {
        match self {
            AnyBackend::Dense(backend) => backend.weight(syn_idx),
            AnyBackend::Sparse(backend) => backend.weight(syn_idx),
            AnyBackend::Accelerated(backend) => backend.weight(syn_idx),
        }
    }

    fn set_weight(&mut self, syn_idx: usize, weight: f32) -> Result<()> {
        match self {
            AnyBackend::Dense(backend) => backend.set_weight(syn_idx, weight),
            AnyBackend::Sparse(backend) => backend.set_weight(syn_idx, weight),
            AnyBackend::Accelerated(backend) => backend.set_weight(syn_idx, weight),
        }
    }
}

pub fn resolve_backend_kind(params: &NetworkParams) -> BackendKind {
    match params.technical_params.backend {
        BackendKind::Auto => {
            let num_neurons = params.neurons.len();

            if num_neurons >= ACCELERATED_MIN_NEURONS && num_cpus::get() > 1 {
                return BackendKind::Accelerated;
            }

            let capacity = num_neurons.saturating_mul(num_neurons).max(1);
            let density = params.synapses.len() as f64 / capacity as f64;

            if density < SPARSE_MAX_DENSITY || capacity > dense::MAX_DENSE_ENTRIES {
                BackendKind::Sparse
            } else {
                BackendKind::Dense
            }
        }
        explicit => explicit,
    }
}

/// Builds the backend requested by `params`, with `Auto` resolved.
pub fn create_backend(
    params: &NetworkParams,
    synapses: &[Synapse],
) -> Result<AnyBackend> {
    let kind = resolve_backend_kind(params);
    let num_neurons = params.neurons.len();
    let weights: Vec<f32> = params.synapses.iter().map(|p| p.weight).collect();
    let stdp_updater = params.stdp_params.clone().map(StdpUpdater::new);

    debug!(
        "creating {:?} backend for {} neurons and {} synapses",
        kind,
        num_neurons,
        synapses.len()
    );

    let backend = match kind {
        BackendKind::Dense => AnyBackend::Dense(DenseBackend::new(
            num_neurons,
            synapses,
            &weights,
            stdp_updater,
        )?),
        BackendKind::Sparse => AnyBackend::Sparse(SparseBackend::new(
            num_neurons,
            synapses,
            &weights,
            stdp_updater,
        )),
        BackendKind::Accelerated => AnyBackend::Accelerated(AcceleratedBackend::new(
            num_neurons,
            synapses,
            &weights,
            stdp_updater,
            &params.technical_params,
        )?),
        BackendKind::Auto => {
            return Err(Error::BackendMismatch(
                "backend kind could not be resolved".to_string(),
            ))
        }
    };

    Ok(backend)
}

/// Weight of the plastic synapse `pre -> post` after this step's pairings,
/// clamped to the configured bounds, or `None` if the pairings cancel out or
/// do not apply.
pub(crate) fn plastic_weight(
    updater: &StdpUpdater,
    input: &PlasticityInput,
    pre: usize,
    post: usize,
    weight: f32,
) -> Option<f32> {
    let delta = updater.pairing_delta(input, pre, post, weight);

    if delta == 0.0 {
        None
    } else {
        Some(synapse::clamp_weight(
            weight + delta,
            updater.min_weight(),
            updater.max_weight(),
        ))
    }
}

/// Keeps the lowest synapse index with a non-finite weight.
pub(crate) fn track_non_finite(first: &mut Option<usize>, syn_idx: usize, weight: f32) {
    if !weight.is_finite() {
        *first = Some(first.map_or(syn_idx, |prev| prev.min(syn_idx)));
    }
}

pub(crate) fn unknown_synapse(syn_idx: usize, num_synapses: usize) -> Error {
    Error::OutOfRangeIndex {
        kind: IndexKind::Synapse,
        index: syn_idx,
        bound: num_synapses,
    }
}

pub(crate) fn weight_overflow(syn_idx: usize) -> Error {
    Error::NumericOverflow {
        what: OverflowSite::Weight,
        index: syn_idx,
    }
}
