//! Matrix-based simulation of leaky integrate-and-fire networks with delayed,
//! plastic synapses.
//!
//! A [`Network`](network::Network) is built once from
//! [`NetworkParams`](params::NetworkParams) and then advanced one discrete
//! timestep per call to [`step`](network::Network::step). The dense, sparse
//! and accelerated backends produce identical spike trains and weights.

pub mod api;
pub mod error;
pub mod network;
pub mod params;
pub mod state_snapshot;

mod backend;
mod batched_ring_buffer;
mod engine;
mod neuron;
mod spike_history;
mod state_store;
mod stdp;
mod synapse;
mod types;
mod util;
