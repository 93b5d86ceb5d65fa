use std::sync::mpsc::channel as mpsc_channel;
use std::sync::mpsc::Receiver as MpscReceiver;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use bus::Bus;
use core_affinity::CoreId;
use itertools::Itertools;
use log::debug;

use crate::{
    api::BackendKind,
    error::{Error, Result},
    params::TechnicalParams,
    state_store::DelayBuffer,
    stdp::{PlasticityInput, StdpUpdater},
    synapse::{Synapse, Transmission},
    util,
};

use super::{
    partition::{Partition, PartitionResult, Request},
    unknown_synapse, weight_overflow, Backend, SparseMatrix,
};

/// Synapse matrix split by post-neuron range over a pool of worker threads.
///
/// Every request is broadcast to all workers and the caller blocks until each
/// of them has answered, so no two steps ever overlap. Partial results are
/// merged in order of `nid_start`, which keeps the summation order per
/// neuron identical to the sequential backends.
pub struct AcceleratedBackend {
    num_synapses: usize,
    broadcast_tx: Option<Bus<Request>>,
    partition_result_rx: MpscReceiver<PartitionResult>,
    num_partitions: usize,
    join_handles: Vec<JoinHandle<()>>,
}

impl AcceleratedBackend {
    pub fn new(
        num_neurons: usize,
        synapses: &[Synapse],
        weights: &[f32],
        stdp_updater: Option<StdpUpdater>,
        technical_params: &TechnicalParams,
    ) -> Result<Self> {
        let num_threads = get_num_threads(technical_params);

        if num_threads == 0 {
            return Err(Error::BackendMismatch(
                "accelerated backend needs at least one thread".to_string(),
            ));
        }

        if num_threads > num_cpus::get() {
            return Err(Error::BackendMismatch(format!(
                "accelerated backend cannot run {} threads on {} CPUs",
                num_threads,
                num_cpus::get()
            )));
        }

        let num_partitions = num_threads.min(num_neurons.max(1));

        let mut broadcast_tx = Bus::new(1);
        let (partition_result_tx, partition_result_rx) = mpsc_channel();
        let mut join_handles = Vec::new();

        for thread_id in 0..num_partitions {
            let post_range = util::get_partition_range(num_partitions, thread_id, num_neurons);
            let matrix = SparseMatrix::new(
                num_neurons,
                synapses,
                weights,
                post_range,
                stdp_updater.clone(),
            );

            let broadcast_rx = broadcast_tx.add_rx();
            let partition_result_tx = partition_result_tx.clone();
            let pin_threads = technical_params.pin_threads;

            join_handles.push(thread::spawn(move || {
                if pin_threads {
                    let core_id = CoreId { id: thread_id };
                    core_affinity::set_for_current(core_id);
                }

                let mut partition = Partition::new(matrix);
                debug!(
                    "worker {} started for neurons from {} ({} synapses)",
                    thread_id,
                    partition.nid_start(),
                    partition.num_entries()
                );

                partition.run(broadcast_rx, partition_result_tx);
                debug!("worker {} stopped", thread_id);
            }));
        }

        Ok(Self {
            num_synapses: synapses.len(),
            broadcast_tx: Some(broadcast_tx),
            partition_result_rx,
            num_partitions,
            join_handles,
        })
    }

    fn broadcast(&mut self, request: Request) -> Result<()> {
        match self.broadcast_tx.as_mut() {
            Some(broadcast_tx) => {
                broadcast_tx.broadcast(request);
                Ok(())
            }
            None => Err(worker_failure()),
        }
    }

    fn collect_results(&mut self) -> Result<Vec<PartitionResult>> {
        (0..self.num_partitions)
            .map(|_| self.partition_result_rx.recv().map_err(|_| worker_failure()))
            .collect()
    }
}

fn get_num_threads(technical_params: &TechnicalParams) -> usize {
    technical_params.num_threads.unwrap_or_else(num_cpus::get)
}

fn worker_failure() -> Error {
    Error::BackendMismatch("accelerated backend worker terminated".to_string())
}

fn unexpected_result() -> Error {
    Error::BackendMismatch("unexpected result from accelerated backend worker".to_string())
}

/// Concatenates the transmissions of all partitions in partition order.
fn merge_transmissions(results: Vec<PartitionResult>) -> Result<Vec<(usize, Transmission)>> {
    let mut partial = Vec::new();

    for result in results {
        match result {
            PartitionResult::Propagated {
                nid_start,
                transmissions,
            } => partial.push((nid_start, transmissions)),
            _ => return Err(unexpected_result()),
        }
    }

    Ok(partial
        .into_iter()
        .sorted_by_key(|(nid_start, _)| *nid_start)
        .flat_map(|(_, transmissions)| transmissions)
        .collect())
}

impl Backend for AcceleratedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Accelerated
    }

    fn propagate(
        &mut self,
        spiking_nids: &[usize],
        delay_buffer: &mut DelayBuffer,
    ) -> Result<usize> {
        if spiking_nids.is_empty() {
            return Ok(0);
        }

        self.broadcast(Request::Propagate(Arc::new(spiking_nids.to_vec())))?;
        let transmissions = merge_transmissions(self.collect_results()?)?;
        let count = transmissions.len();

        for (delay, transmission) in transmissions {
            delay_buffer.push_at_offset(delay, transmission);
        }

        Ok(count)
    }

    fn apply_stdp(&mut self, input: &Arc<PlasticityInput>) -> Result<()> {
        self.broadcast(Request::ApplyStdp(input.clone()))?;

        let mut first_non_finite: Option<usize> = None;

        for result in self.collect_results()? {
            match result {
                PartitionResult::StdpApplied {
                    first_non_finite: Some(syn_idx),
                } => {
                    first_non_finite = Some(first_non_finite.map_or(syn_idx, |prev| prev.min(syn_idx)))
                }
                PartitionResult::StdpApplied { .. } => {}
                _ => return Err(unexpected_result()),
            }
        }

        match first_non_finite {
            Some(syn_idx) => Err(weight_overflow(syn_idx)),
            None => Ok(()),
        }
    }

    fn weights(&mut self) -> Result<Vec<f32>> {
        self.broadcast(Request::ExtractWeights)?;

        let mut weights = vec![0.0; self.num_synapses];

        for result in self.collect_results()? {
            match result {
                PartitionResult::Weights(partial) => {
                    for (syn_idx, weight) in partial {
                        weights[syn_idx] = weight;
                    }
                }
                _ => return Err(unexpected_result()),
            }
        }

        Ok(weights)
    }

    fn weight(&mut self, syn_idx: usize) -> Result<f32> {
        self.broadcast(Request::ExtractWeight(syn_idx))?;

        let mut found = None;

        for result in self.collect_results()? {
            match result {
                PartitionResult::Weight(Some(weight)) => found = Some(weight),
                PartitionResult::Weight(None) => {}
                _ => return Err(unexpected_result()),
            }
        }

        found.ok_or_else(|| unknown_synapse(syn_idx, self.num_synapses))
    }

    fn set_weight(&mut self, syn_idx: usize, weight: f32) -> Result<()> {
        self.broadcast(Request::SetWeight { syn_idx, weight })
    }
}

impl Drop for AcceleratedBackend {
    fn drop(&mut self) {
        drop(self.broadcast_tx.take()); // signals the worker threads to exit the loop

        self.join_handles.drain(..).for_each(|join_handle| {
            join_handle.join().ok();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SparseBackend;
    use crate::params::StdpParams;
    use itertools::assert_equal;

    fn technical_params(num_threads: usize) -> TechnicalParams {
        TechnicalParams {
            backend: BackendKind::Accelerated,
            num_threads: Some(num_threads),
            pin_threads: false,
        }
    }

    fn synapses() -> Vec<Synapse> {
        let mut synapses = Vec::new();

        for pre in 0..5 {
            for post in 0..5 {
                if (pre + 2 * post) % 3 != 0 {
                    synapses.push(Synapse {
                        pre,
                        post,
                        delay: 1 + (pre + post) % 3,
                        stdp_enabled: pre != post,
                    });
                }
            }
        }

        synapses
    }

    fn weights(num_synapses: usize) -> Vec<f32> {
        (0..num_synapses).map(|i| 0.1 + 0.01 * i as f32).collect()
    }

    #[test]
    fn merge_in_partition_order() {
        let transmission = |post| Transmission { post, current: 1.0 };

        let results = vec![
            PartitionResult::Propagated {
                nid_start: 3,
                transmissions: vec![(1, transmission(4)), (2, transmission(3))],
            },
            PartitionResult::Propagated {
                nid_start: 0,
                transmissions: vec![(1, transmission(0))],
            },
        ];

        let merged = merge_transmissions(results).unwrap();
        assert_equal(
            merged.iter().map(|(delay, transmission)| (*delay, transmission.post)),
            [(1, 0), (1, 4), (2, 3)],
        );
    }

    #[test]
    fn unexpected_result_kind() {
        let results = vec![PartitionResult::Weights(Vec::new())];
        assert!(matches!(
            merge_transmissions(results),
            Err(Error::BackendMismatch(_))
        ));
    }

    #[test]
    fn more_threads_than_neurons() {
        let sut =
            AcceleratedBackend::new(1, &[], &[], None, &technical_params(num_cpus::get())).unwrap();
        assert_eq!(sut.num_partitions, 1);
    }

    #[test]
    fn more_threads_than_cpus() {
        assert!(matches!(
            AcceleratedBackend::new(
                8,
                &[],
                &[],
                None,
                &technical_params(num_cpus::get() + 1)
            ),
            Err(Error::BackendMismatch(_))
        ));
    }

    #[test]
    fn matches_sparse_backend() {
        let synapses = synapses();
        let weights = weights(synapses.len());
        let updater = StdpUpdater::new(StdpParams::default());

        let mut sparse = SparseBackend::new(5, &synapses, &weights, Some(updater.clone()));
        let num_threads = num_cpus::get().min(2);
        let mut sut = AcceleratedBackend::new(
            5,
            &synapses,
            &weights,
            Some(updater),
            &technical_params(num_threads),
        )
        .unwrap();

        let mut sparse_buffer = DelayBuffer::with_max_offset(3);
        let mut sut_buffer = DelayBuffer::with_max_offset(3);

        let spiking_nids = [1, 3, 4];
        assert_eq!(
            sut.propagate(&spiking_nids, &mut sut_buffer).unwrap(),
            sparse.propagate(&spiking_nids, &mut sparse_buffer).unwrap()
        );

        for _ in 0..4 {
            let expected: Vec<_> = sparse_buffer.drain_due().collect();
            let actual: Vec<_> = sut_buffer.drain_due().collect();

            let mut expected_sorted = expected.clone();
            expected_sorted.sort_by_key(|transmission| transmission.post);
            let mut actual_sorted = actual.clone();
            actual_sorted.sort_by_key(|transmission| transmission.post);
            assert_eq!(actual_sorted, expected_sorted);

            sparse_buffer.advance();
            sut_buffer.advance();
        }

        let input = Arc::new(PlasticityInput {
            t: 6,
            spiking_nids: vec![0, 2],
            spiking_mask: vec![true, false, true, false, false],
            prior_spike_t: vec![Some(4), Some(5), None, Some(3), Some(1)],
        });

        sparse.apply_stdp(&input).unwrap();
        sut.apply_stdp(&input).unwrap();

        assert_eq!(sut.weights().unwrap(), sparse.weights().unwrap());

        sut.set_weight(4, -0.5).unwrap();
        sparse.set_weight(4, -0.5).unwrap();
        assert_eq!(sut.weights().unwrap()[4], -0.5);
        assert_eq!(sut.weight(4).unwrap(), -0.5);

        for syn_idx in 0..synapses.len() {
            assert_eq!(sut.weight(syn_idx).unwrap(), sparse.weight(syn_idx).unwrap());
        }

        assert!(matches!(
            sut.weight(synapses.len()),
            Err(Error::OutOfRangeIndex { .. })
        ));
    }
}
