use std::sync::mpsc::Sender as MpscSender;
use std::sync::Arc;

use bus::BusReader;

use crate::{stdp::PlasticityInput, synapse::Transmission};

use super::SparseMatrix;

#[derive(Debug, Clone)]
pub enum Request {
    Propagate(Arc<Vec<usize>>),
    ApplyStdp(Arc<PlasticityInput>),
    ExtractWeights,
    ExtractWeight(usize),
    SetWeight { syn_idx: usize, weight: f32 },
}

pub enum PartitionResult {
    Propagated {
        nid_start: usize,
        transmissions: Vec<(usize, Transmission)>,
    },
    StdpApplied {
        first_non_finite: Option<usize>,
    },
    Weights(Vec<(usize, f32)>),
    Weight(Option<f32>),
}

/// The slice of the synapse matrix whose post-neurons fall into one
/// contiguous range, owned by one worker thread.
pub struct Partition {
    matrix: SparseMatrix,
}

impl Partition {
    pub fn new(matrix: SparseMatrix) -> Self {
        Self { matrix }
    }

    pub fn nid_start(&self) -> usize {
        self.matrix.post_range().start
    }

    pub fn num_entries(&self) -> usize {
        self.matrix.num_entries()
    }

    pub fn run(
        &mut self,
        mut rx: BusReader<Request>,
        partition_result_tx: MpscSender<PartitionResult>,
    ) {
        while let Ok(request) = rx.recv() {
            let result = match request {
                Request::Propagate(spiking_nids) => {
                    let mut transmissions = Vec::new();
                    self.matrix
                        .propagate_into(&spiking_nids, |delay, transmission| {
                            transmissions.push((delay, transmission))
                        });

                    PartitionResult::Propagated {
                        nid_start: self.nid_start(),
                        transmissions,
                    }
                }
                Request::ApplyStdp(input) => PartitionResult::StdpApplied {
                    first_non_finite: self.matrix.apply_stdp(&input),
                },
                Request::ExtractWeights => {
                    PartitionResult::Weights(self.matrix.weights_by_syn_idx().collect())
                }
                Request::ExtractWeight(syn_idx) => {
                    PartitionResult::Weight(self.matrix.weight(syn_idx))
                }
                Request::SetWeight { syn_idx, weight } => {
                    self.matrix.set_weight(syn_idx, weight);
                    continue;
                }
            };

            if partition_result_tx.send(result).is_err() {
                break;
            }
        }
    }
}
