use crate::params::{StdpKernel, StdpParams};

/// Everything the plasticity phase of one step needs to know about spike timing.
#[derive(Debug, Clone, Default)]
pub struct PlasticityInput {
    pub t: usize,
    pub spiking_nids: Vec<usize>,
    pub spiking_mask: Vec<bool>,
    /// Most recent spike strictly before `t`, if within the lookback window.
    pub prior_spike_t: Vec<Option<usize>>,
}

/// Pair-based STDP rule. Stateless: the delta depends only on the arguments.
#[derive(Debug, Clone)]
pub struct StdpUpdater {
    params: StdpParams,
}

impl StdpUpdater {
    pub fn new(params: StdpParams) -> Self {
        Self { params }
    }

    /// Signed weight change for one pre/post spike pairing. Never clamps.
    pub fn delta(&self, t_pre: Option<usize>, t_post: Option<usize>, _weight: f32) -> f32 {
        match (t_pre, t_post) {
            (Some(t_pre), Some(t_post)) => self.kernel(t_post as i64 - t_pre as i64),
            _ => 0.0,
        }
    }

    fn kernel(&self, t_post_minus_pre: i64) -> f32 {
        let lag = t_post_minus_pre.unsigned_abs() as usize;

        if lag == 0 || lag > self.params.window {
            return 0.0;
        }

        if t_post_minus_pre > 0 {
            if self.params.positive_update {
                self.potentiation(lag)
            } else {
                0.0
            }
        } else if self.params.negative_update {
            -self.depression(lag)
        } else {
            0.0
        }
    }

    fn potentiation(&self, lag: usize) -> f32 {
        match &self.params.kernel {
            StdpKernel::Exponential {
                a_plus, tau_plus, ..
            } => a_plus * (-(lag as f32) / tau_plus).exp(),
            StdpKernel::Tabulated { a_pos, .. } => a_pos.get(lag - 1).copied().unwrap_or(0.0),
        }
    }

    fn depression(&self, lag: usize) -> f32 {
        match &self.params.kernel {
            StdpKernel::Exponential {
                a_minus, tau_minus, ..
            } => a_minus * (-(lag as f32) / tau_minus).exp(),
            StdpKernel::Tabulated { a_neg, .. } => a_neg.get(lag - 1).copied().unwrap_or(0.0),
        }
    }

    /// Summed weight change for the synapse `pre -> post` in this step. Never clamps.
    ///
    /// A firing post-neuron pairs with the pre-neuron's prior spike, a firing
    /// pre-neuron with the post-neuron's prior spike. Both terms add up when
    /// both neurons fire in the same step.
    pub fn pairing_delta(
        &self,
        input: &PlasticityInput,
        pre: usize,
        post: usize,
        weight: f32,
    ) -> f32 {
        let mut delta = 0.0;

        if input.spiking_mask[post] {
            delta += self.delta(input.prior_spike_t[pre], Some(input.t), weight);
        }

        if input.spiking_mask[pre] {
            delta += self.delta(Some(input.t), input.prior_spike_t[post], weight);
        }

        delta
    }

    pub fn min_weight(&self) -> Option<f32> {
        self.params.min_weight
    }

    pub fn max_weight(&self) -> Option<f32> {
        self.params.max_weight
    }
}
