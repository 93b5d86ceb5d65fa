use serde::{Deserialize, Serialize};
use simple_error::SimpleError;

use crate::api::BackendKind;
use crate::error::{Error, IndexKind, Result};
use crate::types::HashSet;

pub const MAX_DELAY: usize = 65_536;

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    pub neurons: Vec<NeuronParams>,
    pub synapses: Vec<SynapseParams>,
    pub stdp_params: Option<StdpParams>,
    #[serde(default)]
    pub technical_params: TechnicalParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuronParams {
    pub threshold: f32,
    pub leak: f32,
    pub reset_state: f32,
    pub refractory_period: u32,
    /// Potential at construction; the reset state when absent.
    pub initial_potential: Option<f32>,
    pub initial_refractory: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynapseParams {
    pub pre: usize,
    pub post: usize,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default = "default_delay")]
    pub delay: usize,
    #[serde(default)]
    pub stdp_enabled: bool,
}

fn default_weight() -> f32 {
    1.0
}

fn default_delay() -> usize {
    1
}

impl SynapseParams {
    pub fn new(pre: usize, post: usize, weight: f32, delay: usize) -> Self {
        Self {
            pre,
            post,
            weight,
            delay,
            stdp_enabled: false,
        }
    }

    pub fn plastic(pre: usize, post: usize, weight: f32, delay: usize) -> Self {
        Self {
            stdp_enabled: true,
            ..Self::new(pre, post, weight, delay)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdpParams {
    pub kernel: StdpKernel,
    /// Largest spike time difference that still changes a weight.
    pub window: usize,
    pub min_weight: Option<f32>,
    pub max_weight: Option<f32>,
    pub positive_update: bool,
    pub negative_update: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StdpKernel {
    Exponential {
        a_plus: f32,
        tau_plus: f32,
        a_minus: f32,
        tau_minus: f32,
    },
    /// Per-lag amplitudes, `a_pos[k - 1]` and `a_neg[k - 1]` for a lag of `k` steps.
    Tabulated { a_pos: Vec<f32>, a_neg: Vec<f32> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalParams {
    pub backend: BackendKind,
    pub num_threads: Option<usize>,
    pub pin_threads: bool,
}

impl Default for NeuronParams {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            leak: 1.0,
            reset_state: 0.0,
            refractory_period: 0,
            initial_potential: None,
            initial_refractory: 0,
        }
    }
}

impl Default for StdpParams {
    fn default() -> Self {
        Self {
            kernel: StdpKernel::default(),
            window: 20,
            min_weight: Some(0.0),
            max_weight: None,
            positive_update: true,
            negative_update: true,
        }
    }
}

impl Default for StdpKernel {
    fn default() -> Self {
        StdpKernel::Exponential {
            a_plus: 0.1,
            tau_plus: 20.0,
            a_minus: 0.12,
            tau_minus: 20.0,
        }
    }
}

impl Default for TechnicalParams {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            num_threads: None,
            pin_threads: false,
        }
    }
}

pub fn validate_network_params(params: &NetworkParams) -> Result<()> {
    for (nid, neuron_params) in params.neurons.iter().enumerate() {
        validate_neuron_params(neuron_params)
            .map_err(|err| SimpleError::new(format!("neuron {}: {}", nid, err)))?;
    }

    let num_neurons = params.neurons.len();
    let mut seen_pre_post_pairs = HashSet::default();

    for (syn_idx, synapse_params) in params.synapses.iter().enumerate() {
        for nid in [synapse_params.pre, synapse_params.post] {
            if nid >= num_neurons {
                return Err(Error::OutOfRangeIndex {
                    kind: IndexKind::Neuron,
                    index: nid,
                    bound: num_neurons,
                });
            }
        }

        if synapse_params.delay == 0 || synapse_params.delay > MAX_DELAY {
            return Err(Error::InvalidDelay {
                synapse: syn_idx,
                delay: synapse_params.delay,
            });
        }

        if !synapse_params.weight.is_finite() {
            return Err(SimpleError::new(format!("synapse {}: weight must be finite", syn_idx)).into());
        }

        if !seen_pre_post_pairs.insert((synapse_params.pre, synapse_params.post)) {
            return Err(SimpleError::new(format!(
                "duplicate synapse from neuron {} to neuron {}",
                synapse_params.pre, synapse_params.post
            ))
            .into());
        }
    }

    if let Some(stdp_params) = &params.stdp_params {
        validate_stdp_params(stdp_params)?;
    }

    validate_technical_params(&params.technical_params)
}

fn validate_neuron_params(neuron_params: &NeuronParams) -> std::result::Result<(), SimpleError> {
    if !neuron_params.threshold.is_finite() {
        return Err(SimpleError::new("threshold must be finite"));
    }

    if !(0.0..=1.0).contains(&neuron_params.leak) {
        return Err(SimpleError::new("leak must be in [0, 1]"));
    }

    if !neuron_params.reset_state.is_finite() {
        return Err(SimpleError::new("reset_state must be finite"));
    }

    if let Some(initial_potential) = neuron_params.initial_potential {
        if !initial_potential.is_finite() {
            return Err(SimpleError::new("initial_potential must be finite"));
        }
    }

    if neuron_params.initial_refractory > neuron_params.refractory_period {
        return Err(SimpleError::new(
            "initial_refractory must not be greater than refractory_period",
        ));
    }

    Ok(())
}

fn validate_stdp_params(stdp_params: &StdpParams) -> std::result::Result<(), SimpleError> {
    if stdp_params.window == 0 {
        return Err(SimpleError::new("stdp window must be strictly positive"));
    }

    match &stdp_params.kernel {
        StdpKernel::Exponential {
            a_plus,
            tau_plus,
            a_minus,
            tau_minus,
        } => {
            if !(*tau_plus > 0.0) || !(*tau_minus > 0.0) {
                return Err(SimpleError::new("stdp time constants must be strictly positive"));
            }

            if !is_non_negative(*a_plus) || !is_non_negative(*a_minus) {
                return Err(SimpleError::new(
                    "stdp amplitudes must be finite and not negative",
                ));
            }
        }
        StdpKernel::Tabulated { a_pos, a_neg } => {
            if a_pos.len() != a_neg.len() {
                return Err(SimpleError::new("a_pos and a_neg must have the same length"));
            }

            if !a_pos.iter().chain(a_neg).all(|value| is_non_negative(*value)) {
                return Err(SimpleError::new(
                    "stdp amplitudes must be finite and not negative",
                ));
            }
        }
    }

    if let (Some(min_weight), Some(max_weight)) = (stdp_params.min_weight, stdp_params.max_weight) {
        if min_weight > max_weight {
            return Err(SimpleError::new(
                "min_weight must not be greater than max_weight",
            ));
        }
    }

    Ok(())
}

fn validate_technical_params(technical_params: &TechnicalParams) -> Result<()> {
    if let Some(num_threads) = technical_params.num_threads {
        if num_threads == 0 {
            return Err(Error::BackendMismatch(
                "num_threads must be strictly positive".to_string(),
            ));
        }

        // checked for every kind, since `Auto` may still resolve to `Accelerated`
        if num_cpus::get() < num_threads {
            return Err(Error::BackendMismatch(
                "num_threads must not be greater than number of available CPUs".to_string(),
            ));
        }
    }

    Ok(())
}

fn is_non_negative(value: f32) -> bool {
    value.is_finite() && value >= 0.0
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::util::test_util;

    fn assert_invalid_parameter(params: &NetworkParams, expected_msg: &str) {
        match validate_network_params(params) {
            Err(Error::InvalidParameter(err)) => assert_eq!(err.as_str(), expected_msg),
            other => panic!("expected invalid parameter, got {:?}", other),
        }
    }

    #[test]
    fn valid_params() {
        let params = test_util::get_template_network_params();
        assert!(validate_network_params(&params).is_ok());
    }

    #[test]
    fn leak_out_of_range() {
        let mut params = test_util::get_template_network_params();
        params.neurons[1].leak = 1.5;
        assert_invalid_parameter(&params, "neuron 1: leak must be in [0, 1]");

        params.neurons[1].leak = -0.1;
        assert_invalid_parameter(&params, "neuron 1: leak must be in [0, 1]");
    }

    #[test]
    fn non_finite_threshold() {
        let mut params = test_util::get_template_network_params();
        params.neurons[0].threshold = f32::NAN;
        assert_invalid_parameter(&params, "neuron 0: threshold must be finite");
    }

    #[test]
    fn initial_refractory_too_high() {
        let mut params = test_util::get_template_network_params();
        params.neurons[2].refractory_period = 2;
        params.neurons[2].initial_refractory = 3;
        assert_invalid_parameter(
            &params,
            "neuron 2: initial_refractory must not be greater than refractory_period",
        );
    }

    #[test]
    fn zero_delay() {
        let mut params = test_util::get_template_network_params();
        params.synapses[1].delay = 0;

        assert!(matches!(
            validate_network_params(&params),
            Err(Error::InvalidDelay {
                synapse: 1,
                delay: 0
            })
        ));
    }

    #[test]
    fn too_long_delay() {
        let mut params = test_util::get_template_network_params();
        params.synapses[0].delay = MAX_DELAY + 1;

        assert!(matches!(
            validate_network_params(&params),
            Err(Error::InvalidDelay { synapse: 0, .. })
        ));
    }

    #[test]
    fn post_out_of_range() {
        let mut params = test_util::get_template_network_params();
        params.synapses[0].post = 3;

        assert!(matches!(
            validate_network_params(&params),
            Err(Error::OutOfRangeIndex {
                kind: IndexKind::Neuron,
                index: 3,
                bound: 3
            })
        ));
    }

    #[test]
    fn duplicate_synapse() {
        let mut params = test_util::get_template_network_params();
        params.synapses.push(SynapseParams::new(0, 2, 0.1, 3));
        assert_invalid_parameter(&params, "duplicate synapse from neuron 0 to neuron 2");
    }

    #[test]
    fn self_synapse_allowed() {
        let mut params = test_util::get_template_network_params();
        params.synapses.push(SynapseParams::new(1, 1, 0.1, 1));
        assert!(validate_network_params(&params).is_ok());
    }

    #[test]
    fn zero_stdp_window() {
        let mut params = test_util::get_template_network_params();
        params.stdp_params.as_mut().unwrap().window = 0;
        assert_invalid_parameter(&params, "stdp window must be strictly positive");
    }

    #[test]
    fn zero_tau() {
        let mut params = test_util::get_template_network_params();
        params.stdp_params.as_mut().unwrap().kernel = StdpKernel::Exponential {
            a_plus: 0.1,
            tau_plus: 0.0,
            a_minus: 0.1,
            tau_minus: 10.0,
        };
        assert_invalid_parameter(&params, "stdp time constants must be strictly positive");
    }

    #[test]
    fn negative_amplitude() {
        let mut params = test_util::get_template_network_params();
        params.stdp_params.as_mut().unwrap().kernel = StdpKernel::Tabulated {
            a_pos: vec![0.1, -0.1],
            a_neg: vec![0.1, 0.1],
        };
        assert_invalid_parameter(&params, "stdp amplitudes must be finite and not negative");
    }

    #[test]
    fn tabulated_length_mismatch() {
        let mut params = test_util::get_template_network_params();
        params.stdp_params.as_mut().unwrap().kernel = StdpKernel::Tabulated {
            a_pos: vec![0.1, 0.1],
            a_neg: vec![0.1],
        };
        assert_invalid_parameter(&params, "a_pos and a_neg must have the same length");
    }

    #[test]
    fn inverted_weight_bounds() {
        let mut params = test_util::get_template_network_params();
        let stdp_params = params.stdp_params.as_mut().unwrap();
        stdp_params.min_weight = Some(1.0);
        stdp_params.max_weight = Some(0.5);
        assert_invalid_parameter(&params, "min_weight must not be greater than max_weight");
    }

    #[test]
    fn zero_num_threads() {
        let mut params = test_util::get_template_network_params();
        params.technical_params.num_threads = Some(0);
        assert!(matches!(
            validate_network_params(&params),
            Err(Error::BackendMismatch(_))
        ));
    }

    #[test]
    fn too_high_num_threads() {
        for backend in [
            BackendKind::Accelerated,
            BackendKind::Auto,
            BackendKind::Sparse,
        ] {
            let mut params = test_util::get_template_network_params();
            params.technical_params.backend = backend;
            params.technical_params.num_threads = Some(num_cpus::get() + 1);

            match validate_network_params(&params) {
                Err(Error::BackendMismatch(msg)) => assert_eq!(
                    msg,
                    "num_threads must not be greater than number of available CPUs"
                ),
                other => panic!("expected backend mismatch, got {:?}", other),
            }
        }
    }

    #[test]
    fn yaml_round_trip() {
        let yaml = r#"
neurons:
- threshold: 2.0
  leak: 0.5
- {}
synapses:
- pre: 0
  post: 1
  weight: 0.5
  delay: 3
  stdp_enabled: true
- pre: 1
  post: 0
stdp_params:
  kernel: !Exponential
    a_plus: 0.1
    tau_plus: 20.0
    a_minus: 0.12
    tau_minus: 20.0
  window: 20
  min_weight: 0.0
  max_weight: 1.0
  positive_update: true
  negative_update: false
technical_params:
  backend: Sparse
"#;
        let params: NetworkParams = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(params.neurons.len(), 2);
        assert_eq!(params.neurons[1].refractory_period, 0);
        assert_eq!(params.synapses[0].delay, 3);
        assert!(params.synapses[0].stdp_enabled);
        assert_eq!(params.synapses[1].delay, 1);
        assert!(!params.synapses[1].stdp_enabled);
        assert_eq!(params.technical_params.backend, BackendKind::Sparse);
        assert!(!params.stdp_params.as_ref().unwrap().negative_update);
        assert!(validate_network_params(&params).is_ok());
    }
}
