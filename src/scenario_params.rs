use lifmat::api::BackendKind;
use lifmat::params::{NetworkParams, NeuronParams, StdpParams, SynapseParams};
use rand::{
    distributions::{Bernoulli, Uniform},
    prelude::Distribution,
    rngs::StdRng,
    SeedableRng,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ScenarioParams {
    populations: Vec<PopulationParams>,
    connections: Vec<ConnectionParams>,
    stdp_params: StdpParams,
}

#[derive(Debug, Deserialize)]
struct PopulationParams {
    num_neurons: usize,
    neuron_params: NeuronParams,
}

#[derive(Debug, Deserialize)]
struct ConnectionParams {
    from_population: usize,
    to_population: usize,
    connect_density: f64,
    weight_min: f32,
    weight_max: f32,
    delay_max: usize,
    plastic: bool,
    allow_self_innervation: bool,
}

const SCENARIO_YAML: &str = r#"
populations:
- num_neurons: 800
  neuron_params:
    threshold: 1.0
    leak: 0.1
    reset_state: 0.0
    refractory_period: 10
- num_neurons: 200
  neuron_params:
    threshold: 1.0
    leak: 0.25
    reset_state: 0.0
    refractory_period: 5
connections:
- from_population: 0
  to_population: 0
  connect_density: 0.1
  weight_min: 0.0
  weight_max: 0.5
  delay_max: 20
  plastic: true
  allow_self_innervation: true
- from_population: 0
  to_population: 1
  connect_density: 0.25
  weight_min: 0.0
  weight_max: 0.5
  delay_max: 20
  plastic: true
  allow_self_innervation: true
- from_population: 1
  to_population: 0
  connect_density: 0.25
  weight_min: -0.85
  weight_max: -0.85
  delay_max: 1
  plastic: false
  allow_self_innervation: true
- from_population: 1
  to_population: 1
  connect_density: 0.25
  weight_min: -0.85
  weight_max: -0.85
  delay_max: 1
  plastic: false
  allow_self_innervation: false
stdp_params:
  kernel: !Exponential
    a_plus: 0.01
    tau_plus: 20.0
    a_minus: 0.012
    tau_minus: 20.0
  window: 40
  min_weight: 0.0
  max_weight: 0.5
  positive_update: true
  negative_update: true
"#;

/// Random excitatory/inhibitory network, identical for every backend.
pub fn get_scenario_params(backend: BackendKind, num_threads: Option<usize>) -> NetworkParams {
    let scenario: ScenarioParams = serde_yaml::from_str(SCENARIO_YAML).unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let mut population_nid_starts = Vec::new();
    let mut neurons = Vec::new();

    for population in &scenario.populations {
        population_nid_starts.push(neurons.len());
        neurons.extend(std::iter::repeat(population.neuron_params.clone()).take(population.num_neurons));
    }

    let mut synapses = Vec::new();

    for connection in &scenario.connections {
        let connect_dist = Bernoulli::new(connection.connect_density).unwrap();
        let weight_dist = Uniform::new_inclusive(connection.weight_min, connection.weight_max);
        let delay_dist = Uniform::new_inclusive(1, connection.delay_max);

        let from_start = population_nid_starts[connection.from_population];
        let to_start = population_nid_starts[connection.to_population];

        for from_idx in 0..scenario.populations[connection.from_population].num_neurons {
            for to_idx in 0..scenario.populations[connection.to_population].num_neurons {
                let pre = from_start + from_idx;
                let post = to_start + to_idx;

                if (pre == post && !connection.allow_self_innervation)
                    || !connect_dist.sample(&mut rng)
                {
                    continue;
                }

                let mut synapse = SynapseParams::new(
                    pre,
                    post,
                    weight_dist.sample(&mut rng),
                    delay_dist.sample(&mut rng),
                );
                synapse.stdp_enabled = connection.plastic;
                synapses.push(synapse);
            }
        }
    }

    let mut params = NetworkParams {
        neurons,
        synapses,
        stdp_params: Some(scenario.stdp_params),
        ..Default::default()
    };

    params.technical_params.backend = backend;
    params.technical_params.num_threads = num_threads;

    params
}
