use std::env;
use std::fs::File;

use lifmat::api::BackendKind;
use lifmat::network::{self, StepInput};
use rand::{prelude::Distribution, rngs::StdRng, seq::SliceRandom, SeedableRng};
use statrs::distribution::Poisson;

#[path = "../scenario_params.rs"]
mod scenario_params;

/// Usage: checksum_gen [dense|sparse|accelerated] [snapshot.json]
fn main() {
    let args: Vec<String> = env::args().collect();

    let backend = match args.get(1).map(String::as_str) {
        Some("dense") => BackendKind::Dense,
        Some("accelerated") => BackendKind::Accelerated,
        _ => BackendKind::Sparse,
    };

    let mut network =
        network::create_network(scenario_params::get_scenario_params(backend, None)).unwrap();

    let stimulation_nids: Vec<usize> = (0..1000).collect();
    let mut rng = StdRng::seed_from_u64(0);

    let mut synaptic_transmission_count = 0usize;
    let mut neuron_checksum = 0;
    let t_stop = 1000;

    let mut step_input = StepInput::new();

    let num_stimulus_spikes_dist = Poisson::new(10.0).unwrap();

    for _ in 0..t_stop {
        let num_stimulus_spikes = num_stimulus_spikes_dist.sample(&mut rng) as usize;

        step_input.reset();
        step_input.force_spiking_nids = stimulation_nids
            .choose_multiple(&mut rng, num_stimulus_spikes)
            .copied()
            .collect();

        let step_result = network.step(&step_input).unwrap();

        synaptic_transmission_count += step_result.synaptic_transmission_count;

        for nid in step_result.spiking_nids {
            neuron_checksum += step_result.t * nid;
        }
    }

    println!("batch result ({:?} backend):", network.backend_kind());
    println!("...neuron checksum: {}", neuron_checksum);
    println!(
        "...synaptic transmission count: {}",
        synaptic_transmission_count
    );

    step_input.reset();
    step_input.extract_state_snapshot = true;

    let step_result = network.step(&step_input).unwrap();

    let state_snapshot = step_result.state_snapshot.unwrap();

    let potential_checksum: f64 = state_snapshot
        .neuron_states
        .iter()
        .map(|neuron_state| neuron_state.potential as f64)
        .sum();

    let mut syn_state_checksum = 0.0;

    for syn_state in &state_snapshot.synapse_states {
        syn_state_checksum += syn_state.pre as f64
            * syn_state.post as f64
            * syn_state.delay as f64
            * syn_state.weight as f64;
    }

    let spiking_nid_checksum: usize = step_result.spiking_nids.iter().sum();
    let spike_count_checksum: usize = network.spike_counts().iter().sum();

    println!("single result:");
    println!("...spiking nids checksum: {}", spiking_nid_checksum);
    println!(
        "...synaptic transmission count: {}",
        step_result.synaptic_transmission_count
    );
    println!("...potentials checksum: {}", potential_checksum);
    println!("...synapse states checksum: {}", syn_state_checksum);
    println!("...total spike count: {}", spike_count_checksum);

    if let Some(path) = args.get(2) {
        let file = File::create(path).unwrap();
        serde_json::to_writer(file, &state_snapshot).unwrap();
        println!("state snapshot written to {}", path);
    }
}
