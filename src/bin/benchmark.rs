use std::time::Instant;

use lifmat::api::BackendKind;
use lifmat::network::{self, StepInput};
use rand::{prelude::Distribution, rngs::StdRng, seq::SliceRandom, SeedableRng};
use statrs::distribution::Poisson;

#[path = "../scenario_params.rs"]
mod scenario_params;

fn run(backend: BackendKind, t_stop: usize) {
    let mut network =
        network::create_network(scenario_params::get_scenario_params(backend, None)).unwrap();

    let all_stimulus_nids: Vec<usize> = (0..800).collect();
    let mut rng = StdRng::seed_from_u64(0);

    let mut spike_count = 0usize;
    let mut synaptic_transmission_count = 0usize;
    let mut checksum = 0;

    let wall_start = Instant::now();

    let num_stimulus_spikes_dist = Poisson::new(5.0).unwrap();

    let mut step_input = StepInput::new();

    for _ in 0..t_stop {
        let num_stimulus_spikes = num_stimulus_spikes_dist.sample(&mut rng) as usize;

        step_input.reset();
        step_input.force_spiking_nids = all_stimulus_nids
            .choose_multiple(&mut rng, num_stimulus_spikes)
            .copied()
            .collect();
        let step_result = network.step(&step_input).unwrap();

        spike_count += step_result.spiking_nids.len();
        synaptic_transmission_count += step_result.synaptic_transmission_count;

        for nid in step_result.spiking_nids {
            checksum += nid;
        }
    }

    let wall_time = wall_start.elapsed();
    let synaptic_transm_proc_throughput =
        synaptic_transmission_count as f64 / wall_time.as_secs_f64();

    eprintln!("{:?} backend:", network.backend_kind());
    eprintln!("...spikes per step: {}", spike_count as f64 / t_stop as f64);
    eprintln!(
        "...synaptic transmission processing throughput: {:.3e} ({:.3} ns per transmission)",
        synaptic_transm_proc_throughput,
        1e9 / synaptic_transm_proc_throughput
    );
    eprintln!("...checksum: {}", checksum);
}

fn main() {
    let t_stop = 5000;

    for backend in [
        BackendKind::Dense,
        BackendKind::Sparse,
        BackendKind::Accelerated,
    ] {
        run(backend, t_stop);
    }
}
