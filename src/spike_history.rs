/// Per-neuron spike record.
///
/// Full spike trains are append-only and kept for readout. Plasticity only
/// looks at the two most recent spikes of each neuron, which is enough to find
/// the latest spike strictly before the current step.
#[derive(Debug, Clone)]
pub struct SpikeHistory {
    spike_trains: Vec<Vec<usize>>,
    last_spike_t: Vec<Option<usize>>,
    next_to_last_spike_t: Vec<Option<usize>>,
}

impl SpikeHistory {
    pub fn new(num_neurons: usize) -> Self {
        Self {
            spike_trains: vec![Vec::new(); num_neurons],
            last_spike_t: vec![None; num_neurons],
            next_to_last_spike_t: vec![None; num_neurons],
        }
    }

    pub fn record(&mut self, t: usize, nid: usize) {
        debug_assert!(self.last_spike_t[nid].map_or(true, |last_t| last_t < t));

        self.spike_trains[nid].push(t);
        self.next_to_last_spike_t[nid] = self.last_spike_t[nid];
        self.last_spike_t[nid] = Some(t);
    }

    pub fn spike_train(&self, nid: usize) -> &[usize] {
        &self.spike_trains[nid]
    }

    pub fn spike_trains(&self) -> &[Vec<usize>] {
        &self.spike_trains
    }

    pub fn spike_counts(&self) -> Vec<usize> {
        self.spike_trains.iter().map(Vec::len).collect()
    }

    pub fn last_spike_before(&self, nid: usize, t: usize) -> Option<usize> {
        match self.last_spike_t[nid] {
            Some(last_t) if last_t < t => Some(last_t),
            Some(_) => self.next_to_last_spike_t[nid],
            None => None,
        }
    }

    /// Fills `out` with each neuron's most recent spike before `t` that lies
    /// no more than `window` steps back.
    pub fn fill_prior_spike_times(&self, t: usize, window: usize, out: &mut Vec<Option<usize>>) {
        out.clear();
        out.extend((0..self.last_spike_t.len()).map(|nid| {
            self.last_spike_before(nid, t)
                .filter(|spike_t| t - spike_t <= window)
        }));
    }

    /// Forgets the lookback used by plasticity. Spike trains are kept.
    pub fn forget_recent(&mut self) {
        self.last_spike_t.iter_mut().for_each(|t| *t = None);
        self.next_to_last_spike_t.iter_mut().for_each(|t| *t = None);
    }
}
