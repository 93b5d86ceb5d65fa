use simple_error::SimpleError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Neuron,
    Synapse,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Neuron => write!(f, "neuron"),
            IndexKind::Synapse => write!(f, "synapse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowSite {
    Potential,
    Weight,
}

impl std::fmt::Display for OverflowSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowSite::Potential => write!(f, "potential of neuron"),
            OverflowSite::Weight => write!(f, "weight of synapse"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{kind} index {index} out of range (population size {bound})")]
    OutOfRangeIndex {
        kind: IndexKind,
        index: usize,
        bound: usize,
    },

    #[error("invalid delay {delay} on synapse {synapse}: delay must be in [1, {}]", crate::params::MAX_DELAY)]
    InvalidDelay { synapse: usize, delay: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(#[from] SimpleError),

    #[error("backend mismatch: {0}")]
    BackendMismatch(String),

    #[error("numeric overflow: {what} {index} is not finite")]
    NumericOverflow { what: OverflowSite, index: usize },
}

impl Error {
    pub(crate) fn neuron_out_of_range(index: usize, bound: usize) -> Self {
        Error::OutOfRangeIndex {
            kind: IndexKind::Neuron,
            index,
            bound,
        }
    }
}
