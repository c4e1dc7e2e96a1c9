use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse workflow JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to build workflow graph: {0}")]
    ModelConstructionError(String),

    #[error("Not enough ranks in topology '{topology}': {reason}")]
    InsufficientResourcesError { topology: String, reason: String },

    #[error("Ranks {first}..{end} are assigned to both '{left}' and '{right}'")]
    TopologyOverlapError { left: String, right: String, first: usize, end: usize },

    #[error("Ranks {first}..{end} are not assigned to any task or link")]
    UnassignedRanksError { first: usize, end: usize },

    #[error("Unknown topology '{0}'")]
    UnknownTopologyError(String),

    #[error("Host '{host}' is not part of topology '{topology}'")]
    UnknownHostError { topology: String, host: String },

    #[error("'{0}' is already declared")]
    DuplicateNameError(String),

    #[error("Unknown node '{0}'")]
    UnknownNodeError(String),

    #[error("Node '{node}' has no port named '{port}'")]
    UnknownPortError { node: String, port: String },

    #[error("Port '{node}.{port}' cannot be used as an {expected} port")]
    PortDirectionError { node: String, port: String, expected: String },

    #[error("Input port '{node}.{port}' is already connected to an output port")]
    InputPortFanInError { node: String, port: String },

    #[error("Field '{field}' has periodicity {periodicity}, periodicities must be 1 or higher")]
    InvalidPeriodicityError { field: String, periodicity: u32 },

    #[error("Periodicities {left} and {right} have no common multiple that fits in 32 bits")]
    PeriodicityOverflowError { left: u32, right: u32 },

    #[error("The link of '{edge}' has ranks but no command line")]
    MissingLinkCommandError { edge: String },

    #[error("The types of '{field}' do not match on '{edge}': '{expected}' is expected but the {provider} sends '{found}'")]
    TypeMismatchError { edge: String, field: String, expected: String, found: String, provider: String },

    #[error("The fields '{fields}' are not sent by the {provider} of '{edge}'")]
    MissingContractFieldError { edge: String, fields: String, provider: String },

    #[error("The link of '{edge}' has no {side} and does not accept any field")]
    EmptyLinkContractError { edge: String, side: String },

    #[error("The cycle '{cycle}' has no token on any input port and would deadlock")]
    UnresolvableCycleError { cycle: String },

    #[error("Edges mix the transports '{first}' and '{second}'")]
    MixedTransportError { first: String, second: String },

    #[error("Task '{0}' has no rank assigned")]
    ZeroRankTaskError(String),

    #[error("'{0}' needs a topology to pin its ranks")]
    MissingTopologyError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
