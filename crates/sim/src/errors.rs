use crate::base::TypeId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a scenario.
///
/// These abort the setup of a replicate (or of the whole run, since all
/// replicates share one configuration) and never occur inside `advance()`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A type id was registered twice.
    #[error("type space conflict: type {0} is already registered")]
    DuplicateType(TypeId),

    /// A type id does not fit in the configured type space.
    #[error("type {id} is outside the type space (max_types = {max_types})")]
    TypeOutOfRange { id: TypeId, max_types: usize },

    /// A parameter was present but outside its valid range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },

    /// A required parameter was missing for a named strategy.
    #[error("missing parameter '{name}' for {strategy}")]
    MissingParameter { strategy: String, name: String },

    /// The mutation strategy name is not one we know.
    #[error("unknown mutation strategy: {0}")]
    UnknownStrategy(String),

    /// The rate distribution name is not one we know.
    #[error("unknown rate distribution: {0}")]
    UnknownDistribution(String),

    /// No founder clones were configured.
    #[error("no clones were added to the population")]
    EmptyPopulation,

    /// A scenario file or empirical table could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An empirical table contained a token that is not a number.
    #[error("bad value in empirical table {path} at line {line}: '{token}'")]
    TableValue {
        path: PathBuf,
        line: usize,
        token: String,
    },

    /// The scenario document is malformed.
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidParameter`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse {
            line: e.line(),
            column: e.column(),
            message: e.to_string(),
        }
    }
}

/// Precondition violations detected while the simulation runs.
///
/// Any of these means the population's aggregate state and the event just
/// selected disagree. The replicate must stop; the error is never mapped
/// to a default.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// `advance()` was called on a population with no cells.
    #[error("cannot advance an extinct population")]
    EmptyPopulation,

    /// A mutation strategy was asked to mutate a terminal type.
    #[error("{strategy}: type {type_id} is absorbing and cannot mutate")]
    AbsorbingType {
        strategy: &'static str,
        type_id: TypeId,
    },

    /// A new type was requested but every id is taken.
    #[error("no free type ids left (max_types = {max_types})")]
    TypeSpaceExhausted { max_types: usize },

    /// Mutation was attempted while the `none` strategy is active.
    #[error("mutation attempted but the mutation strategy is 'none'")]
    MutationDisabled,

    /// A cell was removed from a clone that has none, or does not exist.
    #[error("cannot remove a cell from an empty or missing clone")]
    EmptyClone,

    /// Weighted selection was asked to pick from zero total weight.
    #[error("cannot select from a population with zero total {0} weight")]
    ZeroWeight(&'static str),

    /// A type id was looked up that is not registered.
    #[error("type {0} is not registered")]
    UnknownType(TypeId),

    /// A type id lies outside the type space.
    #[error("type {id} is outside the type space (max_types = {max_types})")]
    TypeOutOfRange { id: TypeId, max_types: usize },

    /// A sampling distribution could not be constructed.
    #[error("invalid {kind} distribution: {reason}")]
    Distribution { kind: &'static str, reason: String },

    /// The replicate worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    /// A replicate's initial population could not be built.
    #[error("replicate setup failed: {0}")]
    Setup(#[from] ConfigError),
}
