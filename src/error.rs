//! Error type shared by every scoring, selection and session operation.
//!
//! Only caller mistakes are errors. Numerically degenerate outcomes (no usable
//! responses, no root in range, non-positive observed curvature, undecided
//! classification) are reported through NaN or `None` values instead.

use thiserror::Error;

/// Crate-wide result alias.
pub type CatResult<T> = Result<T, CatError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatError {
    // ---- Input shape ----
    #[error("{0} must be a non-empty array")]
    Empty(&'static str),

    #[error("length of {left} ({left_len}) must match length of {right} ({right_len})")]
    LengthMismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },

    // ---- Item parameters ----
    #[error("{model} item parameters must have {expected}, found {found} values")]
    ParamArity {
        model: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("invalid item parameter at position {index}: {value} ({reason})")]
    InvalidParam {
        index: usize,
        value: f64,
        reason: &'static str,
    },

    #[error("item {index} uses the {found} model but {expected} was declared")]
    ModelMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    // ---- Responses ----
    #[error("response {index} has invalid value {value} for the {model} model")]
    InvalidResponse {
        index: usize,
        value: f64,
        model: &'static str,
    },

    // ---- Scalar arguments and options ----
    #[error("{name} must be a finite number, found {value}")]
    NonFinite { name: &'static str, value: f64 },

    #[error("invalid range [{lower}, {upper}]: bounds must be finite with lower < upper")]
    InvalidRange { lower: f64, upper: f64 },

    #[error("invalid {name} option: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("Invalid or unsupported \"model\" provided: \"{0}\"")]
    UnsupportedModel(String),

    #[error("Invalid or unsupported \"select\" provided: \"{0}\"")]
    UnsupportedCriterion(String),

    #[error("Invalid or unsupported \"at\" provided: \"{0}\"")]
    UnsupportedTarget(String),

    #[error("{criterion} is only supported with the brm model")]
    CriterionModel { criterion: &'static str },

    // ---- Item bank and sessions ----
    #[error("duplicate item id in item bank: {0}")]
    DuplicateItem(String),

    #[error("item not found in item bank: {0}")]
    UnknownItem(String),

    #[error("item bank is missing {what} for item {id}")]
    IncompleteItem { id: String, what: &'static str },

    #[error("a response to item {0} has already been recorded")]
    DuplicateResponse(String),

    #[error("additional responses not allowed")]
    ResponsesClosed,

    #[error("cannot initialize phase {phase} responses without phase {previous} responses")]
    PhaseOrder { phase: usize, previous: usize },

    #[error("{strategy} sessions have {phases} phases, found responses for {found}")]
    PhaseCount {
        strategy: &'static str,
        phases: usize,
        found: usize,
    },

    #[error("session strategy already registered: {0}")]
    AlreadyRegistered(String),

    #[error("session strategy not registered: {0}")]
    NotRegistered(String),

    // ---- Configuration ----
    #[error("failed to parse configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for CatError {
    fn from(err: toml::de::Error) -> Self {
        CatError::Config(err.to_string())
    }
}

impl CatError {
    pub(crate) fn option(name: &'static str, reason: impl Into<String>) -> Self {
        CatError::InvalidOption {
            name,
            reason: reason.into(),
        }
    }
}
