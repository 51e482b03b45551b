//! Error types for the agent.
//!
//! Errors are strongly typed using thiserror so callers can match on
//! specific failure modes rather than string-sniffing.

use thiserror::Error;

/// Invalid inputs at a component boundary.
///
/// Domain errors are always the caller's fault: a malformed observation, an
/// out-of-range configuration value, a probability outside [0, 1]. They are
/// never raised from inside an already-validated belief.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// An observation or query sample contained a non-finite value.
    #[error("observation contains a non-finite value at index {index}")]
    NonFiniteObservation {
        /// Index of the offending dimension.
        index: usize,
    },

    /// An observation's dimensionality did not match the belief's state dimension.
    #[error("observation has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Observed dimension.
        actual: usize,
        /// Expected dimension.
        expected: usize,
    },

    /// A configuration field was outside its documented valid range.
    #[error("invalid configuration field '{field}': {reason}")]
    InvalidConfig {
        /// Field name.
        field: String,
        /// Reason the value is invalid.
        reason: String,
    },

    /// A weight or probability update used a non-positive weight.
    #[error("update weight must be positive, got {value}")]
    NonPositiveWeight {
        /// The invalid weight.
        value: f64,
    },

    /// Support or countersupport fell outside [0, 1].
    #[error("support value {value} is out of range [0.0, 1.0]")]
    SupportOutOfRange {
        /// The invalid value.
        value: f64,
    },

    /// Thresholds for Belnap status assignment are not ordered as required.
    #[error("invalid thresholds: tau={tau}, tau_prime={tau_prime} (require tau_prime < 0.5 < tau)")]
    InvalidThresholds {
        /// Upper threshold.
        tau: f64,
        /// Lower threshold.
        tau_prime: f64,
    },

    /// A configuration option names a feature that is recognized but not built.
    #[error("not implemented: {feature}")]
    NotImplemented {
        /// Name of the unimplemented feature.
        feature: String,
    },

    /// A JSON document failed to parse or deserialize.
    #[error("failed to parse JSON: {0}")]
    Json(String),

    /// An I/O operation failed (config/episode/report file access).
    #[error("I/O error: {0}")]
    Io(String),
}

/// The CBF-QP safety filter failed to produce a safe action.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// The barrier gradient was non-finite (e.g. evaluated at its singular point).
    #[error("barrier gradient is non-finite at the current state")]
    SingularGradient,

    /// The solver produced a non-finite control or slack value.
    #[error("solver produced a non-finite result")]
    NonFiniteResult,
}

/// Crate-wide error composing the two recoverable error kinds.
///
/// `NumericWarning` is not a variant here: it is observational data carried
/// in step annotations, not a control-flow error. `LogicError` (broken
/// internal invariants) is not recoverable and panics at the point of
/// detection instead of being represented here.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentError {
    /// A boundary input was invalid.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The safety filter failed.
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// A non-fatal numeric condition worth surfacing to the caller.
///
/// Distinct from an error: the step still produced a usable result, but a
/// caller inspecting the episode log should know e.g. that the safety slack
/// was non-negligible.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericWarning {
    /// The CBF-QP slack exceeded the negligible threshold (1e-5).
    NonNegligibleSlack {
        /// The slack value.
        slack: f64,
    },
    /// Effective sample size dropped close to 1 before a resample could run.
    NearDegenerateEss {
        /// The ESS value observed.
        ess: f64,
    },
    /// A source's reliability estimate sits at the clipping boundary.
    TrustNearBounds {
        /// The clipped reliability.
        reliability: f64,
    },
}

impl std::fmt::Display for NumericWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonNegligibleSlack { slack } => {
                write!(f, "non-negligible safety slack: {slack}")
            }
            Self::NearDegenerateEss { ess } => write!(f, "near-degenerate ESS: {ess}"),
            Self::TrustNearBounds { reliability } => {
                write!(f, "source reliability near clipping bound: {reliability}")
            }
        }
    }
}
