use thiserror::Error;

pub type PlannerResult<T> = Result<T, PlannerError>;

/// Top-level error type for the planner core.
///
/// Mirrors the propagation policy of §7: per-sequence failures are logged and
/// dropped inside a batch (never surfaced as a [`PlannerError`]); per-batch
/// failures are logged but do not abort the coordinator unless every
/// evaluator has failed. Safety-gate failures and optimiser data failures
/// always fail the request, surfacing here.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Optimiser(#[from] OptimiserError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Resilience(#[from] ResilienceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised by the Portfolio Optimiser (C5).
#[derive(Debug, Error, Clone)]
pub enum OptimiserError {
    /// Fewer than two symbols have usable expected-return/covariance data.
    #[error("insufficient data to optimise: {0}")]
    InsufficientData(String),

    /// Both `efficient_return` and `max_sharpe` failed and HRP also failed.
    #[error("optimiser infeasible: {0}")]
    OptimizerInfeasible(String),
}

/// Errors raised by the Safety / Frequency Gate (S).
#[derive(Debug, Error, Clone)]
pub enum SafetyError {
    #[error("trade rejected by safety gate ({rule}): {reason}")]
    SafetyRejected { rule: String, reason: String },
}

/// Errors raised by the Resilience Layer (R).
#[derive(Debug, Error)]
pub enum ResilienceError {
    #[error("retry exhausted after {attempts} attempts")]
    RetryExhausted {
        attempts: u32,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("circuit '{service}' is open")]
    CircuitOpen { service: String },

    #[error("circuit '{service}' is half-open with a call already in flight")]
    CircuitHalfOpen { service: String },
}

/// Errors raised by the Recommendation Cache.
#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error("cache entry for key '{0}' failed to decode; treating as a miss")]
    CacheCorrupt(String),
}

/// Errors raised by the Global Beam Coordinator (C4).
#[derive(Debug, Error, Clone)]
pub enum CoordinatorError {
    #[error("all evaluators unreachable for batch {batch}")]
    EvaluatorUnavailable { batch: u64 },
}

/// Errors for internal invariants, analogous to the teacher's own `SystemError`.
#[derive(Debug, Error, Clone)]
pub enum SystemError {
    #[error("missing internal field: {0}")]
    MissingField(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
