//! Error taxonomy for the optimization core.

use serde::Serialize;
use thiserror::Error;

/// Errors that can abort an optimization run.
///
/// An infeasible-but-completed run is *not* an error: it surfaces as
/// `success = false` with populated `constraint_violations` on the result.
#[derive(Error, Debug, Clone, Serialize)]
pub enum SolveError {
    /// The request is malformed: unknown variable, degenerate bounds,
    /// non-physical configuration, unsupported algorithm. The message names
    /// the offending field. A job hit by this never leaves `Pending`.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Something went wrong inside the solver or its callbacks. `stage` is
    /// one of `"physics evaluation"`, `"constraint evaluation"`, `"solver"`.
    #[error("optimization failed during {stage}: {message}")]
    Optimization {
        stage: &'static str,
        message: String,
    },

    /// The cancellation token was observed inside the objective. The job
    /// moves to `Cancelled` with its partial iteration log preserved.
    #[error("optimization cancelled by caller")]
    Cancelled,

    /// Invariant breach inside the core itself (for example an illegal job
    /// state transition). Maps to 500-class transport responses.
    #[error("internal error: {0}")]
    Internal(String),
}
