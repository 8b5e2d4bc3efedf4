// error.rs
use thiserror::Error;

/// Fatal error conditions of the propagation engine. Non-convergence is not an
/// error: the driver reports it as a flagged result with a warning.
#[derive(Debug, Error)]
pub enum PiciError {
    /// Invalid or mutually inconsistent parameters, detected before propagation.
    #[error("invalid options: {0}")]
    Config(String),

    /// A NaN or infinite Hamiltonian matrix element was produced during a step.
    #[error("non-finite coupling between determinants {bra} and {ket}")]
    NonFiniteCoupling { bra: String, ket: String },

    /// A NaN or infinite amplitude appeared in the merged state.
    #[error("non-finite amplitude on determinant {det} at iteration {iter}")]
    NonFiniteAmplitude { det: String, iter: usize },

    /// The pruned state collapsed to a bare below-threshold reference when
    /// spawned contributions were expected.
    #[error("sparse state collapsed to the reference at iteration {iter}; the spawning threshold or time step is misconfigured")]
    StateCollapsed { iter: usize },
}
