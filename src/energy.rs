// energy.rs
use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::determinant::Determinant;
use crate::hamiltonian::Hamiltonian;
use crate::SparseState;

/// Projected energy estimate
/// E = <ref|H|Psi> / <ref|Psi> = \sum_J H_{ref,J} C_J / C_ref,
/// using only couplings between the reference determinant and members of the
/// sparse state: cost linear in the state size.
/// # Arguments
///     `h`: Hamiltonian, coupling evaluator.
///     `state`: SparseState, current wavefunction.
///     `reference`: Determinant, the projection target.
pub fn projected_energy(h: &Hamiltonian, state: &SparseState, reference: &Determinant) -> f64 {
    let entries = state.entries();
    let num: f64 = entries
        .par_iter()
        .fold(
            || 0.0_f64,
            |mut acc, (det, c)| {
                acc += h.coupling(det, reference) * c;
                acc
            },
        )
        .sum();
    num / state.get(reference)
}

/// Variational (Rayleigh quotient) energy estimate
/// E = <Psi|H|Psi> / <Psi|Psi> = \sum_{IJ} C_I H_{IJ} C_J / \sum_I C_I^2.
/// Pairwise over the sparse state, so up to quadratic cost; rank-screened by
/// the excitation degree before any integral lookup.
/// # Arguments
///     `h`: Hamiltonian, coupling evaluator.
///     `state`: SparseState, current wavefunction.
pub fn variational_energy(h: &Hamiltonian, state: &SparseState) -> f64 {
    let entries = state.entries();
    let num: f64 = entries
        .par_iter()
        .enumerate()
        .fold(
            || 0.0_f64,
            |mut acc, (n, (di, ci))| {
                acc += ci * ci * h.diagonal(di);
                for (dj, cj) in &entries[n + 1..] {
                    let (da, db) = di.excitation_degree(dj);
                    if da + db == 0 || da + db > 2 {
                        continue;
                    }
                    // Off-diagonal pairs count twice for a real symmetric H.
                    acc += 2.0 * ci * cj * h.coupling(di, dj);
                }
                acc
            },
        )
        .sum();
    let den: f64 = entries.iter().map(|(_, c)| c * c).sum();
    num / den
}

/// Assemble the labeled energy estimates for the current state. The projected
/// estimate is always present; the variational one only when requested. The
/// caller folds in step-scoped values (the perturbative correction) under their
/// own labels.
pub fn estimate_energy(
    h: &Hamiltonian,
    state: &SparseState,
    reference: &Determinant,
    variational: bool,
) -> BTreeMap<String, f64> {
    let mut estimates = BTreeMap::new();
    estimates.insert("projected".to_string(), projected_energy(h, state, reference));
    if variational {
        estimates.insert("variational".to_string(), variational_energy(h, state));
    }
    estimates
}
