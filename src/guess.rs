// guess.rs
use std::collections::BTreeSet;

use ndarray::Array2;
use ndarray_linalg::{Eigh, UPLO};

use crate::determinant::Determinant;
use crate::error::PiciError;
use crate::hamiltonian::{CouplingCache, Hamiltonian};
use crate::spawning::apply_tau_h;
use crate::{PropagationParams, SparseState};

// Storage for the initial sparse states and their energies, one per root.
pub struct Guess {
    pub states: Vec<SparseState>,
    pub energies: Vec<f64>,
}

/// Build the initial guess: one coarse spawning pass from the reference at the
/// looser guess threshold collects a small determinant space; the dense
/// Hamiltonian over that space is diagonalized and the lowest nroot eigenpairs
/// become the starting sparse states, with the eigenvalues serving as the
/// reference energy constants E0 of the diagonal term.
/// # Arguments
///     `h`: Hamiltonian, coupling evaluator.
///     `reference`: Determinant, the distinguished starting configuration.
///     `params`: PropagationParams, guess threshold and root count.
pub fn initial_guess(h: &Hamiltonian, reference: &Determinant, params: &PropagationParams) -> Result<Guess, PiciError> {
    // Coarse expansion. The empty cache disables any screening, so the pass
    // enumerates every excitation class of the reference once.
    let cache = CouplingCache::new();
    let e_ref = h.diagonal(reference);
    if !e_ref.is_finite() {
        let s = reference.render(h.norb());
        return Err(PiciError::NonFiniteCoupling { bra: s.clone(), ket: s });
    }
    let pass = apply_tau_h(h, &cache, reference, 1.0, params.dt, params.guess_threshold, 0.0, e_ref, params);
    if let Some((bra, ket)) = pass.bad_pair {
        return Err(PiciError::NonFiniteCoupling { bra: bra.render(h.norb()), ket: ket.render(h.norb()) });
    }

    let mut space: BTreeSet<Determinant> = BTreeSet::new();
    space.insert(*reference);
    for (det, _) in &pass.contributions {
        space.insert(*det);
    }
    let dets: Vec<Determinant> = space.into_iter().collect();
    let n = dets.len();
    let iref = dets.iter().position(|d| d == reference).unwrap();

    // Dense Hamiltonian over the guess space.
    let mut hmat = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        hmat[(i, i)] = h.diagonal(&dets[i]);
        for j in i + 1..n {
            let hij = h.coupling(&dets[i], &dets[j]);
            hmat[(i, j)] = hij;
            hmat[(j, i)] = hij;
        }
    }

    // H U = U \epsilon, eigenvalues in ascending order.
    let (epsilon, u) = hmat.eigh(UPLO::Lower).unwrap();

    let nroot = if params.nroot > n {
        println!("Guess space of dimension {} cannot support {} roots. Clamping.", n, params.nroot);
        n
    } else {
        params.nroot
    };

    let mut states = Vec::with_capacity(nroot);
    let mut energies = Vec::with_capacity(nroot);
    for k in 0..nroot {
        // Fix the overall sign so the dominant coefficient is positive.
        let col = u.column(k);
        let imax = (0..n).max_by(|&a, &b| col[a].abs().partial_cmp(&col[b].abs()).unwrap()).unwrap();
        let sgn = if col[imax] >= 0.0 { 1.0 } else { -1.0 };

        let mut state = SparseState::new();
        for (i, det) in dets.iter().enumerate() {
            let c = sgn * col[i];
            if c.abs() >= params.spawning_threshold || i == iref {
                state.insert(*det, c);
            }
        }
        states.push(state);
        energies.push(epsilon[k]);
    }

    Ok(Guess { states, energies })
}
