// driver.rs
use crate::determinant::Determinant;
use crate::energy::{estimate_energy, projected_energy, variational_energy};
use crate::error::PiciError;
use crate::guess::initial_guess;
use crate::hamiltonian::{CouplingCache, Hamiltonian};
use crate::propagator::{propagate, update_shift, update_time_step};
use crate::{IterationStats, PropagationParams, SparseState};

// Storage for the outcome of propagating one root.
pub struct RootResult {
    pub root: usize,
    pub energy: f64,               // Final projected energy estimate.
    pub variational: Option<f64>,  // Final variational estimate when enabled.
    pub pt2: f64,                  // Perturbative correction from the final step.
    pub converged: bool,
    pub iterations: usize,
    pub state: SparseState,
}

/// The determinant carrying the largest amplitude: the projection target of the
/// energy estimator for this state.
fn dominant(state: &SparseState) -> Determinant {
    *state
        .iter()
        .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
        .map(|(d, _)| d)
        .unwrap()
}

/// Run the full calculation: validate parameters, build the initial guess, then
/// propagate each requested root to convergence or the iteration budget.
/// Non-convergence is reported with a warning, never as an error.
/// # Arguments
///     `h`: Hamiltonian, coupling evaluator over the fixed integral set.
///     `reference`: Determinant, the distinguished reference configuration.
///     `params`: PropagationParams, the full propagation configuration.
///     `verbose`: bool, print per-iteration convergence tables.
pub fn run(
    h: &Hamiltonian,
    reference: &Determinant,
    params: &PropagationParams,
    verbose: bool,
) -> Result<Vec<RootResult>, PiciError> {
    params.validate()?;
    let guess = initial_guess(h, reference, params)?;
    let nroot = guess.energies.len();

    let mut results: Vec<RootResult> = Vec::with_capacity(nroot);
    for root in 0..nroot {
        let r = propagate_root(
            h,
            reference,
            params,
            root,
            guess.states[root].clone(),
            guess.energies[root],
            &results,
            verbose,
        )?;
        results.push(r);
    }
    Ok(results)
}

/// Propagate one root in imaginary time until the projected energy estimate is
/// converged. Roots beyond the first are deflated against the converged lower
/// roots once per iteration so the propagation cannot relax into them.
#[allow(clippy::too_many_arguments)]
fn propagate_root(
    h: &Hamiltonian,
    reference: &Determinant,
    params: &PropagationParams,
    root: usize,
    mut state: SparseState,
    energy0: f64,
    lower: &[RootResult],
    verbose: bool,
) -> Result<RootResult, PiciError> {
    let mut cache = CouplingCache::new();
    let mut tau = params.dt;
    let mut shift = 0.0;
    let mut energy = energy0;
    let mut e_prev = energy0;
    let mut variational = None;
    let mut pt2 = 0.0;
    let mut converged = false;
    let mut iterations = 0;

    // Log of the pre-normalization norm growth, accumulated over one shift
    // update window.
    let mut log_growth = 0.0;
    // Spawn statistics accumulated over one time-step adaptation window.
    let mut window = IterationStats::default();

    if verbose {
        println!("{}", "=".repeat(100));
        println!("Root {}: guess energy = {:.12}, guess size = {}", root, energy0, state.len());
        println!("{:<6} {:>18} {:>12} {:>8} {:>10} {:>10} {:>12} {:>10}",
                 "iter", "E", "|dE|", "ndets", "||C||_1", "tau", "shift", "spawned");
    }

    for it in 0..params.max_steps {
        iterations = it + 1;

        if !lower.is_empty() {
            for r in lower {
                state.project_out(&r.state);
            }
        }

        let out = propagate(h, &mut cache, &state, params, tau, shift, energy0, reference, it)?;
        state = out.state;
        pt2 = out.pt2;

        // Renormalize; the growth factor feeds the shift update.
        let norm = state.norm2();
        log_growth += norm.ln();
        state.scale(1.0 / norm);

        window.merge(&out.stats);

        let estimate_now = (it + 1) % params.estimate_freq == 0 || it + 1 == params.max_steps;
        if estimate_now {
            let target = dominant(&state);
            energy = projected_energy(h, &state, &target);
            if !energy.is_finite() {
                return Err(PiciError::NonFiniteAmplitude { det: target.render(h.norb()), iter: it });
            }
            let de = (energy - e_prev).abs();
            if params.variational && (it + 1) % params.variational_freq == 0 {
                let ev = variational_energy(h, &state);
                if verbose {
                    println!("{:<6} {:>18.12} (variational)", "", ev);
                }
                variational = Some(ev);
            }
            if verbose {
                println!("{:<6} {:>18.12} {:>12.3e} {:>8} {:>10.6} {:>10.6} {:>12.6} {:>10}",
                         it + 1, energy, de, state.len(), state.norm1(), tau, shift, out.stats.spawned);
            }
            if de < params.e_tol {
                converged = true;
                break;
            }
            e_prev = energy;
        }

        if params.do_shift && (it + 1) % params.shift_freq == 0 {
            shift = update_shift(shift, params.shift_damping, tau, params.shift_freq, log_growth);
            log_growth = 0.0;
        }
        if params.adaptive_dt && (it + 1) % params.adapt_freq == 0 {
            tau = update_time_step(tau, window.acceptance(), params);
            window = IterationStats::default();
        }
    }

    // Final labeled estimates over the state as propagated.
    let estimates = estimate_energy(h, &state, &dominant(&state), params.variational);
    energy = estimates["projected"];
    if params.variational {
        variational = estimates.get("variational").copied();
    }
    if !converged {
        println!(
            "Warning: root {} not converged in {} iterations (|dE| tolerance {:.3e}). Returning the best estimate.",
            root, iterations, params.e_tol
        );
    }

    Ok(RootResult { root, energy, variational, pt2, converged, iterations, state })
}
