// propagator.rs
use std::collections::HashMap;

use rayon::prelude::*;

use crate::determinant::Determinant;
use crate::error::PiciError;
use crate::hamiltonian::{CouplingCache, Hamiltonian};
use crate::spawning::apply_tau_h;
use crate::{IterationStats, PropagationParams, PropagatorOrder, SparseState};

// Result of one discretized time step.
pub struct StepOutcome {
    pub state: SparseState,
    pub stats: IterationStats,
    pub pt2: f64,
    pub pre_prune: usize,  // Merged state size before pruning.
    pub pruned: usize,     // Entries removed by pruning.
}

/// Sum the amplitude contributions of one partial map into an accumulator.
/// Plain summation is associative and commutative, so the merged result is
/// invariant under partitioning up to floating-point rounding.
pub fn merge_into(acc: &mut HashMap<Determinant, f64>, part: HashMap<Determinant, f64>) {
    for (det, dc) in part {
        *acc.entry(det).or_insert(0.0) += dc;
    }
}

// Per-worker accumulator for the parallel fan-out: partial delta map, counters,
// newly recorded coupling maxima, PT2 sum, first non-finite pair.
type ThreadState = (
    HashMap<Determinant, f64>,
    IterationStats,
    Vec<(Determinant, (f64, f64))>,
    f64,
    Option<(Determinant, Determinant)>,
);

/// Fan the Spawning Engine out over every (determinant, amplitude) pair of a
/// fixed input snapshot and merge the partial delta maps. Each worker folds an
/// independent batch to completion; the reduce is the single synchronization
/// point. The coupling cache is only read here; maxima recorded by the workers
/// travel in the partials for the caller to absorb after the barrier.
fn apply_parallel(
    state: &SparseState,
    h: &Hamiltonian,
    cache: &CouplingCache,
    tau: f64,
    shift: f64,
    energy0: f64,
    params: &PropagationParams,
) -> Result<(HashMap<Determinant, f64>, IterationStats, Vec<(Determinant, (f64, f64))>, f64), PiciError> {
    let entries = state.entries();

    let initialise = || -> ThreadState {
        (HashMap::new(), IterationStats::default(), Vec::new(), 0.0, None)
    };

    let spawn = |(mut deltas, mut stats, mut recorded, mut pt2, mut bad): ThreadState,
                 &(det, c): &(Determinant, f64)|
     -> ThreadState {
        // A detected numerical error aborts the whole step; no point spawning on.
        if bad.is_none() {
            let r = apply_tau_h(h, cache, &det, c, tau, params.spawning_threshold, shift, energy0, params);
            for (j, dc) in r.contributions {
                *deltas.entry(j).or_insert(0.0) += dc;
            }
            stats.merge(&r.stats);
            if let Some(rec) = r.recorded {
                recorded.push(rec);
            }
            pt2 += r.pt2;
            bad = r.bad_pair;
        }
        (deltas, stats, recorded, pt2, bad)
    };

    let merge = |mut a: ThreadState, b: ThreadState| -> ThreadState {
        merge_into(&mut a.0, b.0);
        a.1.merge(&b.1);
        a.2.extend(b.2);
        a.3 += b.3;
        a.4 = a.4.or(b.4);
        a
    };

    let (deltas, stats, recorded, pt2, bad) =
        entries.par_iter().fold(initialise, spawn).reduce(initialise, merge);

    if let Some((bra, ket)) = bad {
        let norb = h.norb();
        return Err(PiciError::NonFiniteCoupling { bra: bra.render(norb), ket: ket.render(norb) });
    }
    Ok((deltas, stats, recorded, pt2))
}

/// Propagate the sparse state by one time step of length tau.
///
/// Linear: one application of 1 - tau (H - E0 - S), i.e. the identity plus one
/// spawning fan-out merged per key.
///
/// Quadratic: explicit-midpoint composition. A half step builds an intermediate
/// state; the full-step fan-out is evaluated against that intermediate state
/// with freshly computed couplings and applied to the original state, leaving a
/// local truncation error one order smaller in tau.
///
/// Post-merge, entries below the spawning threshold are pruned; the reference
/// determinant is always retained.
/// # Arguments
///     `h`: Hamiltonian, coupling evaluator.
///     `cache`: CouplingCache, screening bounds; new entries are absorbed and
///              the global maxima rotated once per step.
///     `state`: SparseState, wavefunction at time n.
///     `params`: PropagationParams, threshold and screening configuration.
///     `tau`: f64, step length (may differ from params.dt under adaptation).
///     `shift`: f64, energy shift S.
///     `energy0`: f64, reference energy constant in the diagonal term.
///     `reference`: Determinant, never pruned.
///     `iter`: usize, iteration number for diagnostics.
pub fn propagate(
    h: &Hamiltonian,
    cache: &mut CouplingCache,
    state: &SparseState,
    params: &PropagationParams,
    tau: f64,
    shift: f64,
    energy0: f64,
    reference: &Determinant,
    iter: usize,
) -> Result<StepOutcome, PiciError> {
    let (deltas, stats, pt2) = match params.order {
        PropagatorOrder::Linear => {
            let (deltas, stats, recorded, pt2) =
                apply_parallel(state, h, cache, tau, shift, energy0, params)?;
            cache.absorb(recorded);
            (deltas, stats, pt2)
        }
        PropagatorOrder::Quadratic => {
            // Half step to the intermediate state.
            let (d1, s1, rec1, _) =
                apply_parallel(state, h, cache, 0.5 * tau, shift, energy0, params)?;
            cache.absorb(rec1);
            let mut mid = state.clone();
            for (j, dc) in d1 {
                mid.add(j, dc);
            }
            // Full step of recomputed couplings against the intermediate state.
            let (d2, mut s2, rec2, pt2) =
                apply_parallel(&mid, h, cache, tau, shift, energy0, params)?;
            cache.absorb(rec2);
            s2.merge(&s1);
            (d2, s2, pt2)
        }
    };

    let mut new = state.clone();
    for (j, dc) in deltas {
        new.add(j, dc);
    }
    if let Some(det) = new.non_finite() {
        return Err(PiciError::NonFiniteAmplitude { det: det.render(h.norb()), iter });
    }

    let pre_prune = new.len();
    let pruned = new.prune(params.spawning_threshold, reference);
    if new.is_empty()
        || (pre_prune > 1 && new.len() == 1 && new.get(reference).abs() < params.spawning_threshold)
    {
        return Err(PiciError::StateCollapsed { iter });
    }
    cache.rotate();

    Ok(StepOutcome { state: new, stats, pt2, pre_prune, pruned })
}

/// Damped logarithmic norm feedback, applied every shift_freq iterations:
/// S <- S - damping / (tau * freq) * ln(||C|| / ||C||_prev), with the log
/// growth accumulated over the update window.
pub fn update_shift(shift: f64, damping: f64, tau: f64, freq: usize, log_growth: f64) -> f64 {
    shift - damping / (tau * freq as f64) * log_growth
}

/// Steer the spawn acceptance ratio into a stable band by scaling tau within
/// the configured bounds: shrink when nearly every candidate is accepted (the
/// state is growing explosively), grow when almost none are.
pub fn update_time_step(tau: f64, acceptance: f64, params: &PropagationParams) -> f64 {
    if acceptance > 0.8 {
        (tau * 0.9).max(params.dt_min)
    } else if acceptance > 0.0 && acceptance < 0.2 {
        (tau * 1.05).min(params.dt_max)
    } else {
        tau
    }
}
