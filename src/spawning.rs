// spawning.rs
use crate::determinant::{Determinant, Spin};
use crate::hamiltonian::{CouplingCache, Hamiltonian};
use crate::{IterationStats, PropagationParams};

// Result of applying -tau (H - E0 - S) to one determinant.
pub struct SpawnResult {
    // Amplitude contributions keyed by destination, the diagonal delta included.
    pub contributions: Vec<(Determinant, f64)>,
    pub stats: IterationStats,
    // Per-determinant coupling maxima recorded by a full enumeration, to be
    // merged into the cache after the parallel barrier.
    pub recorded: Option<(Determinant, (f64, f64))>,
    // Second-order correction accumulated from threshold-rejected spawns.
    pub pt2: f64,
    // First non-finite coupling encountered, surfaced as a fatal error.
    pub bad_pair: Option<(Determinant, Determinant)>,
}

/// Decide whether a whole excitation class from a determinant can be skipped:
/// no candidate can pass the threshold when even the maximum coupling magnitude
/// satisfies |tau * bound * C_I| < threshold / tolerance_factor.
fn class_screened(tau: f64, bound: f64, c: f64, threshold: f64, factor: f64) -> bool {
    bound > 0.0 && (tau * bound * c).abs() < threshold / factor
}

/// Apply one spawning pass -tau (H - E0 - S) for a single source determinant
/// with amplitude c. Emits the diagonal delta -tau (H_II - E0 - S) C_I on the
/// source key, then enumerates single and double excitations, accepting each
/// candidate contribution dC = -tau H_JI C_I iff |dC| >= threshold. Classes
/// whose cached coupling bound cannot reach the threshold are skipped outright
/// when prescreening is enabled. The identity part of the propagator is
/// composed by the caller, so the same engine serves both sub-steps of the
/// second-order scheme.
/// # Arguments
///     `h`: Hamiltonian, coupling evaluator over the fixed integral set.
///     `cache`: CouplingCache, read-shared screening bounds.
///     `det`: Determinant, source configuration I.
///     `c`: f64, current amplitude C_I.
///     `tau`: f64, time step.
///     `threshold`: f64, spawning threshold.
///     `shift`: f64, energy shift S subtracted from the diagonal.
///     `energy0`: f64, reference energy constant in the diagonal term.
///     `params`: PropagationParams, screening flags and tolerance factor.
pub fn apply_tau_h(
    h: &Hamiltonian,
    cache: &CouplingCache,
    det: &Determinant,
    c: f64,
    tau: f64,
    threshold: f64,
    shift: f64,
    energy0: f64,
    params: &PropagationParams,
) -> SpawnResult {
    let mut out = SpawnResult {
        contributions: Vec::new(),
        stats: IterationStats { visited: 1, ..Default::default() },
        recorded: None,
        pt2: 0.0,
        bad_pair: None,
    };

    // Diagonal: -tau (H_II - E0 - S) C_I.
    let hii = h.diagonal(det);
    if !hii.is_finite() {
        out.bad_pair = Some((*det, *det));
        return out;
    }
    out.contributions.push((*det, -tau * (hii - energy0 - shift) * c));

    // Screening bounds: per-determinant when dynamic prescreening has seen this
    // determinant before, the global observed maxima otherwise.
    let (bound_single, bound_double) = if params.dynamic_prescreen {
        cache.get(det).unwrap_or(cache.global_max())
    } else {
        cache.global_max()
    };
    let skip_singles = params.prescreen
        && class_screened(tau, bound_single, c, threshold, params.prescreen_factor);
    let skip_doubles = params.prescreen
        && class_screened(tau, bound_double, c, threshold, params.prescreen_factor);

    let norb = h.norb();
    let mut max_single = 0.0f64;
    let mut max_double = 0.0f64;
    let mut naccepted = 0usize;

    // Accept or reject one candidate contribution.
    let mut emit = |hji: f64, j: Determinant, out: &mut SpawnResult| {
        if !hji.is_finite() {
            out.bad_pair = Some((*det, j));
            return;
        }
        let dc = -tau * hji * c;
        if dc.abs() >= threshold {
            out.contributions.push((j, dc));
            out.stats.spawned += 1;
            naccepted += 1;
        } else {
            out.stats.zero_spawned += 1;
            // Epstein-Nesbet-like correction from the rejected configuration.
            let hjj = h.diagonal(&j);
            let den = energy0 - hjj;
            if den.abs() > f64::EPSILON {
                out.pt2 += (hji * c) * (hji * c) / den;
            }
        }
    };

    if skip_singles {
        out.stats.screened_singles += 1;
    } else {
        for spin in [Spin::Alpha, Spin::Beta] {
            for &i in &det.occ(spin) {
                for &a in &det.virt(spin, norb) {
                    let hji = h.slater_single(det, spin, i, a);
                    max_single = max_single.max(hji.abs());
                    if out.bad_pair.is_some() {
                        return out;
                    }
                    let (j, _) = det.single(spin, i, a);
                    emit(hji, j, &mut out);
                }
            }
        }
    }

    if skip_doubles {
        out.stats.screened_doubles += 1;
    } else {
        // Same-spin doubles: i < j over occupied, a < b over virtual.
        for spin in [Spin::Alpha, Spin::Beta] {
            let occ = det.occ(spin);
            let virt = det.virt(spin, norb);
            for (n, &i) in occ.iter().enumerate() {
                for &j in &occ[n + 1..] {
                    for (m, &a) in virt.iter().enumerate() {
                        for &b in &virt[m + 1..] {
                            let hji = h.slater_double_same(det, spin, i, j, a, b);
                            max_double = max_double.max(hji.abs());
                            if out.bad_pair.is_some() {
                                return out;
                            }
                            let (dst, _) = det.double_same(spin, i, j, a, b);
                            emit(hji, dst, &mut out);
                        }
                    }
                }
            }
        }
        // Opposite-spin doubles.
        let occ_a = det.occ(Spin::Alpha);
        let virt_a = det.virt(Spin::Alpha, norb);
        let occ_b = det.occ(Spin::Beta);
        let virt_b = det.virt(Spin::Beta, norb);
        for &i in &occ_a {
            for &a in &virt_a {
                for &j in &occ_b {
                    for &b in &virt_b {
                        let hji = h.slater_double_cross(det, i, a, j, b);
                        max_double = max_double.max(hji.abs());
                        if out.bad_pair.is_some() {
                            return out;
                        }
                        let (dst, _) = det.double_cross(i, a, j, b);
                        emit(hji, dst, &mut out);
                    }
                }
            }
        }
    }

    if naccepted > 0 {
        out.stats.accepted = 1;
    }
    // A full enumeration of both classes yields a valid per-determinant bound.
    if !skip_singles && !skip_doubles {
        out.recorded = Some((*det, (max_single, max_double)));
    }
    out
}
