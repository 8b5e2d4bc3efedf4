//! Integration tests: adaptive sparse propagation end-to-end.
//!
//! These tests exercise the public API across module boundaries: spawning
//! through the propagator into the energy estimators and the driver, on small
//! Hamiltonians whose spectra are known in closed form.

use ndarray::Array2;

use pici_rs::determinant::Determinant;
use pici_rs::driver::run;
use pici_rs::energy::projected_energy;
use pici_rs::hamiltonian::{CouplingCache, Hamiltonian};
use pici_rs::propagator::propagate;
use pici_rs::{Array4, MoData, PropagationParams, PropagatorOrder, SparseState};

/// Two-orbital, one-alpha-electron system whose determinant-space Hamiltonian
/// is exactly [[0, 0.1], [0.1, 1.0]].
fn two_level() -> Hamiltonian {
    let mut h1 = Array2::<f64>::zeros((2, 2));
    h1[(0, 1)] = 0.1;
    h1[(1, 0)] = 0.1;
    h1[(1, 1)] = 1.0;
    Hamiltonian::new(MoData {
        h1,
        eri: Array4::zeros((2, 2, 2, 2)),
        enuc: 0.0,
        norb: 2,
        nelec: (1, 0),
    })
}

/// Four orbitals, two alpha and two beta electrons, with a symmetric synthetic
/// integral set: 36 determinants, large enough for screening and the
/// variational estimator to do real work.
fn four_orbital() -> Hamiltonian {
    let n = 4;
    let mut h1 = Array2::<f64>::zeros((n, n));
    for p in 0..n {
        for q in p..n {
            let v = if p == q {
                -2.0 + 0.5 * p as f64
            } else {
                0.08 / (1.0 + (p as f64 - q as f64).abs())
            };
            h1[(p, q)] = v;
            h1[(q, p)] = v;
        }
    }
    let mut eri = Array4::zeros((n, n, n, n));
    for p in 0..n {
        for q in 0..n {
            for r in 0..n {
                for s in 0..n {
                    eri[(p, q, r, s)] = 0.02 * ((p + 2 * q + 3 * r + 5 * s) as f64).cos();
                }
            }
        }
    }
    // Expand the 8-fold permutational symmetry of real two-electron integrals.
    let base = eri.clone();
    for p in 0..n {
        for q in 0..n {
            for r in 0..n {
                for s in 0..n {
                    eri[(p, q, r, s)] = (base[(p, q, r, s)]
                        + base[(q, p, r, s)]
                        + base[(p, q, s, r)]
                        + base[(q, p, s, r)]
                        + base[(r, s, p, q)]
                        + base[(s, r, p, q)]
                        + base[(r, s, q, p)]
                        + base[(s, r, q, p)])
                        / 8.0;
                }
            }
        }
    }
    Hamiltonian::new(MoData { h1, eri, enuc: 1.2, norb: n, nelec: (2, 2) })
}

fn engine_params(order: PropagatorOrder) -> PropagationParams {
    PropagationParams {
        order,
        spawning_threshold: 1e-12,
        guess_threshold: 1e-10,
        prescreen: false,
        dynamic_prescreen: false,
        ..Default::default()
    }
}

/// Projected energy of the exact imaginary-time flow e^{-tH} |0> of the
/// two-level system at time t: the analytic target the discrete schemes
/// approximate.
fn exact_flow_energy(t: f64) -> f64 {
    let d = (1.0f64 + 0.04).sqrt();
    let lm = (1.0 - d) / 2.0;
    let lp = (1.0 + d) / 2.0;
    // [1, 0] = alpha [0.1, lm] + beta [0.1, lp].
    let alpha = 10.0 * lp / d;
    let beta = -10.0 * lm / d;
    let cm = alpha * (-t * lm).exp();
    let cp = beta * (-t * lp).exp();
    let c0 = 0.1 * (cm + cp);
    let c1 = cm * lm + cp * lp;
    0.1 * c1 / c0
}

/// Run k fixed steps of the chosen scheme and return the projected energy.
fn discrete_flow_energy(order: PropagatorOrder, tau: f64, k: usize) -> f64 {
    let h = two_level();
    let d0 = Determinant::from_orbs(&[0], &[]);
    let params = engine_params(order);
    let mut cache = CouplingCache::new();
    let mut state = SparseState::single(d0, 1.0);
    for it in 0..k {
        let out = propagate(&h, &mut cache, &state, &params, tau, 0.0, 0.0, &d0, it).unwrap();
        state = out.state;
        // The projected energy is scale invariant, so normalization is free.
        let n = state.norm2();
        state.scale(1.0 / n);
    }
    projected_energy(&h, &state, &d0)
}

#[test]
fn first_order_step_reproduces_the_reference_scenario() {
    let h = two_level();
    let d0 = Determinant::from_orbs(&[0], &[]);
    let d1 = Determinant::from_orbs(&[1], &[]);
    let state = SparseState::single(d0, 1.0);
    let mut cache = CouplingCache::new();
    let params = PropagationParams {
        spawning_threshold: 1e-8,
        prescreen: false,
        dynamic_prescreen: false,
        ..Default::default()
    };
    let out = propagate(&h, &mut cache, &state, &params, 0.01, 0.0, 0.0, &d0, 0).unwrap();
    assert!((out.state.get(&d0) - 1.0).abs() < 1e-15);
    assert!((out.state.get(&d1) - (-0.001)).abs() < 1e-15);
    let e = projected_energy(&h, &out.state, &d0);
    assert!((e - (-1.0e-4)).abs() < 1e-16, "projected energy {e}");
}

#[test]
fn second_order_tracks_the_exact_flow_more_closely() {
    let tau = 0.05;
    let k = 10;
    let e_exact = exact_flow_energy(tau * k as f64);
    let e_lin = discrete_flow_energy(PropagatorOrder::Linear, tau, k);
    let e_quad = discrete_flow_energy(PropagatorOrder::Quadratic, tau, k);
    let err_lin = (e_lin - e_exact).abs();
    let err_quad = (e_quad - e_exact).abs();
    assert!(
        err_quad < 0.5 * err_lin,
        "second order ({err_quad:.3e}) should beat first order ({err_lin:.3e})"
    );
}

#[test]
fn both_orders_converge_to_the_same_eigenvalue() {
    let h = two_level();
    let reference = Determinant::from_orbs(&[0], &[]);
    let e_exact = (1.0 - (1.0f64 + 0.04).sqrt()) / 2.0;
    for order in [PropagatorOrder::Linear, PropagatorOrder::Quadratic] {
        let params = PropagationParams {
            dt: 0.05,
            spawning_threshold: 1e-12,
            guess_threshold: 0.5, // bare-reference guess: the propagation does the work
            e_tol: 1e-13,
            max_steps: 20000,
            order,
            prescreen: false,
            ..Default::default()
        };
        let results = run(&h, &reference, &params, false).unwrap();
        assert!(results[0].converged, "{order:?} did not converge");
        assert!(
            (results[0].energy - e_exact).abs() < 1e-8,
            "{order:?}: {} vs {e_exact}",
            results[0].energy
        );
    }
}

#[test]
fn prescreening_does_not_change_the_converged_energy() {
    let h = four_orbital();
    let reference = Determinant::aufbau(2, 2);
    let base = PropagationParams {
        dt: 0.02,
        spawning_threshold: 1e-7,
        guess_threshold: 1e-4,
        e_tol: 1e-11,
        max_steps: 50000,
        ..Default::default()
    };
    let unscreened = PropagationParams { prescreen: false, dynamic_prescreen: false, ..base.clone() };
    let screened = PropagationParams { prescreen: true, dynamic_prescreen: true, prescreen_factor: 1.5, ..base };
    let r_un = run(&h, &reference, &unscreened, false).unwrap();
    let r_sc = run(&h, &reference, &screened, false).unwrap();
    assert!(r_un[0].converged && r_sc[0].converged);
    assert!(
        (r_un[0].energy - r_sc[0].energy).abs() < 1e-9,
        "screened {} vs unscreened {}",
        r_sc[0].energy,
        r_un[0].energy
    );
}

#[test]
fn variational_estimate_agrees_at_convergence() {
    let h = four_orbital();
    let reference = Determinant::aufbau(2, 2);
    let params = PropagationParams {
        dt: 0.02,
        spawning_threshold: 1e-8,
        guess_threshold: 1e-5,
        e_tol: 1e-11,
        max_steps: 50000,
        variational: true,
        variational_freq: 100,
        ..Default::default()
    };
    let results = run(&h, &reference, &params, false).unwrap();
    let r = &results[0];
    assert!(r.converged);
    let ev = r.variational.expect("variational estimate requested");
    // With a tight spawning threshold the retained space is near complete and
    // the two estimators must agree closely; the variational value lies above
    // the true ground state by construction.
    assert!(
        (ev - r.energy).abs() < 1e-5,
        "variational {ev} vs projected {}",
        r.energy
    );
}

#[test]
fn perturbative_correction_vanishes_with_a_tight_threshold() {
    let h = four_orbital();
    let reference = Determinant::aufbau(2, 2);
    let loose = PropagationParams {
        dt: 0.02,
        spawning_threshold: 1e-4,
        guess_threshold: 1e-4,
        e_tol: 1e-10,
        max_steps: 20000,
        ..Default::default()
    };
    let tight = PropagationParams { spawning_threshold: 1e-9, guess_threshold: 1e-9, ..loose.clone() };
    let r_loose = run(&h, &reference, &loose, false).unwrap();
    let r_tight = run(&h, &reference, &tight, false).unwrap();
    // Rejected spawns feed the correction: loosening the threshold rejects
    // more, tightening it starves the correction toward zero.
    assert!(
        r_tight[0].pt2.abs() < r_loose[0].pt2.abs() + 1e-8,
        "tight pt2 {} should not exceed loose pt2 {}",
        r_tight[0].pt2,
        r_loose[0].pt2
    );
    assert!(r_tight[0].pt2.abs() < 1e-8, "tight-threshold pt2 {}", r_tight[0].pt2);
}
