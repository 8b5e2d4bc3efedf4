// hamiltonian.rs
use std::collections::HashMap;

use crate::determinant::{Determinant, Spin};
use crate::MoData;

/// Coupling evaluator: Hamiltonian matrix elements between determinants via the
/// Slater-Condon rules over a fixed MO integral set. The Hamiltonian is at most
/// two-body, so couplings vanish identically above excitation rank 2. All
/// evaluations are pure lookups plus the anticommutation sign; no side effects.
pub struct Hamiltonian {
    pub mo: MoData,
}

impl Hamiltonian {
    pub fn new(mo: MoData) -> Self {
        Self { mo }
    }

    pub fn norb(&self) -> usize {
        self.mo.norb
    }

    fn h1(&self, p: usize, q: usize) -> f64 {
        self.mo.h1[(p, q)]
    }

    /// Two-electron integral (pq|rs) in chemists' notation.
    fn eri(&self, p: usize, q: usize, r: usize, s: usize) -> f64 {
        self.mo.eri[(p, q, r, s)]
    }

    /// Diagonal element <I|H|I>: nuclear repulsion, occupied one-body energies,
    /// and pairwise Coulomb/exchange two-body terms.
    pub fn diagonal(&self, det: &Determinant) -> f64 {
        let oa = det.occ(Spin::Alpha);
        let ob = det.occ(Spin::Beta);
        let mut e = self.mo.enuc;
        for &p in &oa {
            e += self.h1(p, p);
        }
        for &p in &ob {
            e += self.h1(p, p);
        }
        // Same-spin pairs: Coulomb minus exchange.
        for (n, &p) in oa.iter().enumerate() {
            for &q in &oa[n + 1..] {
                e += self.eri(p, p, q, q) - self.eri(p, q, q, p);
            }
        }
        for (n, &p) in ob.iter().enumerate() {
            for &q in &ob[n + 1..] {
                e += self.eri(p, p, q, q) - self.eri(p, q, q, p);
            }
        }
        // Opposite-spin pairs: Coulomb only.
        for &p in &oa {
            for &q in &ob {
                e += self.eri(p, p, q, q);
            }
        }
        e
    }

    /// Signed element <J|H|I> for the single excitation i -> a in one spin
    /// channel of I: the one-body integral plus the mean field of the other
    /// occupied orbitals.
    pub fn slater_single(&self, det: &Determinant, spin: Spin, i: usize, a: usize) -> f64 {
        let (_, sign) = det.single(spin, i, a);
        let mut x = self.h1(i, a);
        for &j in &det.occ(spin) {
            if j == i {
                continue;
            }
            x += self.eri(i, a, j, j) - self.eri(i, j, j, a);
        }
        for &j in &det.occ(spin.other()) {
            x += self.eri(i, a, j, j);
        }
        sign * x
    }

    /// Signed element for the same-spin double excitation (i, j) -> (a, b) of I.
    pub fn slater_double_same(&self, det: &Determinant, spin: Spin, i: usize, j: usize, a: usize, b: usize) -> f64 {
        let (_, sign) = det.double_same(spin, i, j, a, b);
        sign * (self.eri(i, a, j, b) - self.eri(i, b, j, a))
    }

    /// Signed element for the opposite-spin double excitation i -> a (alpha),
    /// j -> b (beta) of I.
    pub fn slater_double_cross(&self, det: &Determinant, i: usize, a: usize, j: usize, b: usize) -> f64 {
        let (_, sign) = det.double_cross(i, a, j, b);
        sign * self.eri(i, a, j, b)
    }

    /// General matrix element <J|H|I>: classify the excitation rank per spin
    /// channel and dispatch; exactly 0 above rank 2.
    pub fn coupling(&self, ket: &Determinant, bra: &Determinant) -> f64 {
        let (da, db) = ket.excitation_degree(bra);
        match (da, db) {
            (0, 0) => self.diagonal(ket),
            (1, 0) | (0, 1) => {
                let spin = if da == 1 { Spin::Alpha } else { Spin::Beta };
                let i = ket.holes(bra, spin)[0];
                let a = bra.holes(ket, spin)[0];
                self.slater_single(ket, spin, i, a)
            }
            (2, 0) | (0, 2) => {
                let spin = if da == 2 { Spin::Alpha } else { Spin::Beta };
                let h = ket.holes(bra, spin);
                let p = bra.holes(ket, spin);
                self.slater_double_same(ket, spin, h[0], h[1], p[0], p[1])
            }
            (1, 1) => {
                let i = ket.holes(bra, Spin::Alpha)[0];
                let a = bra.holes(ket, Spin::Alpha)[0];
                let j = ket.holes(bra, Spin::Beta)[0];
                let b = bra.holes(ket, Spin::Beta)[0];
                self.slater_double_cross(ket, i, a, j, b)
            }
            _ => 0.0,
        }
    }
}

/// Per-determinant cache of the maximum single- and double-excitation coupling
/// magnitudes, plus global observed maxima rotated once per iteration. Used
/// exclusively to prescreen: a whole excitation class from a determinant is
/// skipped when tau * bound * |C_I| cannot reach the spawning threshold. The
/// bounds are observed maxima from prior full enumerations, so prescreening is
/// a tunable heuristic rather than a proven bound; entries stay valid for the
/// lifetime of one integral set. Read-shared in the parallel region; new
/// entries are merged single-threaded after the barrier (the computation is
/// idempotent and pure, so first-writer-wins is safe).
pub struct CouplingCache {
    entries: HashMap<Determinant, (f64, f64)>,
    // Global maxima: `old` (previous iterations) screens, `new` accumulates.
    old_max: (f64, f64),
    new_max: (f64, f64),
}

impl CouplingCache {
    pub fn new() -> Self {
        Self { entries: HashMap::new(), old_max: (0.0, 0.0), new_max: (0.0, 0.0) }
    }

    /// The cached per-determinant bounds, if this determinant has been fully
    /// enumerated before.
    pub fn get(&self, det: &Determinant) -> Option<(f64, f64)> {
        self.entries.get(det).copied()
    }

    /// Global (max |single|, max |double|) couplings observed in previous
    /// iterations; (0, 0) until the first full enumeration.
    pub fn global_max(&self) -> (f64, f64) {
        self.old_max
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge per-determinant maxima recorded by the workers of one step, and
    /// fold them into the accumulating global maxima.
    pub fn absorb(&mut self, recorded: Vec<(Determinant, (f64, f64))>) {
        for (det, (m1, m2)) in recorded {
            self.new_max.0 = self.new_max.0.max(m1);
            self.new_max.1 = self.new_max.1.max(m2);
            self.entries.entry(det).or_insert((m1, m2));
        }
    }

    /// Rotate the global maxima at the end of an iteration: what was observed
    /// becomes the screening bound of the next step. Maxima only grow, so a
    /// fully screened iteration cannot erase the bound.
    pub fn rotate(&mut self) {
        self.old_max.0 = self.old_max.0.max(self.new_max.0);
        self.old_max.1 = self.old_max.1.max(self.new_max.1);
        self.new_max = (0.0, 0.0);
    }
}

impl Default for CouplingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Array4;
    use ndarray::Array2;

    /// Two-orbital, one-alpha-electron system: H restricted to the two
    /// single-electron determinants is exactly [[0, 0.1], [0.1, 1.0]].
    fn two_level() -> Hamiltonian {
        let mut h1 = Array2::<f64>::zeros((2, 2));
        h1[(0, 1)] = 0.1;
        h1[(1, 0)] = 0.1;
        h1[(1, 1)] = 1.0;
        let eri = Array4::zeros((2, 2, 2, 2));
        Hamiltonian::new(MoData { h1, eri, enuc: 0.0, norb: 2, nelec: (1, 0) })
    }

    #[test]
    fn two_level_matrix_elements() {
        let h = two_level();
        let d0 = Determinant::from_orbs(&[0], &[]);
        let d1 = Determinant::from_orbs(&[1], &[]);
        assert_eq!(h.diagonal(&d0), 0.0);
        assert_eq!(h.diagonal(&d1), 1.0);
        assert_eq!(h.coupling(&d0, &d1), 0.1);
        assert_eq!(h.coupling(&d1, &d0), 0.1);
    }

    #[test]
    fn coupling_vanishes_above_rank_two() {
        let h = two_level();
        // Three substitutions across the channels.
        let i = Determinant::from_orbs(&[0, 1], &[0]);
        let j = Determinant::from_orbs(&[2, 3], &[1]);
        assert_eq!(h.coupling(&i, &j), 0.0);
    }

    #[test]
    fn diagonal_includes_pair_terms() {
        // Two alpha electrons with a Coulomb/exchange pair.
        let mut h1 = Array2::<f64>::zeros((2, 2));
        h1[(0, 0)] = -1.0;
        h1[(1, 1)] = -0.5;
        let mut eri = Array4::zeros((2, 2, 2, 2));
        eri[(0, 0, 1, 1)] = 0.6; // (00|11)
        eri[(0, 1, 1, 0)] = 0.2; // (01|10)
        let h = Hamiltonian::new(MoData { h1, eri, enuc: 0.3, norb: 2, nelec: (2, 0) });
        let d = Determinant::from_orbs(&[0, 1], &[]);
        // enuc + h00 + h11 + (00|11) - (01|10)
        assert!((h.diagonal(&d) - (0.3 - 1.0 - 0.5 + 0.6 - 0.2)).abs() < 1e-14);
    }

    #[test]
    fn coupling_is_symmetric_for_real_integrals() {
        let mut h1 = Array2::<f64>::zeros((4, 4));
        let mut eri = Array4::zeros((4, 4, 4, 4));
        // An arbitrary symmetric integral set.
        for p in 0..4 {
            for q in 0..4 {
                let v = 0.05 * ((p * 4 + q) as f64).sin();
                h1[(p, q)] = v + if p == q { -1.0 + 0.2 * p as f64 } else { 0.0 };
                h1[(q, p)] = h1[(p, q)];
            }
        }
        for p in 0..4 {
            for q in 0..4 {
                for r in 0..4 {
                    for s in 0..4 {
                        let v = 0.01 * ((p + 2 * q + 3 * r + 5 * s) as f64).cos();
                        eri[(p, q, r, s)] = v;
                    }
                }
            }
        }
        // Symmetrize over the 8-fold permutational symmetry of real integrals.
        let base = eri.clone();
        for p in 0..4 {
            for q in 0..4 {
                for r in 0..4 {
                    for s in 0..4 {
                        let v = (base[(p, q, r, s)]
                            + base[(q, p, r, s)]
                            + base[(p, q, s, r)]
                            + base[(q, p, s, r)]
                            + base[(r, s, p, q)]
                            + base[(s, r, p, q)]
                            + base[(r, s, q, p)]
                            + base[(s, r, q, p)])
                            / 8.0;
                        eri[(p, q, r, s)] = v;
                    }
                }
            }
        }
        let h = Hamiltonian::new(MoData { h1, eri, enuc: 0.0, norb: 4, nelec: (2, 2) });
        let d = Determinant::aufbau(2, 2);
        let (s1, _) = d.single(Spin::Alpha, 1, 2);
        let (d2, _) = d.double_same(Spin::Alpha, 0, 1, 2, 3);
        let (d3, _) = d.double_cross(1, 3, 0, 2);
        for j in [s1, d2, d3] {
            let hij = h.coupling(&d, &j);
            let hji = h.coupling(&j, &d);
            assert!(
                (hij - hji).abs() < 1e-12,
                "coupling not symmetric: {hij} vs {hji}"
            );
        }
    }

    #[test]
    fn cache_absorbs_first_writer_and_rotates() {
        let mut cache = CouplingCache::new();
        let d = Determinant::aufbau(1, 0);
        cache.absorb(vec![(d, (0.5, 0.2)), (d, (0.9, 0.9))]);
        // First writer wins; later recordings of the same determinant are the
        // same pure computation and are ignored.
        assert_eq!(cache.get(&d), Some((0.5, 0.2)));
        assert_eq!(cache.global_max(), (0.0, 0.0));
        cache.rotate();
        assert_eq!(cache.global_max(), (0.9, 0.9));
        cache.rotate();
        assert_eq!(cache.global_max(), (0.9, 0.9));
    }
}
