// lib.rs
pub mod determinant;
pub mod driver;
pub mod energy;
pub mod error;
pub mod guess;
pub mod hamiltonian;
pub mod input;
pub mod propagator;
pub mod read;
pub mod spawning;
pub mod write;

use std::collections::BTreeMap;

use ndarray::Array2;
pub type Array4 = ndarray::Array<f64, ndarray::Ix4>; // 4D array for the two-electron integrals

use crate::determinant::Determinant;
use crate::error::PiciError;

// Storage for MO integrals.
pub struct MoData {
    pub h1: Array2<f64>,        // One-electron MO integrals h_{pq}.
    pub eri: Array4,            // Two-electron MO integrals (pq|rs), chemists' notation.
    pub enuc: f64,              // Nuclear repulsion energy.
    pub norb: usize,            // Number of spatial orbitals.
    pub nelec: (usize, usize),  // Number of spin alpha and spin beta electrons.
}

// Choice of propagator order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PropagatorOrder {
    Linear,
    Quadratic,
}

// Storage for iteration-scoped propagation parameters. Passed explicitly into the
// driver and propagator, never ambient state.
#[derive(Clone, Debug)]
pub struct PropagationParams {
    pub dt: f64,                   // Imaginary time step tau.
    pub spawning_threshold: f64,   // Accept/reject boundary for spawned contributions.
    pub guess_threshold: f64,      // Looser threshold used by the initial-guess expansion.
    pub order: PropagatorOrder,
    pub nroot: usize,
    pub max_steps: usize,
    pub e_tol: f64,                // Energy convergence tolerance.
    pub estimate_freq: usize,      // Projected energy every n iterations.
    pub variational: bool,
    pub variational_freq: usize,   // Variational energy every n iterations when enabled.
    pub prescreen: bool,
    pub prescreen_factor: f64,     // Tolerance factor applied to the screening bound.
    pub dynamic_prescreen: bool,   // Per-determinant coupling bounds rather than global ones.
    pub do_shift: bool,
    pub shift_damping: f64,
    pub shift_freq: usize,         // Shift update every n iterations.
    pub adaptive_dt: bool,
    pub adapt_freq: usize,         // Time-step adaptation every n iterations.
    pub dt_min: f64,
    pub dt_max: f64,
}

impl Default for PropagationParams {
    fn default() -> Self {
        Self {
            dt: 0.01,
            spawning_threshold: 1e-6,
            guess_threshold: 1e-3,
            order: PropagatorOrder::Linear,
            nroot: 1,
            max_steps: 10000,
            e_tol: 1e-10,
            estimate_freq: 1,
            variational: false,
            variational_freq: 25,
            prescreen: true,
            prescreen_factor: 1.5,
            dynamic_prescreen: true,
            do_shift: false,
            shift_damping: 0.1,
            shift_freq: 10,
            adaptive_dt: false,
            adapt_freq: 50,
            dt_min: 1e-4,
            dt_max: 0.1,
        }
    }
}

impl PropagationParams {
    /// Check the parameter set for inconsistencies before propagation begins.
    /// Catches misconfigurations that would otherwise surface as divergence or a
    /// collapsed sparse state many iterations in.
    pub fn validate(&self) -> Result<(), PiciError> {
        if !(self.dt > 0.0) {
            return Err(PiciError::Config(format!("time step must be positive, got {}", self.dt)));
        }
        if !(self.spawning_threshold > 0.0) {
            return Err(PiciError::Config(format!("spawning threshold must be positive, got {}", self.spawning_threshold)));
        }
        if self.guess_threshold < self.spawning_threshold {
            return Err(PiciError::Config(format!(
                "initial-guess threshold ({}) must not be tighter than the spawning threshold ({})",
                self.guess_threshold, self.spawning_threshold)));
        }
        if self.spawning_threshold >= 1.0 {
            return Err(PiciError::Config(format!(
                "spawning threshold ({}) exceeds the amplitude scale of a normalized state", self.spawning_threshold)));
        }
        if self.nroot == 0 {
            return Err(PiciError::Config("nroot must be at least 1".to_string()));
        }
        if self.max_steps == 0 {
            return Err(PiciError::Config("max_steps must be at least 1".to_string()));
        }
        if !(self.e_tol > 0.0) {
            return Err(PiciError::Config(format!("energy tolerance must be positive, got {}", self.e_tol)));
        }
        if self.estimate_freq == 0 || self.variational_freq == 0 || self.shift_freq == 0 || self.adapt_freq == 0 {
            return Err(PiciError::Config("estimate, variational, shift and adaptation frequencies must be at least 1".to_string()));
        }
        if self.prescreen_factor < 1.0 {
            return Err(PiciError::Config(format!(
                "prescreening tolerance factor must be >= 1, got {}", self.prescreen_factor)));
        }
        if self.adaptive_dt && !(self.dt_min <= self.dt && self.dt <= self.dt_max) {
            return Err(PiciError::Config(format!(
                "time step {} outside adaptive bounds [{}, {}]", self.dt, self.dt_min, self.dt_max)));
        }
        Ok(())
    }
}

// Storage for the sparse CI wavefunction: determinant -> amplitude. Backed by a
// BTreeMap so iteration follows the determinant total order deterministically.
#[derive(Clone, Default, Debug)]
pub struct SparseState {
    coeffs: BTreeMap<Determinant, f64>,
}

impl SparseState {
    pub fn new() -> Self {
        Self { coeffs: BTreeMap::new() }
    }

    /// Construct a state holding a single determinant.
    pub fn single(det: Determinant, c: f64) -> Self {
        let mut s = Self::new();
        s.coeffs.insert(det, c);
        s
    }

    pub fn get(&self, det: &Determinant) -> f64 {
        self.coeffs.get(det).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, det: Determinant, c: f64) {
        self.coeffs.insert(det, c);
    }

    /// Add dc to the amplitude on det, creating the entry if absent.
    pub fn add(&mut self, det: Determinant, dc: f64) {
        *self.coeffs.entry(det).or_insert(0.0) += dc;
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Determinant, &f64)> {
        self.coeffs.iter()
    }

    /// Snapshot of the (determinant, amplitude) pairs, used as the fixed input of
    /// one parallel fan-out.
    pub fn entries(&self) -> Vec<(Determinant, f64)> {
        self.coeffs.iter().map(|(d, c)| (*d, *c)).collect()
    }

    /// 1-norm of the amplitudes.
    pub fn norm1(&self) -> f64 {
        self.coeffs.values().map(|c| c.abs()).sum()
    }

    /// 2-norm of the amplitudes.
    pub fn norm2(&self) -> f64 {
        self.coeffs.values().map(|c| c * c).sum::<f64>().sqrt()
    }

    /// Sparse overlap <self|other>.
    pub fn dot(&self, other: &SparseState) -> f64 {
        // Iterate over the smaller map.
        let (a, b) = if self.len() <= other.len() { (self, other) } else { (other, self) };
        a.coeffs.iter().map(|(d, c)| c * b.get(d)).sum()
    }

    pub fn scale(&mut self, s: f64) {
        for c in self.coeffs.values_mut() {
            *c *= s;
        }
    }

    /// Project out the component of `other` from this state:
    /// |self> <- |self> - (<other|self> / <other|other>) |other>.
    pub fn project_out(&mut self, other: &SparseState) {
        let den = other.dot(other);
        if den == 0.0 {
            return;
        }
        let f = self.dot(other) / den;
        for (d, c) in other.iter() {
            self.add(*d, -f * c);
        }
    }

    /// Drop entries below threshold, never the reference determinant. Returns the
    /// number of entries removed.
    pub fn prune(&mut self, threshold: f64, reference: &Determinant) -> usize {
        let before = self.coeffs.len();
        self.coeffs.retain(|d, c| d == reference || c.abs() >= threshold);
        before - self.coeffs.len()
    }

    /// First determinant carrying a non-finite amplitude, if any.
    pub fn non_finite(&self) -> Option<Determinant> {
        self.coeffs.iter().find(|(_, c)| !c.is_finite()).map(|(d, _)| *d)
    }
}

// Counters for one propagation step. Reset per iteration, used only for
// diagnostics and adaptive control, never for correctness.
#[derive(Clone, Copy, Default, Debug)]
pub struct IterationStats {
    pub visited: usize,           // Source determinants processed.
    pub accepted: usize,          // Source determinants with at least one accepted spawn.
    pub spawned: usize,           // Accepted off-diagonal contributions.
    pub zero_spawned: usize,      // Candidates rejected by the spawning threshold.
    pub screened_singles: usize,  // Single-excitation classes skipped by prescreening.
    pub screened_doubles: usize,  // Double-excitation classes skipped by prescreening.
}

impl IterationStats {
    pub fn merge(&mut self, other: &IterationStats) {
        self.visited += other.visited;
        self.accepted += other.accepted;
        self.spawned += other.spawned;
        self.zero_spawned += other.zero_spawned;
        self.screened_singles += other.screened_singles;
        self.screened_doubles += other.screened_doubles;
    }

    /// Fraction of spawn candidates that passed the threshold.
    pub fn acceptance(&self) -> f64 {
        let total = self.spawned + self.zero_spawned;
        if total == 0 {
            return 0.0;
        }
        self.spawned as f64 / total as f64
    }
}
