// write.rs
use std::fs::File;
use std::io::{BufWriter, Write};

use serde::Serialize;

use crate::SparseState;

// One wavefunction entry in the JSON dump.
#[derive(Serialize)]
struct WfnEntry {
    det: String,
    coeff: f64,
}

/// Print the sparse wavefunction, largest amplitudes first, filtered by the
/// print-significance threshold.
/// # Arguments
///     `state`: SparseState, wavefunction to print.
///     `norb`: usize, number of orbitals for rendering.
///     `threshold`: f64, smallest |C| worth printing.
pub fn print_wfn(state: &SparseState, norb: usize, threshold: f64) {
    let mut entries: Vec<_> = state.iter().map(|(d, c)| (*d, *c)).collect();
    entries.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap());

    println!("{}", "-".repeat(60));
    println!("{:<20} {:>16}", "determinant", "coefficient");
    for (det, c) in &entries {
        if c.abs() < threshold {
            break;
        }
        println!("{:<20} {:>16.10}", det.render(norb), c);
    }
    println!("{}", "-".repeat(60));
}

/// Write the full sparse wavefunction as a JSON list of (determinant,
/// coefficient) records, largest amplitudes first.
/// # Arguments
///     `state`: SparseState, wavefunction to dump.
///     `norb`: usize, number of orbitals for rendering.
///     `path`: str, output file path.
pub fn write_wavefunction(state: &SparseState, norb: usize, path: &str) {
    let mut entries: Vec<_> = state.iter().map(|(d, c)| (*d, *c)).collect();
    entries.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap());
    let records: Vec<WfnEntry> = entries
        .iter()
        .map(|(d, c)| WfnEntry { det: d.render(norb), coeff: *c })
        .collect();

    let file = File::create(path).unwrap();
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &records).unwrap();
    out.flush().unwrap();
}
