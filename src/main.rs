// main.rs
use std::time::Instant;

use pici_rs::determinant::Determinant;
use pici_rs::driver::run;
use pici_rs::hamiltonian::Hamiltonian;
use pici_rs::input::load_input;
use pici_rs::read::read_integrals;
use pici_rs::write::{print_wfn, write_wavefunction};
use pici_rs::PropagatorOrder;

fn main() {
    let t_total = Instant::now();
    let input_path = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("Usage: pici <input.lua>");
            std::process::exit(1);
        }
    };

    let input = load_input(&input_path);
    if let Err(e) = input.params.validate() {
        eprintln!("{e}");
        std::process::exit(1);
    }

    // Read the MO integrals produced by the external integral backend.
    let t_read = Instant::now();
    let mo = read_integrals(&input.system.integrals);
    let d_read = t_read.elapsed();

    let norb = mo.norb;
    let (na, nb) = mo.nelec;
    let order = match input.params.order {
        PropagatorOrder::Linear => "linear",
        PropagatorOrder::Quadratic => "quadratic",
    };
    println!("{}", "=".repeat(100));
    println!("Adaptive sparse path-integral CI");
    println!("  orbitals: {norb}, electrons: ({na}, {nb})");
    println!("  propagator: {}, dt = {}, spawning threshold = {:.3e}, roots = {}",
             order, input.params.dt, input.params.spawning_threshold, input.params.nroot);

    let h = Hamiltonian::new(mo);
    let reference = Determinant::aufbau(na, nb);

    let t_prop = Instant::now();
    let results = match run(&h, &reference, &input.params, input.write.verbose) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };
    let d_prop = t_prop.elapsed();

    // Summary table.
    println!("{}", "=".repeat(100));
    println!("{:<6} {:>20} {:>14} {:>20} {:>12} {:>8}", "root", "E", "E(PT2)", "E+PT2", "converged", "iters");
    for r in &results {
        println!("{:<6} {:>20.12} {:>14.3e} {:>20.12} {:>12} {:>8}",
                 r.root, r.energy, r.pt2, r.energy + r.pt2, r.converged, r.iterations);
        if let Some(ev) = r.variational {
            println!("{:<6} {:>20.12} (variational)", "", ev);
        }
    }

    // Wavefunction dumps.
    for r in &results {
        if input.write.verbose {
            println!("Root {} wavefunction ({} determinants):", r.root, r.state.len());
            print_wfn(&r.state, norb, input.write.print_threshold);
        }
        if let Some(ref path) = input.write.wfn_file {
            let file = if results.len() == 1 { path.clone() } else { format!("{}.root{}", path, r.root) };
            write_wavefunction(&r.state, norb, &file);
            println!("Root {} wavefunction written to {}", r.root, file);
        }
    }

    println!("{}", "=".repeat(100));
    println!("Timings: integrals {:.3}s, propagation {:.3}s, total {:.3}s",
             d_read.as_secs_f64(), d_prop.as_secs_f64(), t_total.elapsed().as_secs_f64());
}
