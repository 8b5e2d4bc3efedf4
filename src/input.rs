// input.rs
use std::fs;

use rlua::Lua;

use crate::{PropagationParams, PropagatorOrder};

// Storage for system options.
pub struct SystemOptions {
    pub integrals: String,
}

// Storage for output options.
pub struct WriteOptions {
    pub verbose: bool,
    pub print_threshold: f64,       // Print-significance cutoff for the state dump.
    pub wfn_file: Option<String>,   // JSON wavefunction dump path, if requested.
}

/// Storage for input file parameters.
pub struct Input {
    pub system: SystemOptions,
    pub params: PropagationParams,
    pub write: WriteOptions,
}

/// Read input parameters from a lua file and assign to an Input object. Unknown
/// enum values abort with a message; missing pici/write fields fall back to the
/// engine defaults. Cross-field consistency is checked separately by
/// PropagationParams::validate before propagation begins.
/// # Arguments
///     `path`: str, file path to input file.
pub fn load_input(path: &str) -> Input {
    let src = fs::read_to_string(path).unwrap();
    let lua = Lua::new();

    let ctx = lua;
    ctx.load(&src).exec().unwrap();
    let globals = ctx.globals();

    // Table headers.
    let system_tbl: rlua::Table = globals.get("system").unwrap();
    let pici_tbl: rlua::Table = globals.get("pici").unwrap();
    let write_tbl: Option<rlua::Table> = globals.get("write").unwrap_or(None);

    // System table.
    let integrals: String = system_tbl.get("integrals").unwrap();
    let system = SystemOptions { integrals };

    // Pici table. Every option has an engine default.
    let d = PropagationParams::default();
    let spawning_threshold: f64 = pici_tbl.get::<_, Option<f64>>("spawning_threshold").unwrap().unwrap_or(d.spawning_threshold);
    let guess_threshold: f64 = pici_tbl.get::<_, Option<f64>>("guess_threshold").unwrap().unwrap_or(d.guess_threshold);
    let dt: f64 = pici_tbl.get::<_, Option<f64>>("dt").unwrap().unwrap_or(d.dt);
    let nroot: usize = pici_tbl.get::<_, Option<usize>>("nroot").unwrap().unwrap_or(d.nroot);
    let max_steps: usize = pici_tbl.get::<_, Option<usize>>("max_steps").unwrap().unwrap_or(d.max_steps);
    let e_tol: f64 = pici_tbl.get::<_, Option<f64>>("e_tol").unwrap().unwrap_or(d.e_tol);
    let estimate_freq: usize = pici_tbl.get::<_, Option<usize>>("estimate_freq").unwrap().unwrap_or(d.estimate_freq);
    let variational: bool = pici_tbl.get::<_, Option<bool>>("variational").unwrap().unwrap_or(d.variational);
    let variational_freq: usize = pici_tbl.get::<_, Option<usize>>("variational_freq").unwrap().unwrap_or(d.variational_freq);
    let prescreen: bool = pici_tbl.get::<_, Option<bool>>("prescreen").unwrap().unwrap_or(d.prescreen);
    let prescreen_factor: f64 = pici_tbl.get::<_, Option<f64>>("prescreen_factor").unwrap().unwrap_or(d.prescreen_factor);
    let dynamic_prescreen: bool = pici_tbl.get::<_, Option<bool>>("dynamic_prescreen").unwrap().unwrap_or(d.dynamic_prescreen);
    let do_shift: bool = pici_tbl.get::<_, Option<bool>>("do_shift").unwrap().unwrap_or(d.do_shift);
    let shift_damping: f64 = pici_tbl.get::<_, Option<f64>>("shift_damping").unwrap().unwrap_or(d.shift_damping);
    let shift_freq: usize = pici_tbl.get::<_, Option<usize>>("shift_freq").unwrap().unwrap_or(d.shift_freq);
    let adaptive_dt: bool = pici_tbl.get::<_, Option<bool>>("adaptive_dt").unwrap().unwrap_or(d.adaptive_dt);
    let adapt_freq: usize = pici_tbl.get::<_, Option<usize>>("adapt_freq").unwrap().unwrap_or(d.adapt_freq);
    let dt_min: f64 = pici_tbl.get::<_, Option<f64>>("dt_min").unwrap().unwrap_or(d.dt_min);
    let dt_max: f64 = pici_tbl.get::<_, Option<f64>>("dt_max").unwrap().unwrap_or(d.dt_max);

    let order_str: String = pici_tbl.get::<_, Option<String>>("propagator").unwrap().unwrap_or_else(|| "linear".to_string());
    let order = match order_str.as_str() {
        "linear" => PropagatorOrder::Linear,
        "quadratic" => PropagatorOrder::Quadratic,
        _ => {
            eprintln!("Propagator must be 'linear' or 'quadratic'.");
            std::process::exit(1);
        }
    };

    let params = PropagationParams {
        dt,
        spawning_threshold,
        guess_threshold,
        order,
        nroot,
        max_steps,
        e_tol,
        estimate_freq,
        variational,
        variational_freq,
        prescreen,
        prescreen_factor,
        dynamic_prescreen,
        do_shift,
        shift_damping,
        shift_freq,
        adaptive_dt,
        adapt_freq,
        dt_min,
        dt_max,
    };

    // Write table.
    let write = match write_tbl {
        Some(t) => {
            let verbose: bool = t.get::<_, Option<bool>>("verbose").unwrap().unwrap_or(true);
            let print_threshold: f64 = t.get::<_, Option<f64>>("print_threshold").unwrap().unwrap_or(0.01);
            let wfn_file: Option<String> = t.get::<_, Option<String>>("wfn_file").unwrap();
            WriteOptions { verbose, print_threshold, wfn_file }
        }
        None => WriteOptions { verbose: true, print_threshold: 0.01, wfn_file: None },
    };

    Input { system, params, write }
}
