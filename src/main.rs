use std::path::PathBuf;
use std::process::exit;

use lalrpop_util::lalrpop_mod;
use log::error;
use structopt::StructOpt;

use crate::cpu::{CPU, load_cpu_config};
use crate::loader::loader::{load, LoadError};

mod cpu;
mod loader;
mod frontend;
mod backend;
mod instructions;
mod report;


lalrpop_mod!(pub trace_file, "/loader/trace_file.rs");

#[derive(StructOpt, Debug)]
#[structopt(name = "Tomasulo Simulator")]
struct Opt {
    /// Path of the instruction trace to simulate
    #[structopt(short, long, parse(from_os_str))]
    file: PathBuf,

    /// Sets a custom config file
    #[structopt(short, long, parse(from_os_str), default_value = "cpu.yaml")]
    config: PathBuf,

    /// Prints the cycle at which every instruction entered each stage
    #[structopt(short, long)]
    timing: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let cpu_config_path = opt.config.to_string_lossy();
    let cpu_config = match load_cpu_config(&cpu_config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load {}. Cause: {}", cpu_config_path, err);
            exit(1);
        }
    };

    let path = opt.file.to_string_lossy();
    println!("Loading {}", path);
    let instr_trace = match load(&path) {
        Ok(instr_trace) => instr_trace,
        Err(err) => {
            error!("Loading trace '{}' failed.", path);
            match err {
                LoadError::AnalysisError(msg_vec) => {
                    for msg in msg_vec {
                        error!("{}", msg);
                    }
                }
                LoadError::ParseError(msg) |
                LoadError::NotFoundError(msg) |
                LoadError::IOError(msg) => error!("{}", msg),
            }
            exit(1);
        }
    };

    let mut cpu = match CPU::new(&cpu_config) {
        Ok(cpu) => cpu,
        Err(err) => {
            error!("Invalid config {}. Cause: {}", cpu_config_path, err);
            exit(1);
        }
    };

    let cycles = match cpu.run(instr_trace) {
        Ok(cycles) => cycles,
        Err(err) => {
            error!("Simulation aborted: {}", err);
            exit(2);
        }
    };

    if opt.timing {
        match report::timing_table(&cpu.instr_table.borrow()) {
            Ok(table) => println!("{}", table),
            Err(err) => error!("Failed to format the timing table: {}", err),
        }
    }
    match report::summary(&cpu.perf_counters.borrow(), cycles) {
        Ok(summary) => println!("{}", summary),
        Err(err) => error!("Failed to format the summary: {}", err),
    };
}
