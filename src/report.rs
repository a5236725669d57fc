use std::fmt;
use std::fmt::Write;

use crate::backend::instr_table::{InstrSlot, InstrTable, Stage};
use crate::cpu::PerfCounters;
use crate::instructions::instructions::mnemonic;

const STAGES: [Stage; 5] = [Stage::Fetch, Stage::Dispatch, Stage::Issue, Stage::Execute, Stage::Broadcast];

fn format_cycle(cycle: Option<u64>) -> String {
    match cycle {
        Some(c) => c.to_string(),
        None => String::new(),
    }
}

fn write_row(out: &mut String, slot: &InstrSlot) -> fmt::Result {
    write!(out, "{:>6} {:<7}", slot.instr.index, mnemonic(slot.instr.class))?;
    for stage in STAGES {
        write!(out, " {:>9}", format_cycle(slot.cycle(stage)))?;
    }
    writeln!(out)
}

fn write_timing_table(out: &mut String, instr_table: &InstrTable) -> fmt::Result {
    write!(out, "{:>6} {:<7}", "index", "class")?;
    for stage in STAGES {
        write!(out, " {:>9}", stage.to_string())?;
    }
    writeln!(out)?;

    for slot in instr_table.iter() {
        write_row(out, slot)?;
    }
    Ok(())
}

/// One row per simulated instruction with the cycle it entered each stage.
pub(crate) fn timing_table(instr_table: &InstrTable) -> Result<String, fmt::Error> {
    let mut table = String::new();
    write_timing_table(&mut table, instr_table)?;
    Ok(table)
}

fn write_summary(out: &mut String, perf_counters: &PerfCounters, cycles: u64) -> fmt::Result {
    // everything that was fetched is simulated; skipped traps are not.
    let simulated = perf_counters.fetch_cnt;
    let cpi = if simulated == 0 {
        0.0
    } else {
        cycles as f64 / simulated as f64
    };

    writeln!(out, "Cycles:                 {}", cycles)?;
    writeln!(out, "Instructions:           {}", simulated)?;
    writeln!(out, "CPI:                    {:.2}", cpi)?;
    writeln!(out, "Traps skipped:          {}", perf_counters.trap_skip_cnt)?;
    writeln!(out, "Control (no RS):        {}", perf_counters.control_cnt)?;
    writeln!(out, "Broadcasts:             {}", perf_counters.broadcast_cnt)?;
    writeln!(out, "Stores:                 {}", perf_counters.store_cnt)?;
    writeln!(out, "Dispatch stall cycles:  {}", perf_counters.dispatch_stall_cnt)?;
    write!(out, "CDB conflicts:          {}", perf_counters.cdb_conflict_cnt)
}

pub(crate) fn summary(perf_counters: &PerfCounters, cycles: u64) -> Result<String, fmt::Error> {
    let mut summary = String::new();
    write_summary(&mut summary, perf_counters, cycles)?;
    Ok(summary)
}
