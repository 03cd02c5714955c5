use core::fmt::{self, Display};

use serde::Serialize;

use crate::instructions::{Instruction, LatencyTable, Opcode, NUM_REGISTERS};

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct StatsTracker {
    pub cycles: u64,
    pub instructions_issued: u64,
    pub instructions_commited: u64,
    pub broadcasts: u64,
    pub rob_full_stalls: u64,
    pub station_stalls: u64,
    /// Dependency-only lower bound on cycles, ignoring structural limits.
    pub theoretical_cycles: u64,
}
impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Theoretical cycles over actual cycles; higher is better.
    pub fn efficiency(&self) -> f64 {
        if self.cycles == 0 {
            return 0.0;
        }
        self.theoretical_cycles as f64 / self.cycles as f64
    }
}

/// Cycles the program would need with unlimited stations and width: each
/// instruction is ready at its program index or when its sources are, and
/// finishes `latency` cycles later.
pub fn theoretical_cycles(program: &[Instruction], latencies: &LatencyTable) -> u64 {
    let mut reg_ready = [0u64; NUM_REGISTERS];
    let mut max_cycle = 0;

    for (idx, inst) in program.iter().enumerate() {
        let ready = inst
            .sources()
            .into_iter()
            .flatten()
            .map(|reg| reg_ready[reg])
            .fold(idx as u64, u64::max);
        let finish = ready + u64::from(latencies.get(inst.opcode));

        if let Some(dst) = inst.dst.filter(|_| inst.opcode.writes_register()) {
            reg_ready[dst] = finish;
        }
        max_cycle = max_cycle.max(finish);
    }

    if program.is_empty() {
        0
    } else {
        max_cycle + 1
    }
}

impl Display for StatsTracker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Program stats:")?;
        writeln!(f, " - Cycles: {}", self.cycles)?;
        writeln!(f, " - Theoretical Cycles: {}", self.theoretical_cycles)?;
        writeln!(f, " - Efficiency: {:.2}", self.efficiency())?;
        writeln!(f, " - Instructions Issued: {}", self.instructions_issued)?;
        writeln!(
            f,
            " - Instructions Commited: {}",
            self.instructions_commited
        )?;
        writeln!(f, " - Broadcasts: {}", self.broadcasts)?;
        writeln!(f, " - ROB Full Stalls: {}", self.rob_full_stalls)?;
        write!(f, " - Station Stalls: {}", self.station_stalls)
    }
}

/// Per-instruction execution latency summary, `None` for instructions that
/// never finished executing.
pub fn instruction_latencies(program: &[Instruction]) -> Vec<(usize, Opcode, Option<u64>)> {
    program
        .iter()
        .map(|inst| (inst.id, inst.opcode, inst.timing.execution_latency()))
        .collect()
}
