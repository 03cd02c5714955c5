use aca_tomasulo::cpu::{Cpu, CpuConfig, RunOutcome};
use aca_tomasulo::instructions::{Instruction, Timing, Value};

pub struct TestContext {
    pub cpu: Cpu,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(CpuConfig::default())
    }

    pub fn with_config(config: CpuConfig) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();

        Self {
            cpu: Cpu::new(config).expect("test config is valid"),
        }
    }

    pub fn registers(mut self, values: &[(usize, Value)]) -> Self {
        for &(reg, value) in values {
            self.cpu.set_register(reg, value).unwrap();
        }
        self
    }

    pub fn memory(mut self, values: &[(usize, Value)]) -> Self {
        for &(addr, value) in values {
            self.cpu.set_memory(addr, value).unwrap();
        }
        self
    }

    pub fn program(mut self, program: Vec<Instruction>) -> Self {
        self.cpu.load_instructions(program).unwrap();
        self
    }

    pub fn run(&mut self) -> RunOutcome {
        self.cpu.run().expect("run should not fault")
    }

    pub fn reg(&self, reg: usize) -> Value {
        self.cpu.registers().get(reg)
    }

    pub fn timing(&self, id: usize) -> Timing {
        self.cpu.instructions()[id].timing
    }

    /// Program positions in the order they committed.
    pub fn commit_order(outcome: &RunOutcome) -> Vec<usize> {
        outcome.commit_log.iter().map(|r| r.instruction.id).collect()
    }
}

/// Stamps for an instruction that went through every stage.
pub fn stamps(issue: u64, start: u64, complete: u64, write: u64, commit: u64) -> Timing {
    Timing {
        issue: Some(issue),
        execute_start: Some(start),
        execute_complete: Some(complete),
        write_result: Some(write),
        commit: Some(commit),
    }
}
