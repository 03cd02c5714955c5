use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commiter::{CommitRecord, Commiter};
use crate::common_data_bus::{BroadcastPolicy, CommonDataBus};
use crate::dispatcher::{Dispatcher, OperandSources, StallReason};
use crate::error::{EngineError, Result};
use crate::execution_units::ExecutionUnits;
use crate::instructions::{Instruction, InstructionRecord, LatencyTable, UnitClass, Value, NUM_REGISTERS};
use crate::load_store_buffer::LoadStoreBufferPool;
use crate::memory::Memory;
use crate::register_status::RegisterStatusTable;
use crate::registers::RegisterFile;
use crate::reorder_buffer::ReorderBuffer;
use crate::reservation_station::{FunctionalSlot, ReservationStationPool};
use crate::snapshot::{CycleSnapshot, RobSnapshot, StationSnapshot};
use crate::stats::{theoretical_cycles, StatsTracker};

/// Largest accepted data memory, in words.
pub const MAX_MEMORY_WORDS: usize = 1 << 24;
pub const MAX_ROB_SIZE: usize = 1 << 16;
pub const MAX_POOL_SIZE: usize = 1 << 10;

/// Number of stations or buffers per class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSizes {
    pub int_add: usize,
    pub int_mul: usize,
    pub fp_add: usize,
    pub fp_mul: usize,
    pub logic: usize,
    pub load: usize,
    pub store: usize,
}
impl PoolSizes {
    pub fn size_of(&self, class: UnitClass) -> usize {
        match class {
            UnitClass::IntAdd => self.int_add,
            UnitClass::IntMul => self.int_mul,
            UnitClass::FpAdd => self.fp_add,
            UnitClass::FpMul => self.fp_mul,
            UnitClass::Logic => self.logic,
            UnitClass::Load => self.load,
            UnitClass::Store => self.store,
            UnitClass::Passthrough => usize::MAX,
        }
    }

    fn compute(&self) -> [usize; 5] {
        UnitClass::COMPUTE.map(|class| self.size_of(class))
    }
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            int_add: 2,
            int_mul: 1,
            fp_add: 1,
            fp_mul: 1,
            logic: 1,
            load: 2,
            store: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub rob_size: usize,
    /// Instructions issued per cycle.
    pub issue_width: usize,
    /// Instructions committed per cycle.
    pub commit_width: usize,
    /// Data memory size in words.
    pub memory_size: usize,
    /// Watchdog: a run stops after this many cycles even if not drained.
    pub max_cycles: u64,
    pub pools: PoolSizes,
    pub latencies: LatencyTable,
    pub broadcast: BroadcastPolicy,
    /// Let issue read completed but uncommitted values from the ROB.
    pub rob_forwarding: bool,
    /// Keep a snapshot of every cycle.
    pub record_history: bool,
    /// Memory range included in snapshots.
    pub memory_window: Range<usize>,
}
impl CpuConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |detail: String| -> Result<()> {
            Err(EngineError::InvalidConfig { detail })
        };

        if self.rob_size == 0 {
            return invalid("ROB capacity must be at least 1".into());
        }
        if self.issue_width == 0 || self.commit_width == 0 {
            return invalid("issue and commit width must be at least 1".into());
        }
        if self.rob_size > MAX_ROB_SIZE {
            return invalid(format!("ROB capacity above {} entries", MAX_ROB_SIZE));
        }
        if self.memory_size == 0 {
            return invalid("memory must hold at least one word".into());
        }
        let memory_bytes = self.memory_size.checked_mul(std::mem::size_of::<Value>());
        if memory_bytes.is_none() || self.memory_size > MAX_MEMORY_WORDS {
            return invalid(format!(
                "memory of {} words exceeds the limit of {} words",
                self.memory_size, MAX_MEMORY_WORDS
            ));
        }
        if let Some(class) = UnitClass::COMPUTE
            .into_iter()
            .chain([UnitClass::Load, UnitClass::Store])
            .find(|class| self.pools.size_of(*class) > MAX_POOL_SIZE)
        {
            return invalid(format!(
                "{} pool above {} stations",
                class.label(),
                MAX_POOL_SIZE
            ));
        }
        if let Some((op, _)) = self.latencies.iter().find(|(_, cycles)| *cycles == 0) {
            return invalid(format!("{} has a latency of 0 cycles", op));
        }
        Ok(())
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            rob_size: 16,
            issue_width: 2,
            commit_width: 2,
            memory_size: 1024,
            max_cycles: 100,
            pools: PoolSizes::default(),
            latencies: LatencyTable::default(),
            broadcast: BroadcastPolicy::default(),
            rob_forwarding: true,
            record_history: false,
            memory_window: 0..16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// Every instruction committed and the pipeline is empty.
    Drained,
    /// The watchdog stopped the run; the commit log is partial.
    WatchdogExpired { max_cycles: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub commit_log: Vec<CommitRecord>,
    pub cycles: u64,
    pub termination: Termination,
    pub stats: StatsTracker,
}
impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.termination == Termination::Drained
    }
}

/// The Tomasulo engine. Each [`Cpu::step`] runs issue, execute, write-result
/// and commit once, in that order.
#[derive(Debug)]
pub struct Cpu {
    instructions: Vec<Instruction>,
    pc: usize,
    cycle: u64,
    registers: RegisterFile,
    memory: Memory,
    rst: RegisterStatusTable,
    rob: ReorderBuffer,
    reservation_stations: ReservationStationPool,
    buffers: LoadStoreBufferPool,
    cdb: CommonDataBus,
    dispatcher: Dispatcher,
    execution_units: ExecutionUnits,
    commiter: Commiter,
    commit_log: Vec<CommitRecord>,
    history: Vec<CycleSnapshot>,
    stats_tracker: StatsTracker,
    config: CpuConfig,
}
impl Cpu {
    pub fn new(config: CpuConfig) -> Result<Self> {
        config.validate()?;

        Ok(Cpu {
            instructions: Vec::new(),
            pc: 0,
            cycle: 0,
            registers: RegisterFile::new(),
            memory: Memory::new(config.memory_size),
            rst: RegisterStatusTable::new(),
            rob: ReorderBuffer::new(config.rob_size, config.commit_width),
            reservation_stations: ReservationStationPool::new(config.pools.compute()),
            buffers: LoadStoreBufferPool::new(config.pools.load, config.pools.store),
            cdb: CommonDataBus::new(config.broadcast),
            dispatcher: Dispatcher::new(config.issue_width),
            execution_units: ExecutionUnits::new(),
            commiter: Commiter::new(),
            commit_log: Vec::new(),
            history: Vec::new(),
            stats_tracker: StatsTracker::new(),
            config,
        })
    }

    /// Decodes and validates loader records, replacing any previous program.
    /// Nothing is loaded if any record is rejected.
    pub fn load_program(&mut self, records: &[InstructionRecord]) -> Result<()> {
        let instructions = records
            .iter()
            .enumerate()
            .map(|(position, record)| Instruction::decode(position, record, self.config.memory_size))
            .collect::<Result<Vec<_>>>()?;
        self.install(instructions)
    }

    /// Loads already-typed instructions, assigning program positions.
    /// Timestamps and status left over from an earlier run are cleared.
    pub fn load_instructions(&mut self, instructions: Vec<Instruction>) -> Result<()> {
        let mut program = Vec::with_capacity(instructions.len());
        for (position, mut inst) in instructions.into_iter().enumerate() {
            inst.id = position;
            inst.reset();
            inst.validate(position, self.config.memory_size)?;
            program.push(inst);
        }
        self.install(program)
    }

    fn install(&mut self, program: Vec<Instruction>) -> Result<()> {
        for inst in &program {
            let class = inst.opcode.unit_class();
            if self.config.pools.size_of(class) == 0 {
                return Err(EngineError::InvalidConfig {
                    detail: format!(
                        "{} at program position {} needs a {} station but none are configured",
                        inst.opcode,
                        inst.id,
                        class.label()
                    ),
                });
            }
        }

        self.reset_pipeline();
        self.stats_tracker.theoretical_cycles = theoretical_cycles(&program, &self.config.latencies);
        self.instructions = program;
        Ok(())
    }

    fn reset_pipeline(&mut self) {
        let config = &self.config;
        self.pc = 0;
        self.cycle = 0;
        self.rst = RegisterStatusTable::new();
        self.rob = ReorderBuffer::new(config.rob_size, config.commit_width);
        self.reservation_stations = ReservationStationPool::new(config.pools.compute());
        self.buffers = LoadStoreBufferPool::new(config.pools.load, config.pools.store);
        self.cdb = CommonDataBus::new(config.broadcast);
        self.commit_log.clear();
        self.history.clear();
        self.stats_tracker = StatsTracker::new();
    }

    pub fn set_register(&mut self, reg: usize, value: Value) -> Result<()> {
        if reg >= NUM_REGISTERS {
            return Err(EngineError::InvalidConfig {
                detail: format!("register R{} does not exist", reg),
            });
        }
        self.registers.set(reg, value);
        Ok(())
    }

    pub fn set_memory(&mut self, address: usize, value: Value) -> Result<()> {
        self.memory.write(address, value).map_err(|_| EngineError::InvalidConfig {
            detail: format!(
                "address {} outside memory of {} words",
                address,
                self.memory.size()
            ),
        })
    }

    /// True once everything has issued and every structure is empty.
    pub fn is_drained(&self) -> bool {
        self.pc >= self.instructions.len()
            && self.rob.is_empty()
            && self.cdb.is_empty()
            && self.reservation_stations.is_empty()
            && self.buffers.is_empty()
    }

    /// Runs one cycle: issue, execute, write-result, commit.
    pub fn step(&mut self) -> Result<()> {
        let cycle = self.cycle;

        let sources = OperandSources {
            registers: &self.registers,
            forwarding: self.config.rob_forwarding,
        };
        let issue = self.dispatcher.dispatch(
            cycle,
            &mut self.instructions,
            &mut self.pc,
            &sources,
            &mut self.rst,
            &mut self.rob,
            &mut self.reservation_stations,
            &mut self.buffers,
            &self.config.latencies,
        )?;

        let execute = self.execution_units.cycle(
            cycle,
            &mut self.instructions,
            &mut self.reservation_stations,
            &mut self.buffers,
            &mut self.rob,
            &self.memory,
            &mut self.cdb,
        )?;

        let broadcasts = self.cdb.write_results(
            cycle,
            &mut self.instructions,
            &mut self.rob,
            &mut self.rst,
            &mut self.reservation_stations,
            &mut self.buffers,
        )?;

        let committed = self.commiter.commit_finished(
            cycle,
            &mut self.instructions,
            &mut self.registers,
            &mut self.rob,
            &mut self.memory,
        )?;

        debug!(
            cycle,
            issued = issue.issued,
            stall = ?issue.stall,
            started = execute.started,
            completed = execute.completed,
            broadcasts,
            committed = committed.len(),
            "cycle done"
        );

        let stats = &mut self.stats_tracker;
        stats.instructions_issued += issue.issued as u64;
        match issue.stall {
            Some(StallReason::RobFull) => stats.rob_full_stalls += 1,
            Some(StallReason::NoFreeStation(_)) => stats.station_stalls += 1,
            None => (),
        }
        stats.broadcasts += broadcasts as u64;
        stats.instructions_commited += committed.len() as u64;
        self.commit_log.extend(committed);

        if self.config.record_history {
            let snapshot = self.snapshot_at(cycle);
            self.history.push(snapshot);
        }

        self.cycle += 1;
        self.stats_tracker.cycles = self.cycle;
        Ok(())
    }

    /// Runs until the pipeline drains or the watchdog expires.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let mut termination = Termination::Drained;

        while !self.is_drained() {
            if self.cycle >= self.config.max_cycles {
                warn!(
                    max_cycles = self.config.max_cycles,
                    committed = self.commit_log.len(),
                    program = self.instructions.len(),
                    "watchdog expired before the pipeline drained"
                );
                termination = Termination::WatchdogExpired {
                    max_cycles: self.config.max_cycles,
                };
                break;
            }
            self.step()?;
        }

        info!(
            cycles = self.cycle,
            committed = self.commit_log.len(),
            efficiency = self.stats_tracker.efficiency(),
            "run finished"
        );

        Ok(RunOutcome {
            commit_log: self.commit_log.clone(),
            cycles: self.cycle,
            termination,
            stats: self.stats_tracker,
        })
    }

    /// Pipeline state at the start of the next cycle to run.
    pub fn snapshot(&self) -> CycleSnapshot {
        self.snapshot_at(self.cycle)
    }

    fn snapshot_at(&self, cycle: u64) -> CycleSnapshot {
        CycleSnapshot {
            cycle,
            pc: self.pc,
            registers: self.registers.values().to_vec(),
            register_status: self
                .rst
                .entries()
                .iter()
                .map(|tag| tag.map(|t| t.to_string()))
                .collect(),
            memory_window: self.memory.window(self.config.memory_window.clone()),
            stations: self
                .reservation_stations
                .iter()
                .map(StationSnapshot::from)
                .collect(),
            load_buffers: self.buffers.loads().iter().map(StationSnapshot::from).collect(),
            store_buffers: self.buffers.stores().iter().map(StationSnapshot::from).collect(),
            rob: self
                .rob
                .iter()
                .map(|(slot, entry)| RobSnapshot {
                    slot,
                    instruction: entry.instruction,
                    text: self.instructions[entry.instruction].to_string(),
                    state: entry.state,
                    destination: entry.destination,
                    value: entry.value,
                })
                .collect(),
            pending_broadcasts: self.cdb.pending().copied().collect(),
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn register_status(&self) -> &RegisterStatusTable {
        &self.rst
    }

    pub fn reorder_buffer(&self) -> &ReorderBuffer {
        &self.rob
    }

    pub fn reservation_stations(&self) -> &ReservationStationPool {
        &self.reservation_stations
    }

    pub fn load_store_buffers(&self) -> &LoadStoreBufferPool {
        &self.buffers
    }

    /// Every instruction of the program with its timing so far.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn commit_log(&self) -> &[CommitRecord] {
        &self.commit_log
    }

    pub fn history(&self) -> &[CycleSnapshot] {
        &self.history
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats_tracker
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    /// Names of busy stations and buffers, in pool order.
    pub fn busy_stations(&self) -> Vec<String> {
        let stations = self
            .reservation_stations
            .iter()
            .filter(|rs| rs.is_busy())
            .map(|rs| rs.tag().to_string());
        let buffers = self
            .buffers
            .loads()
            .iter()
            .chain(self.buffers.stores())
            .filter(|buf| buf.is_busy())
            .map(|buf| buf.tag().to_string());
        stations.chain(buffers).collect()
    }
}
