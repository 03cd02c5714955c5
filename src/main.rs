use std::{fs, path::PathBuf, process};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use aca_tomasulo::{
    assembler::{self, Program},
    common_data_bus::BroadcastPolicy,
    cpu::{Cpu, CpuConfig, RunOutcome},
    instructions::{Instruction, InstructionRecord, Opcode},
    stats::instruction_latencies,
};

#[derive(Parser, Debug)]
#[command(
    name = "aca-tomasulo",
    version,
    about = "Cycle-level Tomasulo simulator with a reorder buffer",
    long_about = "Runs an assembly program through issue, execute, write-result and commit.\n\nWithout a program file a built-in demo runs.\n\nExamples:\n  aca-tomasulo program.s\n  aca-tomasulo program.s --config wide.json --json\n  RUST_LOG=debug aca-tomasulo --status-every 5"
)]
struct Args {
    /// Assembly program to run.
    program: Option<PathBuf>,

    /// JSON engine configuration; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_cycles: Option<u64>,

    #[arg(long)]
    rob_size: Option<usize>,

    #[arg(long)]
    issue_width: Option<usize>,

    #[arg(long)]
    commit_width: Option<usize>,

    /// Broadcast at most one result per cycle.
    #[arg(long)]
    single_broadcast: bool,

    /// Read registers at issue without consulting completed ROB entries.
    #[arg(long)]
    no_rob_forwarding: bool,

    /// Print pipeline state every N cycles.
    #[arg(long, value_name = "N")]
    status_every: Option<u64>,

    /// Emit the outcome as JSON instead of a report.
    #[arg(long)]
    json: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = build_config(&args)?;

    let program = match &args.program {
        Some(path) => assembler::assemble_file(path)
            .with_context(|| format!("failed to assemble {}", path.display()))?,
        None => demo_program(),
    };

    let mut cpu = Cpu::new(config).context("invalid engine configuration")?;
    for &(reg, value) in &program.registers {
        cpu.set_register(reg, value)?;
    }
    for &(addr, value) in &program.memory {
        cpu.set_memory(addr, value)?;
    }
    cpu.load_program(&program.instructions)
        .context("program rejected")?;

    if let Some(every) = args.status_every.filter(|n| *n > 0) {
        while !cpu.is_drained() && cpu.cycle() < cpu.config().max_cycles {
            cpu.step()?;
            if cpu.cycle() % every == 0 {
                print_status(&cpu);
            }
        }
    }
    let outcome = cpu.run()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_report(&cpu, &outcome);
    }
    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<CpuConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => CpuConfig::default(),
    };

    if let Some(n) = args.max_cycles {
        config.max_cycles = n;
    }
    if let Some(n) = args.rob_size {
        config.rob_size = n;
    }
    if let Some(n) = args.issue_width {
        config.issue_width = n;
    }
    if let Some(n) = args.commit_width {
        config.commit_width = n;
    }
    if args.single_broadcast {
        config.broadcast = BroadcastPolicy::SingleBus;
    }
    if args.no_rob_forwarding {
        config.rob_forwarding = false;
    }
    Ok(config)
}

/// Seeded registers and memory plus a short load/multiply/add chain.
fn demo_program() -> Program {
    let registers = (0..32).map(|i| (i, i as i64 + 5)).collect();
    let mut memory: Vec<(usize, i64)> = (0..200).map(|i| (i, i as i64 * 2 + 10)).collect();
    memory.extend([(38, 45), (41, 72), (53, 120), (82, 200)]);

    let instructions = [
        Instruction::load(0, 39),
        Instruction::load(4, 39),
        Instruction::load(2, 52),
        Instruction::compute(Opcode::Imul, 0, 2, 4),
        Instruction::compute(Opcode::Iadd, 8, 2, 6),
        Instruction::compute(Opcode::Fmul, 10, 0, 6),
        Instruction::compute(Opcode::Fadd, 6, 8, 2),
    ]
    .iter()
    .map(InstructionRecord::from)
    .collect();

    Program {
        registers,
        memory,
        instructions,
    }
}

fn print_status(cpu: &Cpu) {
    println!("Cycle {}:", cpu.cycle());
    println!("Registers: {:?}", cpu.registers().values());
    println!("Reservation Stations:");
    for rs in cpu.reservation_stations().iter() {
        println!("  {}", rs);
    }
    println!("Load Buffers:");
    for buf in cpu.load_store_buffers().loads() {
        println!("  {}", buf);
    }
    println!("Store Buffers:");
    for buf in cpu.load_store_buffers().stores() {
        println!("  {}", buf);
    }
    let rob = cpu.reorder_buffer();
    println!("Reorder Buffer: {} of {} slots used", rob.len(), rob.capacity());
    println!("Committed: {}\n", cpu.commit_log().len());
}

fn print_report(cpu: &Cpu, outcome: &RunOutcome) {
    if outcome.is_complete() {
        println!("Program completed in {} cycles.", outcome.cycles);
    } else {
        println!(
            "Reached maximum cycle count of {}. Execution terminated.",
            outcome.cycles
        );
    }
    println!("{}\n", outcome.stats);

    println!("Execution Timeline:");
    println!(
        "{:>3} | {:<18} | {:>5} | {:>13} | {:>16} | {:>12} | {:>6}",
        "#", "Instruction", "Issue", "Execute Start", "Execute Complete", "Write Result", "Commit"
    );
    println!("{}", "-".repeat(96));
    let cell = |c: Option<u64>| c.map_or_else(|| "N/A".to_string(), |c| c.to_string());
    for inst in cpu.instructions() {
        let t = inst.timing;
        println!(
            "{:>3} | {:<18} | {:>5} | {:>13} | {:>16} | {:>12} | {:>6}",
            inst.id,
            inst.to_string(),
            cell(t.issue),
            cell(t.execute_start),
            cell(t.execute_complete),
            cell(t.write_result),
            cell(t.commit)
        );
    }

    println!("\nInstruction Latencies:");
    for (id, op, latency) in instruction_latencies(cpu.instructions()) {
        match latency {
            Some(cycles) => println!("  {}: {} - {} cycles", id, op, cycles),
            None => println!("  {}: {} - did not finish", id, op),
        }
    }

    println!("\nFinal Register Values:");
    let mut written: Vec<usize> = cpu
        .instructions()
        .iter()
        .filter(|inst| inst.opcode.writes_register())
        .filter_map(|inst| inst.dst)
        .collect();
    written.sort_unstable();
    written.dedup();
    for reg in written {
        println!("  R{}: {}", reg, cpu.registers().get(reg));
    }
}
