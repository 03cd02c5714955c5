//! Cycle stamps of the four stages.

use pretty_assertions::assert_eq;

use aca_tomasulo::cpu::Termination;
use aca_tomasulo::instructions::{Instruction, Opcode};

use crate::common::{stamps, TestContext};

#[test]
fn load_then_dependent_add() {
    let mut ctx = TestContext::new()
        .memory(&[(40, 7)])
        .program(vec![Instruction::load(0, 40), Instruction::add(1, 0, 0)]);

    let outcome = ctx.run();

    assert!(outcome.is_complete());
    assert_eq!(ctx.reg(0), 7);
    assert_eq!(ctx.reg(1), 14);
    assert_eq!(ctx.timing(0), stamps(0, 0, 0, 0, 0));
    // waits for the broadcast, then runs six cycles
    assert_eq!(ctx.timing(1), stamps(0, 1, 6, 6, 6));
    assert_eq!(outcome.cycles, 7);
    assert_eq!(TestContext::commit_order(&outcome), vec![0, 1]);
    assert_eq!(outcome.commit_log[1].value, 14);
}

#[test]
fn execution_spans_latency_inclusive_of_start() {
    let mut ctx = TestContext::new()
        .registers(&[(1, 3), (2, 4)])
        .program(vec![
            Instruction::compute(Opcode::Fmul, 3, 1, 2),
            Instruction::compute(Opcode::Fsub, 4, 1, 2),
            Instruction::compute(Opcode::Xor, 5, 1, 2),
        ]);

    ctx.run();

    assert_eq!(ctx.timing(0).execution_latency(), Some(30));
    assert_eq!(ctx.timing(1).execution_latency(), Some(18));
    assert_eq!(ctx.timing(2).execution_latency(), Some(1));
    assert_eq!(ctx.reg(3), 12);
    assert_eq!(ctx.reg(4), -1);
    assert_eq!(ctx.reg(5), 7);
}

#[test]
fn nop_takes_every_stage_in_its_issue_cycle() {
    let mut ctx = TestContext::new().program(vec![
        Instruction::compute(Opcode::Imul, 1, 2, 3),
        Instruction::nop(),
    ]);

    let outcome = ctx.run();

    let nop = ctx.timing(1);
    assert_eq!(nop.issue, Some(0));
    assert_eq!(nop.execute_start, Some(0));
    assert_eq!(nop.execute_complete, Some(0));
    assert_eq!(nop.write_result, Some(0));
    // still commits behind the multiply
    assert_eq!(nop.commit, Some(11));
    assert_eq!(outcome.commit_log[1].value, 0);
}

#[test]
fn store_waits_for_its_value_and_writes_memory_at_commit() {
    let mut ctx = TestContext::new()
        .memory(&[(5, 9)])
        .program(vec![Instruction::load(3, 5), Instruction::store(3, 12)]);

    let outcome = ctx.run();

    assert_eq!(ctx.timing(1), stamps(0, 1, 1, 1, 1));
    assert_eq!(ctx.cpu.memory().read(12), Ok(9));
    assert_eq!(outcome.commit_log[1].value, 9);
}

#[test]
fn watchdog_returns_partial_log() {
    let mut config = aca_tomasulo::CpuConfig::default();
    config.max_cycles = 5;
    let mut ctx = TestContext::with_config(config)
        .memory(&[(1, 2)])
        .program(vec![
            Instruction::load(0, 1),
            Instruction::compute(Opcode::Fmul, 1, 0, 0),
        ]);

    let outcome = ctx.run();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.termination, Termination::WatchdogExpired { max_cycles: 5 });
    assert_eq!(outcome.cycles, 5);
    assert_eq!(TestContext::commit_order(&outcome), vec![0]);
    assert_eq!(ctx.timing(1).commit, None);
}

#[test]
fn demo_program_results() {
    let registers: Vec<_> = (0..32).map(|i| (i, i as i64 + 5)).collect();
    let mut memory: Vec<_> = (0..200).map(|i| (i, i as i64 * 2 + 10)).collect();
    memory.extend([(38, 45), (41, 72), (53, 120), (82, 200)]);

    let mut ctx = TestContext::new()
        .registers(&registers)
        .memory(&memory)
        .program(vec![
            Instruction::load(0, 39),
            Instruction::load(4, 39),
            Instruction::load(2, 52),
            Instruction::compute(Opcode::Imul, 0, 2, 4),
            Instruction::compute(Opcode::Iadd, 8, 2, 6),
            Instruction::compute(Opcode::Fmul, 10, 0, 6),
            Instruction::compute(Opcode::Fadd, 6, 8, 2),
        ]);

    let outcome = ctx.run();

    assert!(outcome.is_complete());
    assert_eq!(outcome.cycles, 44);
    assert_eq!(ctx.reg(0), 10032);
    assert_eq!(ctx.reg(2), 114);
    assert_eq!(ctx.reg(4), 88);
    assert_eq!(ctx.reg(6), 239);
    assert_eq!(ctx.reg(8), 125);
    assert_eq!(ctx.reg(10), 110352);

    assert_eq!(ctx.timing(3), stamps(1, 2, 13, 13, 13));
    assert_eq!(ctx.timing(5), stamps(2, 14, 43, 43, 43));
    assert_eq!(ctx.timing(6), stamps(3, 8, 25, 25, 43));
    assert_eq!(TestContext::commit_order(&outcome), (0..7).collect::<Vec<_>>());
}

#[test]
fn runs_are_deterministic() {
    let build = || {
        TestContext::new()
            .registers(&[(1, 2), (2, 3)])
            .memory(&[(7, 11)])
            .program(vec![
                Instruction::load(3, 7),
                Instruction::compute(Opcode::Imul, 4, 3, 1),
                Instruction::compute(Opcode::Isub, 5, 4, 2),
                Instruction::store(5, 8),
                Instruction::compute(Opcode::Or, 6, 5, 3),
            ])
    };

    let first = build().run();
    let second = build().run();
    assert_eq!(first, second);
}

#[test]
fn empty_program_drains_immediately() {
    let mut ctx = TestContext::new().program(Vec::new());
    let outcome = ctx.run();
    assert!(outcome.is_complete());
    assert_eq!(outcome.cycles, 0);
    assert!(outcome.commit_log.is_empty());
}
