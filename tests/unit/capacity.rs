//! Structural limits: ROB capacity, station pools, pipeline widths.

use pretty_assertions::assert_eq;
use rstest::rstest;

use aca_tomasulo::cpu::{CpuConfig, PoolSizes};
use aca_tomasulo::instructions::{Instruction, Opcode};

use crate::common::{stamps, TestContext};

#[test]
fn full_rob_stalls_issue() {
    let config = CpuConfig {
        rob_size: 2,
        issue_width: 4,
        ..CpuConfig::default()
    };
    let mut ctx = TestContext::with_config(config)
        .memory(&[(1, 1), (2, 2), (3, 3)])
        .program(vec![
            Instruction::load(0, 1),
            Instruction::load(1, 2),
            Instruction::load(2, 3),
        ]);

    let outcome = ctx.run();

    assert_eq!(ctx.timing(2).issue, Some(1));
    assert_eq!(outcome.stats.rob_full_stalls, 1);
    assert_eq!(outcome.cycles, 2);
    assert_eq!((ctx.reg(0), ctx.reg(1), ctx.reg(2)), (1, 2, 3));
}

#[test]
fn issue_resumes_only_after_the_head_commits() {
    let config = CpuConfig {
        rob_size: 2,
        ..CpuConfig::default()
    };
    let mut ctx = TestContext::with_config(config)
        .registers(&[(4, 2)])
        .program(vec![
            Instruction::compute(Opcode::Fmul, 1, 4, 4),
            Instruction::add(2, 4, 4),
            Instruction::add(3, 4, 4),
        ]);

    let outcome = ctx.run();

    assert_eq!(ctx.timing(0).commit, Some(29));
    assert_eq!(ctx.timing(1).commit, Some(29));
    assert_eq!(ctx.timing(2).issue, Some(30));
    assert_eq!(outcome.stats.rob_full_stalls, 29);
    assert_eq!(ctx.reg(1), 4);
}

#[test]
fn station_is_exclusive_until_write_result() {
    let config = CpuConfig {
        pools: PoolSizes {
            int_add: 1,
            ..PoolSizes::default()
        },
        ..CpuConfig::default()
    };
    let mut ctx = TestContext::with_config(config)
        .registers(&[(2, 5)])
        .program(vec![Instruction::add(1, 2, 2), Instruction::add(3, 2, 2)]);

    let outcome = ctx.run();

    assert_eq!(ctx.timing(0), stamps(0, 0, 5, 5, 5));
    // reusable the cycle after it was freed
    assert_eq!(ctx.timing(1), stamps(6, 6, 11, 11, 11));
    assert_eq!(outcome.stats.station_stalls, 6);
    assert_eq!(outcome.cycles, 12);
}

#[rstest]
#[case(1, vec![0, 1, 2, 3])]
#[case(2, vec![0, 0, 1, 1])]
#[case(4, vec![0, 0, 1, 1])]
fn commit_width_bounds_retirement(#[case] width: usize, #[case] expected: Vec<u64>) {
    let config = CpuConfig {
        commit_width: width,
        ..CpuConfig::default()
    };
    let mut ctx = TestContext::with_config(config).program(vec![
        Instruction::load(0, 1),
        Instruction::load(1, 2),
        Instruction::load(2, 3),
        Instruction::load(3, 4),
    ]);

    let outcome = ctx.run();

    let commits: Vec<u64> = outcome.commit_log.iter().map(|r| r.commit_cycle).collect();
    assert_eq!(commits, expected);
}

#[test]
fn issue_width_bounds_dispatch() {
    let config = CpuConfig {
        issue_width: 1,
        ..CpuConfig::default()
    };
    let mut ctx = TestContext::with_config(config).program(vec![
        Instruction::nop(),
        Instruction::nop(),
        Instruction::nop(),
    ]);

    let outcome = ctx.run();

    let issues: Vec<_> = (0..3).map(|i| ctx.timing(i).issue).collect();
    assert_eq!(issues, vec![Some(0), Some(1), Some(2)]);
    assert_eq!(outcome.stats.instructions_issued, 3);
    assert_eq!(outcome.stats.instructions_commited, 3);
}

#[test]
fn busy_stations_are_never_shared() {
    let mut ctx = TestContext::new()
        .registers(&[(1, 1)])
        .program(vec![
            Instruction::add(2, 1, 1),
            Instruction::add(3, 1, 1),
            Instruction::add(4, 1, 1),
        ]);

    ctx.cpu.step().unwrap();
    assert_eq!(ctx.cpu.busy_stations(), vec!["IADD1", "IADD2"]);
    ctx.cpu.step().unwrap();
    // the third add has nowhere to go
    assert_eq!(ctx.cpu.pc(), 2);

    let outcome = ctx.run();
    assert!(outcome.is_complete());
    assert_eq!(ctx.timing(2).issue, Some(6));
}
