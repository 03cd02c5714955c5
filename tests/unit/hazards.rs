//! Renaming, forwarding and broadcast ordering.

use pretty_assertions::assert_eq;
use rstest::rstest;

use aca_tomasulo::common_data_bus::BroadcastPolicy;
use aca_tomasulo::cpu::CpuConfig;
use aca_tomasulo::instructions::{Instruction, Opcode};

use crate::common::{stamps, TestContext};

#[test]
fn later_writer_wins_even_when_it_finishes_first() {
    let mut ctx = TestContext::new()
        .registers(&[(1, 3), (3, 9)])
        .program(vec![
            Instruction::multiply(2, 1, 1),
            Instruction::add(2, 3, 3),
            Instruction::add(4, 2, 0),
        ]);

    let outcome = ctx.run();

    assert_eq!(ctx.reg(2), 18);
    // the reader was renamed onto the younger writer
    assert_eq!(ctx.reg(4), 18);
    assert_eq!(ctx.timing(1), stamps(0, 0, 5, 5, 11));
    assert_eq!(ctx.timing(2), stamps(1, 6, 11, 11, 12));
    assert_eq!(TestContext::commit_order(&outcome), vec![0, 1, 2]);
    assert_eq!(outcome.cycles, 13);
}

#[test]
fn reader_tracks_the_later_of_two_loads() {
    let mut ctx = TestContext::new()
        .memory(&[(40, 7), (41, 9)])
        .program(vec![
            Instruction::load(0, 40),
            Instruction::load(0, 41),
            Instruction::add(2, 0, 0),
        ]);

    let outcome = ctx.run();

    assert_eq!(ctx.reg(0), 9);
    assert_eq!(ctx.reg(2), 18);
    let values: Vec<i64> = outcome.commit_log.iter().map(|r| r.value).collect();
    assert_eq!(values, vec![7, 9, 18]);
}

#[test]
fn commit_is_in_program_order() {
    let mut ctx = TestContext::new()
        .registers(&[(1, 2)])
        .program(vec![
            Instruction::compute(Opcode::Fmul, 2, 1, 1),
            Instruction::compute(Opcode::And, 3, 1, 1),
            Instruction::add(4, 1, 1),
            Instruction::nop(),
        ]);

    let outcome = ctx.run();

    let commits: Vec<u64> = outcome.commit_log.iter().map(|r| r.commit_cycle).collect();
    assert_eq!(TestContext::commit_order(&outcome), vec![0, 1, 2, 3]);
    assert!(commits.windows(2).all(|w| w[0] <= w[1]));
    // everything younger waits for the multiply at the head
    assert!(commits.iter().all(|&c| c >= 29));
    for record in &outcome.commit_log {
        assert!(record.write_result_cycle <= record.commit_cycle);
    }
}

fn stale_read_program(forwarding: bool) -> TestContext {
    let config = CpuConfig {
        rob_forwarding: forwarding,
        ..CpuConfig::default()
    };
    TestContext::with_config(config)
        .registers(&[(1, 100), (2, 4), (6, 1)])
        .program(vec![
            Instruction::compute(Opcode::Fmul, 5, 6, 6),
            Instruction::add(1, 2, 2),
            Instruction::add(7, 2, 2),
            // no add station is free until R1 has broadcast, but R1 only
            // commits behind the multiply
            Instruction::add(3, 1, 1),
        ])
}

#[rstest]
#[case::forwarding(true, 16)]
#[case::register_file_only(false, 200)]
fn reads_between_broadcast_and_commit(#[case] forwarding: bool, #[case] expected: i64) {
    let mut ctx = stale_read_program(forwarding);

    let outcome = ctx.run();

    assert!(outcome.is_complete());
    assert_eq!(ctx.timing(3).issue, Some(6));
    assert_eq!(ctx.reg(1), 8);
    assert_eq!(ctx.reg(3), expected);
    assert_eq!(outcome.stats.station_stalls, 5);
}

#[rstest]
#[case::unlimited(BroadcastPolicy::Unlimited, [0, 0], 1)]
#[case::single_bus(BroadcastPolicy::SingleBus, [0, 1], 2)]
fn broadcast_policy(
    #[case] broadcast: BroadcastPolicy,
    #[case] writes: [u64; 2],
    #[case] cycles: u64,
) {
    let config = CpuConfig {
        broadcast,
        ..CpuConfig::default()
    };
    let mut ctx = TestContext::with_config(config)
        .memory(&[(1, 10), (2, 20)])
        .program(vec![Instruction::load(0, 1), Instruction::load(1, 2)]);

    let outcome = ctx.run();

    assert_eq!(ctx.timing(0).execute_complete, Some(0));
    assert_eq!(ctx.timing(1).execute_complete, Some(0));
    assert_eq!(
        [ctx.timing(0).write_result, ctx.timing(1).write_result],
        writes.map(Some)
    );
    assert_eq!(outcome.cycles, cycles);
    assert_eq!(outcome.stats.broadcasts, 2);
    assert_eq!((ctx.reg(0), ctx.reg(1)), (10, 20));
}

#[test]
fn single_bus_queues_later_completions() {
    let config = CpuConfig {
        broadcast: BroadcastPolicy::SingleBus,
        ..CpuConfig::default()
    };
    let mut ctx = TestContext::with_config(config)
        .memory(&[(1, 10), (2, 20)])
        .program(vec![
            Instruction::load(0, 1),
            Instruction::load(1, 2),
            Instruction::compute(Opcode::And, 3, 0, 0),
        ]);

    let outcome = ctx.run();

    assert_eq!(ctx.timing(1).write_result, Some(1));
    // finished in cycle 1 but the bus belongs to the second load
    assert_eq!(ctx.timing(2), stamps(1, 1, 1, 2, 2));
    assert_eq!(ctx.reg(3), 10);
    assert_eq!(outcome.cycles, 3);
}
