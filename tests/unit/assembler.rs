//! Text programs through the whole engine.

use pretty_assertions::assert_eq;

use aca_tomasulo::assembler::{assemble, AssembleError};
use aca_tomasulo::cpu::{Cpu, CpuConfig};
use aca_tomasulo::error::EngineError;

const PROGRAM: &str = "
// doubles a value and stores it next to the original
.registers
R5: 3
.memory
40: 7
.instructions
LD R0, 40
IADD R1, R0, R0
IMUL R2, R1, R5   # 42
ST 41, R2
NOP
";

#[test]
fn assembled_program_runs() {
    let program = assemble(PROGRAM).unwrap();
    let mut cpu = Cpu::new(CpuConfig::default()).unwrap();
    for &(reg, value) in &program.registers {
        cpu.set_register(reg, value).unwrap();
    }
    for &(addr, value) in &program.memory {
        cpu.set_memory(addr, value).unwrap();
    }
    cpu.load_program(&program.instructions).unwrap();

    let outcome = cpu.run().unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.commit_log.len(), 5);
    assert_eq!(cpu.registers().get(2), 42);
    assert_eq!(cpu.memory().read(41), Ok(42));
    let text: Vec<String> = cpu.instructions().iter().map(|i| i.to_string()).collect();
    assert_eq!(
        text,
        vec!["LD R0, 40", "IADD R1, R0, R0", "IMUL R2, R1, R5", "ST 41, R2", "NOP"]
    );
}

#[test]
fn ranges_are_checked_at_load() {
    // the assembler accepts any index, the engine does not
    let program = assemble("LD R40, 3").unwrap();
    let mut cpu = Cpu::new(CpuConfig::default()).unwrap();
    assert_eq!(
        cpu.load_program(&program.instructions),
        Err(EngineError::InvalidRegister {
            position: 0,
            register: 40
        })
    );
}

#[test]
fn syntax_errors_name_the_line() {
    let err = assemble(".memory\n4: x\n").unwrap_err();
    assert!(matches!(err, AssembleError::Syntax { line: 2, .. }));
    assert_eq!(
        err.to_string(),
        "line 2: expected `index: value`, found `4: x`"
    );
}
