use super::*;
use crate::addressing::AddressingMode;
use crate::encoder::{write_hook, Assembler};
use crate::instructions::Opcode;
use crate::memory::{MemoryBin, MemoryContainer};
use std::sync::atomic::AtomicUsize;

const START: u32 = 0x1000;

fn machine(program: &[u8], config: InterpreterConfig) -> (Interpreter, MemoryBin) {
    let mem = MemoryContainer::new(0x2_0000).unwrap();
    mem.load(START as usize, program).unwrap();
    (Interpreter::new(Cpu::new(), config).unwrap(), mem.view())
}

fn sentinel_table() -> DispatchTable {
    DispatchTable::build(&[(0xEA, Opcode::Nop, AddressingMode::Implied)]).unwrap()
}

#[test]
fn test_run_ends_on_stp() {
    // LDA #5; STP
    let (interp, bus) = machine(&[0xA9, 0x05, 0xDB], InterpreterConfig::default());
    interp.run(bus, Some(START), false).unwrap();

    assert_eq!(interp.state(), RunState::Idle);
    assert_eq!(interp.stop_reason(), Some(StopReason::Stopped));
    let cpu = interp.cpu();
    assert_eq!(cpu.state.a, 5);
    assert_eq!(cpu.state.instructions, 2);
    assert_eq!(cpu.state.pc, 0x1003);
}

#[test]
fn test_run_once_executes_a_single_instruction() {
    let (interp, mut bus) = machine(&[0xEA, 0xE8], InterpreterConfig::default());

    let first = interp.run_once(&mut bus, Some(START)).unwrap().unwrap();
    assert_eq!(first.offset, START);
    assert_eq!(interp.cpu().state.pc, 0x1001);

    let second = interp.run_once(&mut bus, None).unwrap().unwrap();
    assert_eq!(second.instruction.opcode, Opcode::Inx);
    assert_eq!(interp.cpu().state.x, 1);
    assert_eq!(interp.state(), RunState::Idle);
}

#[test]
fn test_hook_sees_state_before_following_instructions() {
    let (interp, mut bus) = machine(&[], InterpreterConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(None));

    {
        let calls = calls.clone();
        let seen = seen.clone();
        let mut asm = Assembler::new(interp.table(), &mut bus, START);
        asm.imm8(Opcode::Lda, 0x2A).unwrap();
        asm.hook(
            &mut interp.cpu(),
            Box::new(move |ctx| {
                calls.fetch_add(1, Ordering::SeqCst);
                *seen.lock().unwrap() = Some((ctx.state.a, ctx.state.x));
            }),
        )
        .unwrap();
        asm.implied(Opcode::Inx).unwrap();
        asm.implied(Opcode::Stp).unwrap();
    }

    interp.run(bus, Some(START), false).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), Some((0x2A, 0)));
    assert_eq!(interp.cpu().state.x, 1);
}

#[test]
fn test_hook_can_cancel_inline_run() {
    let (interp, mut bus) = machine(&[], InterpreterConfig::default());
    let token = interp.cancel_token();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut offset = START;
    let counter = calls.clone();
    write_hook(
        interp.table(),
        &mut bus,
        &mut offset,
        &mut interp.cpu(),
        Box::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                token.cancel();
            }
        }),
    )
    .unwrap();
    // BRA back onto the hook
    bus.write_u16(offset, 0xFC80).unwrap();

    interp.run(bus, Some(START), false).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(interp.stop_reason(), Some(StopReason::Cancelled));
}

#[test]
fn test_concurrent_run_stops_on_request() {
    // BRA -2
    let (interp, bus) = machine(&[0x80, 0xFE], InterpreterConfig::default());
    interp.run(bus.clone(), Some(START), true).unwrap();
    assert_ne!(interp.state(), RunState::Idle);

    assert!(matches!(
        interp.run(bus.clone(), None, true),
        Err(CpuError::InvalidOperation(_))
    ));
    let mut once_bus = bus.clone();
    assert!(matches!(
        interp.run_once(&mut once_bus, None),
        Err(CpuError::InvalidOperation(_))
    ));

    interp.stop().unwrap();
    assert_eq!(interp.state(), RunState::Idle);
    assert_eq!(interp.stop_reason(), Some(StopReason::Cancelled));
    assert_eq!(interp.cpu().state.pc, 0x1000);

    // a finished interpreter can run again
    interp.run(bus, None, true).unwrap();
    interp.stop().unwrap();
}

#[test]
fn test_recorded_error_ends_run_quietly() {
    let mem = MemoryContainer::new(0x2_0000).unwrap();
    mem.load(START as usize, &[0xEA, 0x00]).unwrap();
    let interp = Interpreter::with_table(Cpu::new(), sentinel_table(), InterpreterConfig::default());

    interp.run(mem.view(), Some(START), false).unwrap();
    assert_eq!(interp.stop_reason(), Some(StopReason::Error));
    assert_eq!(
        interp.last_error(),
        Some(CpuError::UnrecognizedInstruction { opcode: 0x00 })
    );
    assert_eq!(interp.cpu().state.instructions, 1);
}

#[test]
fn test_propagated_error_reaches_caller() {
    let mem = MemoryContainer::new(0x2_0000).unwrap();
    mem.load(START as usize, &[0xEA, 0x00]).unwrap();
    let config = InterpreterConfig {
        error_policy: ErrorPolicy::Propagate,
        ..InterpreterConfig::default()
    };
    let interp = Interpreter::with_table(Cpu::new(), sentinel_table(), config);

    assert_eq!(
        interp.run(mem.view(), Some(START), false),
        Err(CpuError::UnrecognizedInstruction { opcode: 0x00 })
    );
    assert!(interp.take_last_error().is_some());
    assert!(interp.last_error().is_none());
    assert_eq!(interp.state(), RunState::Idle);
}

#[test]
fn test_run_once_respects_error_policy() {
    let mem = MemoryContainer::new(0x2_0000).unwrap();
    let mut bus = mem.view();
    let interp = Interpreter::with_table(Cpu::new(), sentinel_table(), InterpreterConfig::default());

    assert_eq!(interp.run_once(&mut bus, Some(START)), Ok(None));
    assert!(interp.last_error().is_some());
}

#[test]
fn test_trace_history_keeps_latest_entries() {
    let config = InterpreterConfig {
        history: 2,
        ..InterpreterConfig::default()
    };
    // NOP; INX; INY; STP
    let (interp, bus) = machine(&[0xEA, 0xE8, 0xC8, 0xDB], config);
    interp.run(bus, Some(START), false).unwrap();

    let trace = interp.trace();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].text, "INY");
    assert_eq!(trace[1].text, "STP");
    assert_eq!(trace[1].registers.y, 1);
}

#[test]
fn test_run_restarts_after_stp() {
    // STP; STP
    let (interp, bus) = machine(&[0xDB, 0xDB], InterpreterConfig::default());
    interp.run(bus.clone(), Some(START), false).unwrap();
    interp.run(bus, None, false).unwrap();
    assert_eq!(interp.cpu().state.pc, 0x1002);
    assert_eq!(interp.cpu().state.instructions, 2);
}

#[test]
fn test_uncollected_concurrent_error_surfaces_on_next_run() {
    let mem = MemoryContainer::new(0x2_0000).unwrap();
    mem.load(START as usize, &[0xEA, 0x00]).unwrap();
    let config = InterpreterConfig {
        error_policy: ErrorPolicy::Propagate,
        ..InterpreterConfig::default()
    };
    let interp = Interpreter::with_table(Cpu::new(), sentinel_table(), config);

    interp.run(mem.view(), Some(START), true).unwrap();
    while interp.state() != RunState::Idle {
        std::thread::yield_now();
    }

    assert_eq!(
        interp.run(mem.view(), Some(START), true),
        Err(CpuError::UnrecognizedInstruction { opcode: 0x00 })
    );
    assert_eq!(interp.state(), RunState::Idle);
    // the error was handed over once; nothing is left to collect
    assert_eq!(interp.wait(), Ok(()));
}
