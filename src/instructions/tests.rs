use super::*;
use crate::cpu::StatusFlags;
use crate::memory::{MemoryBin, MemoryContainer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const PROGRAM_START: u16 = 0x1000;

struct Machine {
    table: DispatchTable,
    cpu: Cpu,
    bus: MemoryBin,
    end: u16,
}

impl Machine {
    fn new(program: &[u8]) -> Self {
        let mem = MemoryContainer::new(0x2_0000).unwrap();
        mem.load(PROGRAM_START as usize, program).unwrap();
        let mut cpu = Cpu::new();
        cpu.state.pc = PROGRAM_START;
        Self {
            table: DispatchTable::standard().unwrap(),
            cpu,
            bus: mem.view(),
            end: PROGRAM_START + program.len() as u16,
        }
    }

    fn step(&mut self) -> Result<()> {
        let mut offset = self.cpu.state.pc as u32;
        let ctx = DecodeContext::from_state(&self.cpu.state);
        let record = self.table.decode_at(&self.bus, &mut offset, ctx)?;
        self.cpu.state.pc = offset as u16;
        record
            .instruction
            .execute(record.operand1, record.operand2, &mut self.cpu, &mut self.bus)
    }

    fn run(&mut self) {
        while (PROGRAM_START..self.end).contains(&self.cpu.state.pc) {
            self.step().unwrap();
        }
    }
}

#[test]
fn test_standard_table_maps_every_byte() {
    let table = DispatchTable::standard().unwrap();
    assert_eq!(table.registered(), 256);
    for code in 0..=255u8 {
        assert_eq!(table.get(code).code, code);
    }
    assert_eq!(table.get(0x42).opcode, Opcode::Wdm);
    assert_eq!(table.encodings_of(Opcode::Adc).count(), 15);
}

#[test]
fn test_every_entry_runs_on_fresh_processor() {
    let table = DispatchTable::standard().unwrap();
    for code in 0..=255u8 {
        let mem = MemoryContainer::new(0x2_0000).unwrap();
        mem.load(0, &[code]).unwrap();
        let mut bus = mem.view();
        let mut cpu = Cpu::new();

        let mut offset = 0;
        let record = table
            .decode_at(&bus, &mut offset, DecodeContext::from_state(&cpu.state))
            .unwrap();
        assert_eq!(offset as usize, record.len());

        let result = record
            .instruction
            .execute(record.operand1, record.operand2, &mut cpu, &mut bus);
        assert!(
            !matches!(
                result,
                Err(CpuError::InvalidOperation(_)) | Err(CpuError::NotSupported { .. })
            ),
            "{:02X} {} failed: {:?}",
            code,
            record.text(),
            result
        );
    }
}

#[test]
fn test_unmapped_byte_falls_back_to_sentinel() {
    let table = DispatchTable::build(&[(0xEA, Opcode::Nop, AddressingMode::Implied)]).unwrap();
    assert_eq!(table.registered(), 1);

    let sentinel = *table.get(0x00);
    assert!(!sentinel.is_valid());
    assert!(!sentinel.has_operands());
    assert_eq!(sentinel.format(0, 0, 0), ".byte $00");

    let mem = MemoryContainer::new(0x200).unwrap();
    let mut bus = mem.view();
    let mut cpu = Cpu::new();
    assert_eq!(
        sentinel.execute(0, 0, &mut cpu, &mut bus),
        Err(CpuError::UnrecognizedInstruction { opcode: 0x00 })
    );
}

#[test]
fn test_duplicate_registration_rejected() {
    let registry = [
        (0xEA, Opcode::Nop, AddressingMode::Implied),
        (0xEA, Opcode::Wai, AddressingMode::Implied),
    ];
    assert!(matches!(
        DispatchTable::build(&registry),
        Err(CpuError::InvalidOperation(_))
    ));
}

#[test]
fn test_find_by_opcode_and_mode() {
    let table = DispatchTable::standard().unwrap();
    let lda = table.find(Opcode::Lda, AddressingMode::Immediate).unwrap();
    assert_eq!(lda.code, 0xA9);
    assert!(table.find(Opcode::Lda, AddressingMode::BlockMove).is_none());
}

#[test]
fn test_immediate_width_follows_context() {
    let table = DispatchTable::standard().unwrap();
    let mem = MemoryContainer::new(0x200).unwrap();
    mem.load(0, &[0xA9, 0x34, 0x12, 0xA2, 0x78, 0x56]).unwrap();
    let bus = mem.view();

    let mut offset = 0;
    let lda = table
        .decode_at(&bus, &mut offset, DecodeContext::new(false, true))
        .unwrap();
    assert_eq!(lda.operand1, 0x1234);
    assert_eq!(offset, 3);

    let ldx = table
        .decode_at(&bus, &mut offset, DecodeContext::new(false, false))
        .unwrap();
    assert_eq!(ldx.operand1, 0x5678);
    assert_eq!(offset, 6);

    offset = 0;
    let short = table.decode_at(&bus, &mut offset, DecodeContext::default()).unwrap();
    assert_eq!(short.operand1, 0x34);
    assert_eq!(short.len(), 2);
}

#[test]
fn test_block_move_operand_order() {
    let table = DispatchTable::standard().unwrap();
    let mem = MemoryContainer::new(0x200).unwrap();
    // opcode, destination bank, source bank
    mem.load(0, &[0x54, 0x7F, 0x7E]).unwrap();

    let mut offset = 0;
    let record = table
        .decode_at(&mem.view(), &mut offset, DecodeContext::default())
        .unwrap();
    assert_eq!((record.operand1, record.operand2), (0x7E, 0x7F));
    assert_eq!(record.text(), "MVN $7E, $7F");
}

#[test]
fn test_adc_binary() {
    // LDA #0; CLC; ADC #24; ADC #26; ADC #0
    let mut m = Machine::new(&[0xA9, 0x00, 0x18, 0x69, 24, 0x69, 26, 0x69, 0]);
    m.run();
    let state = &m.cpu.state;
    assert_eq!(state.a, 50);
    assert!(!state.flag(StatusFlags::ZERO));
    assert!(!state.flag(StatusFlags::CARRY));
}

#[test]
fn test_adc_decimal_sequence() {
    // SED; LDA #0; CLC; ADC #$02; ADC #$0C; ADC #$09; ADC #$12; ADC #$80
    let mut m = Machine::new(&[
        0xF8, 0xA9, 0x00, 0x18, 0x69, 0x02, 0x69, 0x0C, 0x69, 0x09, 0x69, 0x12, 0x69, 0x80,
    ]);
    m.run();
    assert_eq!(m.cpu.state.a, 0x15);
    assert!(m.cpu.state.flag(StatusFlags::CARRY));
}

#[test]
fn test_adc_16bit_wraps_and_carries() {
    // CLC; XCE; REP #$20; LDA #$FFFF; CLC; ADC #$0001
    let mut m = Machine::new(&[
        0x18, 0xFB, 0xC2, 0x20, 0xA9, 0xFF, 0xFF, 0x18, 0x69, 0x01, 0x00,
    ]);
    m.run();
    let state = &m.cpu.state;
    assert!(!state.emulation_mode);
    assert_eq!(state.a, 0);
    assert!(state.flag(StatusFlags::CARRY));
    assert!(state.flag(StatusFlags::ZERO));
}

#[test]
fn test_sbc_binary_borrow() {
    // SEC; LDA #$50; SBC #$30
    let mut m = Machine::new(&[0x38, 0xA9, 0x50, 0xE9, 0x30]);
    m.run();
    assert_eq!(m.cpu.state.a, 0x20);
    assert!(m.cpu.state.flag(StatusFlags::CARRY));

    // SEC; LDA #$10; SBC #$20
    let mut m = Machine::new(&[0x38, 0xA9, 0x10, 0xE9, 0x20]);
    m.run();
    assert_eq!(m.cpu.state.a, 0xF0);
    assert!(!m.cpu.state.flag(StatusFlags::CARRY));
    assert!(m.cpu.state.flag(StatusFlags::NEGATIVE));
}

#[test]
fn test_sbc_decimal() {
    // SED; SEC; LDA #$42; SBC #$15
    let mut m = Machine::new(&[0xF8, 0x38, 0xA9, 0x42, 0xE9, 0x15]);
    m.run();
    assert_eq!(m.cpu.state.a, 0x27);
    assert!(m.cpu.state.flag(StatusFlags::CARRY));
}

#[test]
fn test_and_eor_leave_carry_and_overflow() {
    // SEC; LDA #$F0; AND #$0F
    let mut m = Machine::new(&[0x38, 0xA9, 0xF0, 0x29, 0x0F]);
    m.cpu.state.set_flag(StatusFlags::OVERFLOW, true);
    m.run();
    let state = &m.cpu.state;
    assert_eq!(state.a, 0);
    assert!(state.flag(StatusFlags::ZERO));
    assert!(state.flag(StatusFlags::CARRY));
    assert!(state.flag(StatusFlags::OVERFLOW));

    // LDA #$0F; EOR #$8F
    let mut m = Machine::new(&[0xA9, 0x0F, 0x49, 0x8F]);
    m.run();
    assert_eq!(m.cpu.state.a, 0x80);
    assert!(m.cpu.state.flag(StatusFlags::NEGATIVE));
    assert!(!m.cpu.state.flag(StatusFlags::ZERO));
}

#[test]
fn test_asl_accumulator_and_memory() {
    // LDA #$81; ASL A
    let mut m = Machine::new(&[0xA9, 0x81, 0x0A]);
    m.run();
    assert_eq!(m.cpu.state.a, 0x02);
    assert!(m.cpu.state.flag(StatusFlags::CARRY));

    // LDA #$40; STA $10; ASL $10
    let mut m = Machine::new(&[0xA9, 0x40, 0x85, 0x10, 0x06, 0x10]);
    m.run();
    assert_eq!(m.bus.read_u8(0x10).unwrap(), 0x80);
    assert!(m.cpu.state.flag(StatusFlags::NEGATIVE));
    assert!(!m.cpu.state.flag(StatusFlags::CARRY));
}

#[test]
fn test_branch_skips_when_taken() {
    // LDA #0; BEQ +2; LDA #1; NOP
    let mut m = Machine::new(&[0xA9, 0x00, 0xF0, 0x02, 0xA9, 0x01, 0xEA]);
    m.run();
    assert_eq!(m.cpu.state.a, 0);
}

#[test]
fn test_jsr_rts_round_trip() {
    let mut m = Machine::new(&[
        0x20, 0x07, 0x10, // JSR $1007
        0xA9, 0x01, // LDA #1
        0x80, 0x03, // BRA +3
        0xA2, 0x05, // LDX #5
        0x60, // RTS
    ]);
    m.run();
    let state = &m.cpu.state;
    assert_eq!(state.a, 1);
    assert_eq!(state.x, 5);
    assert_eq!(state.sp, 0x0100);
}

#[test]
fn test_rep_widens_index_immediates() {
    // CLC; XCE; REP #$30; LDX #$1234
    let mut m = Machine::new(&[0x18, 0xFB, 0xC2, 0x30, 0xA2, 0x34, 0x12]);
    m.run();
    assert_eq!(m.cpu.state.x, 0x1234);
    assert!(!m.cpu.state.index_is_8bit());
}

#[test]
fn test_stack_push_pull() {
    // LDA #$42; PHA; LDA #0; PLA
    let mut m = Machine::new(&[0xA9, 0x42, 0x48, 0xA9, 0x00, 0x68]);
    m.run();
    assert_eq!(m.cpu.state.a, 0x42);
    assert_eq!(m.cpu.state.sp, 0x0100);
}

#[test]
fn test_xba_swaps_with_hidden_b() {
    let mut m = Machine::new(&[0xEB]);
    m.cpu.state.a = 0x34;
    m.cpu.state.b = 0x12;
    m.run();
    assert_eq!(m.cpu.state.a, 0x12);
    assert_eq!(m.cpu.state.b, 0x34);
    assert!(!m.cpu.state.flag(StatusFlags::ZERO));
}

#[test]
fn test_brk_pushes_frame_and_vectors() {
    let mut m = Machine::new(&[0x00, 0x00]);
    m.bus.write_u16(0xFFFE, 0x4000).unwrap();
    m.run();

    let state = &m.cpu.state;
    assert_eq!(state.pc, 0x4000);
    assert_eq!(state.sp, 0x01FD);
    assert!(state.flag(StatusFlags::IRQ_DISABLE));
    assert_eq!(m.bus.read_u8(0x0100).unwrap(), 0x10);
    assert_eq!(m.bus.read_u8(0x01FF).unwrap(), 0x02);
    assert_ne!(m.bus.read_u8(0x01FE).unwrap() & 0x10, 0);
}

#[test]
fn test_mvn_repeats_until_count_wraps() {
    let mut m = Machine::new(&[0x54, 0x00, 0x00]);
    m.bus.write_block(0x2000, &[1, 2, 3]).unwrap();
    m.cpu.state.enter_native();
    m.cpu.state.clear_status_bits(0x30);
    m.cpu.state.a = 2;
    m.cpu.state.x = 0x2000;
    m.cpu.state.y = 0x3000;
    m.run();

    let mut copied = [0u8; 3];
    m.bus.read_block(0x3000, &mut copied).unwrap();
    assert_eq!(copied, [1, 2, 3]);
    assert_eq!(m.cpu.state.a, 0xFFFF);
    assert_eq!(m.cpu.state.x, 0x2003);
    assert_eq!(m.cpu.state.y, 0x3003);
}

#[test]
fn test_wdm_runs_registered_hook() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let mut m = Machine::new(&[0xA9, 0x07, 0x42, 0x01, 0x42, 0x00]);
    m.cpu
        .hooks_mut()
        .register(Box::new(move |ctx| {
            assert_eq!(ctx.state.a, 0x07);
            seen.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    m.run();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stp_and_wai_set_halt_flags() {
    let mut m = Machine::new(&[0xDB]);
    m.run();
    assert!(m.cpu.state.stopped);

    let mut m = Machine::new(&[0xCB]);
    m.run();
    assert!(m.cpu.state.waiting_for_irq);
}

#[test]
fn test_format_operand_syntax() {
    use AddressingMode::*;
    let text = |opcode, mode, op1, op2, len| Instruction::new(0, opcode, mode).format(op1, op2, len);

    assert_eq!(text(Opcode::Lda, Immediate, 0x42, 0, 1), "LDA #$42");
    assert_eq!(text(Opcode::Lda, Immediate, 0x1234, 0, 2), "LDA #$1234");
    assert_eq!(text(Opcode::Sta, AbsoluteIndexedX, 0x1234, 0, 2), "STA $1234, x");
    assert_eq!(text(Opcode::Lda, DirectIndirectIndexedLong, 0x12, 0, 1), "LDA [$12], y");
    assert_eq!(text(Opcode::Ora, StackRelativeIndirectIndexed, 0x03, 0, 1), "ORA ($03, s), y");
    assert_eq!(text(Opcode::Jml, AbsoluteIndirectLong, 0x1234, 0, 2), "JML [$1234]");
    assert_eq!(text(Opcode::Lda, AbsoluteLong, 0x7E_0010, 0, 3), "LDA $7E0010");
    assert_eq!(text(Opcode::Asl, Accumulator, 0, 0, 0), "ASL A");
    assert_eq!(text(Opcode::Clc, Implied, 0, 0, 0), "CLC");
}
