use super::{Instruction, Opcode};
use crate::addressing::{self, effective_address, AddressingMode};
use crate::cpu::{full_address, Cpu, CpuState, StatusFlags, STACK_PAGE};
use crate::cpu_bus::CpuBus;
use crate::error::{CpuError, Result};

const BRK_VECTOR_EMULATION: u32 = 0xFFFE;
const BRK_VECTOR_NATIVE: u32 = 0xFFE6;
const COP_VECTOR_EMULATION: u32 = 0xFFF4;
const COP_VECTOR_NATIVE: u32 = 0xFFE4;

pub(super) fn execute<B: CpuBus>(
    instruction: &Instruction,
    operand1: u32,
    operand2: u32,
    cpu: &mut Cpu,
    bus: &mut B,
) -> Result<()> {
    match instruction.opcode {
        Opcode::Wdm => {
            wdm(instruction, operand1, cpu);
            Ok(())
        }
        Opcode::Invalid => Err(CpuError::UnrecognizedInstruction {
            opcode: instruction.code,
        }),
        _ => execute_on_state(instruction, operand1, operand2, &mut cpu.state, bus),
    }
}

fn wdm(instruction: &Instruction, operand: u32, cpu: &mut Cpu) {
    let slot = operand as u8;
    if slot == 0 {
        return;
    }
    if !cpu.invoke_hook(slot as usize - 1, instruction, slot) {
        log::trace!("WDM #${:02X} with no hook registered", slot);
    }
}

fn execute_on_state<B: CpuBus>(
    instruction: &Instruction,
    operand1: u32,
    operand2: u32,
    state: &mut CpuState,
    bus: &mut B,
) -> Result<()> {
    use Opcode::*;

    let mode = instruction.mode;
    let op = operand1;

    match instruction.opcode {
        // Arithmetic and logic
        Adc => {
            let value = read_m(state, bus, mode, op)?;
            adc(state, value);
        }
        Sbc => {
            let value = read_m(state, bus, mode, op)?;
            sbc(state, value);
        }
        And => {
            let result = state.acc() & read_m(state, bus, mode, op)?;
            load_acc(state, result);
        }
        Eor => {
            let result = state.acc() ^ read_m(state, bus, mode, op)?;
            load_acc(state, result);
        }
        Ora => {
            let result = state.acc() | read_m(state, bus, mode, op)?;
            load_acc(state, result);
        }
        Bit => bit(state, bus, mode, op)?,
        Cmp => {
            let value = read_m(state, bus, mode, op)?;
            let (register, eight_bit) = (state.acc(), state.memory_is_8bit());
            compare(state, register, value, eight_bit);
        }
        Cpx => {
            let value = read_x(state, bus, mode, op)?;
            let (register, eight_bit) = (state.x_index(), state.index_is_8bit());
            compare(state, register, value, eight_bit);
        }
        Cpy => {
            let value = read_x(state, bus, mode, op)?;
            let (register, eight_bit) = (state.y_index(), state.index_is_8bit());
            compare(state, register, value, eight_bit);
        }

        // Shifts and read-modify-write
        Asl => modify_m(state, bus, mode, op, asl)?,
        Lsr => modify_m(state, bus, mode, op, lsr)?,
        Rol => modify_m(state, bus, mode, op, rol)?,
        Ror => modify_m(state, bus, mode, op, ror)?,
        Inc => modify_m(state, bus, mode, op, |s, v| {
            let result = v.wrapping_add(1) & mask_m(s);
            s.set_nz_m(result);
            result
        })?,
        Dec => modify_m(state, bus, mode, op, |s, v| {
            let result = v.wrapping_sub(1) & mask_m(s);
            s.set_nz_m(result);
            result
        })?,
        Tsb => modify_m(state, bus, mode, op, |s, v| {
            let a = s.acc();
            s.set_flag(StatusFlags::ZERO, v & a == 0);
            v | a
        })?,
        Trb => modify_m(state, bus, mode, op, |s, v| {
            let a = s.acc();
            s.set_flag(StatusFlags::ZERO, v & a == 0);
            v & !a
        })?,
        Inx => {
            state.set_x(state.x.wrapping_add(1));
            state.set_nz_x(state.x);
        }
        Iny => {
            state.set_y(state.y.wrapping_add(1));
            state.set_nz_x(state.y);
        }
        Dex => {
            state.set_x(state.x.wrapping_sub(1));
            state.set_nz_x(state.x);
        }
        Dey => {
            state.set_y(state.y.wrapping_sub(1));
            state.set_nz_x(state.y);
        }

        // Loads and stores
        Lda => {
            let value = read_m(state, bus, mode, op)?;
            load_acc(state, value);
        }
        Ldx => {
            let value = read_x(state, bus, mode, op)?;
            state.set_x(value);
            state.set_nz_x(state.x);
        }
        Ldy => {
            let value = read_x(state, bus, mode, op)?;
            state.set_y(value);
            state.set_nz_x(state.y);
        }
        Sta => write_m(state, bus, mode, op, state.acc())?,
        Stx => write_x(state, bus, mode, op, state.x_index())?,
        Sty => write_x(state, bus, mode, op, state.y_index())?,
        Stz => write_m(state, bus, mode, op, 0)?,

        // Branches and jumps
        Bcc => branch_if(state, bus, mode, op, |s| !s.flag(StatusFlags::CARRY))?,
        Bcs => branch_if(state, bus, mode, op, |s| s.flag(StatusFlags::CARRY))?,
        Bne => branch_if(state, bus, mode, op, |s| !s.flag(StatusFlags::ZERO))?,
        Beq => branch_if(state, bus, mode, op, |s| s.flag(StatusFlags::ZERO))?,
        Bpl => branch_if(state, bus, mode, op, |s| !s.flag(StatusFlags::NEGATIVE))?,
        Bmi => branch_if(state, bus, mode, op, |s| s.flag(StatusFlags::NEGATIVE))?,
        Bvc => branch_if(state, bus, mode, op, |s| !s.flag(StatusFlags::OVERFLOW))?,
        Bvs => branch_if(state, bus, mode, op, |s| s.flag(StatusFlags::OVERFLOW))?,
        Bra | Brl => branch_if(state, bus, mode, op, |_| true)?,
        Jmp => {
            state.pc = effective_address(mode, op, state, bus)? as u16;
        }
        Jml => {
            let target = effective_address(mode, op, state, bus)?;
            state.pb = (target >> 16) as u8;
            state.pc = target as u16;
        }
        Jsr => {
            let target = effective_address(mode, op, state, bus)?;
            let ret = state.pc.wrapping_sub(1);
            state.push_u16(bus, ret)?;
            state.pc = target as u16;
        }
        Jsl => {
            let ret = state.pc.wrapping_sub(1);
            let pb = state.pb;
            state.push_u8(bus, pb)?;
            state.push_u16(bus, ret)?;
            state.pb = (op >> 16) as u8;
            state.pc = op as u16;
        }
        Rts => {
            state.pc = state.pull_u16(bus)?.wrapping_add(1);
        }
        Rtl => {
            state.pc = state.pull_u16(bus)?.wrapping_add(1);
            state.pb = state.pull_u8(bus)?;
        }
        Rti => {
            let p = state.pull_u8(bus)?;
            state.set_status_byte(p);
            state.pc = state.pull_u16(bus)?;
            if !state.emulation_mode {
                state.pb = state.pull_u8(bus)?;
            }
        }
        Brk => interrupt(state, bus, true, BRK_VECTOR_EMULATION, BRK_VECTOR_NATIVE)?,
        Cop => interrupt(state, bus, false, COP_VECTOR_EMULATION, COP_VECTOR_NATIVE)?,

        // Stack
        Pha => {
            if state.memory_is_8bit() {
                state.push_u8(bus, state.acc() as u8)?;
            } else {
                state.push_u16(bus, state.acc())?;
            }
        }
        Phx => {
            let x = state.x_index();
            push_index(state, bus, x)?;
        }
        Phy => {
            let y = state.y_index();
            push_index(state, bus, y)?;
        }
        Phb => state.push_u8(bus, state.db)?,
        Phd => state.push_u16(bus, state.dp)?,
        Phk => state.push_u8(bus, state.pb)?,
        Php => {
            // PHP always pushes B set in emulation mode
            let p = if state.emulation_mode {
                state.status_byte() | 0x10
            } else {
                state.status_byte()
            };
            state.push_u8(bus, p)?;
        }
        Pla => {
            let value = if state.memory_is_8bit() {
                state.pull_u8(bus)? as u16
            } else {
                state.pull_u16(bus)?
            };
            load_acc(state, value);
        }
        Plx => {
            let value = pull_index(state, bus)?;
            state.set_x(value);
            state.set_nz_x(state.x);
        }
        Ply => {
            let value = pull_index(state, bus)?;
            state.set_y(value);
            state.set_nz_x(state.y);
        }
        Plb => {
            state.db = state.pull_u8(bus)?;
            state.set_nz_8(state.db);
        }
        Pld => {
            state.dp = state.pull_u16(bus)?;
            state.set_nz_16(state.dp);
        }
        Plp => {
            let p = state.pull_u8(bus)?;
            state.set_status_byte(p);
        }
        Pea => state.push_u16(bus, op as u16)?,
        Pei => {
            let value = bus.read_u16(addressing::direct(state, op))?;
            state.push_u16(bus, value)?;
        }
        Per => {
            let value = state.pc.wrapping_add(op as u16);
            state.push_u16(bus, value)?;
        }

        // Flags and modes
        Clc => state.set_flag(StatusFlags::CARRY, false),
        Sec => state.set_flag(StatusFlags::CARRY, true),
        Cld => state.set_flag(StatusFlags::DECIMAL, false),
        Sed => state.set_flag(StatusFlags::DECIMAL, true),
        Cli => state.set_flag(StatusFlags::IRQ_DISABLE, false),
        Sei => state.set_flag(StatusFlags::IRQ_DISABLE, true),
        Clv => state.set_flag(StatusFlags::OVERFLOW, false),
        Rep => state.clear_status_bits(op as u8),
        Sep => state.set_status_bits(op as u8),
        Xce => state.exchange_carry_emulation(),

        // Transfers
        Tax => {
            state.set_x(state.c());
            state.set_nz_x(state.x);
        }
        Tay => {
            state.set_y(state.c());
            state.set_nz_x(state.y);
        }
        Txa => {
            let x = state.x;
            load_acc(state, x);
        }
        Tya => {
            let y = state.y;
            load_acc(state, y);
        }
        Txy => {
            state.set_y(state.x);
            state.set_nz_x(state.y);
        }
        Tyx => {
            state.set_x(state.y);
            state.set_nz_x(state.x);
        }
        Tsx => {
            state.set_x(state.sp);
            state.set_nz_x(state.x);
        }
        Txs => state.sp = stack_pointer(state, state.x),
        Tcs => state.sp = stack_pointer(state, state.c()),
        Tsc => {
            state.set_c(state.sp);
            state.set_nz_16(state.sp);
        }
        Tcd => {
            state.dp = state.c();
            state.set_nz_16(state.dp);
        }
        Tdc => {
            state.set_c(state.dp);
            state.set_nz_16(state.dp);
        }
        Xba => {
            let swapped = state.c().swap_bytes();
            state.set_c(swapped);
            state.set_nz_8(swapped as u8);
        }

        // Block moves
        Mvn => block_move(state, bus, operand1, operand2, true)?,
        Mvp => block_move(state, bus, operand1, operand2, false)?,

        Stp => {
            state.stopped = true;
            log::debug!("STP at {:06X}", state.full_pc());
        }
        Wai => {
            state.waiting_for_irq = true;
            log::debug!("WAI at {:06X}", state.full_pc());
        }
        Nop => {}

        // Dispatched in `execute` where the hook table is reachable.
        Wdm | Invalid => {}
    }

    Ok(())
}

#[inline]
fn mask_m(state: &CpuState) -> u16 {
    if state.memory_is_8bit() {
        0x00FF
    } else {
        0xFFFF
    }
}

#[inline]
fn sign_m(state: &CpuState) -> u16 {
    if state.memory_is_8bit() {
        0x0080
    } else {
        0x8000
    }
}

fn load_acc(state: &mut CpuState, value: u16) {
    state.set_acc(value);
    let acc = state.acc();
    state.set_nz_m(acc);
}

fn read_m<B: CpuBus>(
    state: &CpuState,
    bus: &B,
    mode: AddressingMode,
    operand: u32,
) -> Result<u16> {
    if mode == AddressingMode::Immediate {
        return Ok(operand as u16 & mask_m(state));
    }
    let address = effective_address(mode, operand, state, bus)?;
    if state.memory_is_8bit() {
        Ok(bus.read_u8(address)? as u16)
    } else {
        bus.read_u16(address)
    }
}

fn read_x<B: CpuBus>(
    state: &CpuState,
    bus: &B,
    mode: AddressingMode,
    operand: u32,
) -> Result<u16> {
    if mode == AddressingMode::Immediate {
        return Ok(state.index(operand as u16));
    }
    let address = effective_address(mode, operand, state, bus)?;
    if state.index_is_8bit() {
        Ok(bus.read_u8(address)? as u16)
    } else {
        bus.read_u16(address)
    }
}

fn write_m<B: CpuBus>(
    state: &CpuState,
    bus: &mut B,
    mode: AddressingMode,
    operand: u32,
    value: u16,
) -> Result<()> {
    let address = effective_address(mode, operand, state, bus)?;
    if state.memory_is_8bit() {
        bus.write_u8(address, value as u8)
    } else {
        bus.write_u16(address, value)
    }
}

fn write_x<B: CpuBus>(
    state: &CpuState,
    bus: &mut B,
    mode: AddressingMode,
    operand: u32,
    value: u16,
) -> Result<()> {
    let address = effective_address(mode, operand, state, bus)?;
    if state.index_is_8bit() {
        bus.write_u8(address, value as u8)
    } else {
        bus.write_u16(address, value)
    }
}

/// Read-modify-write at accumulator width, on ACC itself or on memory.
fn modify_m<B, F>(
    state: &mut CpuState,
    bus: &mut B,
    mode: AddressingMode,
    operand: u32,
    f: F,
) -> Result<()>
where
    B: CpuBus,
    F: FnOnce(&mut CpuState, u16) -> u16,
{
    if mode == AddressingMode::Accumulator {
        let value = state.acc();
        let result = f(state, value);
        state.set_acc(result);
        return Ok(());
    }

    let address = effective_address(mode, operand, state, bus)?;
    if state.memory_is_8bit() {
        let value = bus.read_u8(address)? as u16;
        let result = f(state, value);
        bus.write_u8(address, result as u8)
    } else {
        let value = bus.read_u16(address)?;
        let result = f(state, value);
        bus.write_u16(address, result)
    }
}

/// Decimal adjust: every nibble above 9 gets 6 added.
fn decimal_adjust(mut sum: u32, bits: u32) -> u32 {
    for shift in (0..bits).step_by(4) {
        if (sum >> shift) & 0x0F > 9 {
            sum += 6u32 << shift;
        }
    }
    sum
}

/// ADC. Carry and Overflow both report that the sum exceeded the active
/// width before it was wrapped.
fn adc(state: &mut CpuState, operand: u16) {
    let (bits, max) = if state.memory_is_8bit() {
        (8, 0xFFu32)
    } else {
        (16, 0xFFFFu32)
    };
    let carry_in = state.flag(StatusFlags::CARRY) as u32;

    let mut sum = state.acc() as u32 + (operand as u32 & max) + carry_in;
    if state.flag(StatusFlags::DECIMAL) {
        sum = decimal_adjust(sum, bits);
    }

    let exceeded = sum > max;
    state.set_flag(StatusFlags::CARRY, exceeded);
    state.set_flag(StatusFlags::OVERFLOW, exceeded);
    load_acc(state, (sum & max) as u16);
}

#[inline]
fn bcd_sbc8(a: u8, b: u8, borrow_in: u8) -> (u8, bool) {
    let mut low = (a & 0x0F) as i16 - (b & 0x0F) as i16 - borrow_in as i16;
    let mut borrow = 0i16;
    if low < 0 {
        low += 10;
        borrow = 1;
    }
    let mut high = (a >> 4) as i16 - (b >> 4) as i16 - borrow;
    let mut borrow_high = 0i16;
    if high < 0 {
        high += 10;
        borrow_high = 1;
    }
    let result = ((high as u8) << 4) | (low as u8 & 0x0F);
    (result, borrow_high == 0)
}

fn sbc(state: &mut CpuState, operand: u16) {
    let borrow_in = !state.flag(StatusFlags::CARRY) as u8;
    let decimal = state.flag(StatusFlags::DECIMAL);

    if state.memory_is_8bit() {
        let a = state.acc() as u8;
        let b = operand as u8;
        let binary = a as i16 - b as i16 - borrow_in as i16;
        let result8 = binary as u8;
        let overflow = ((a ^ b) & (a ^ result8) & 0x80) != 0;
        let (result, carry) = if decimal {
            bcd_sbc8(a, b, borrow_in)
        } else {
            (result8, binary >= 0)
        };
        state.set_flag(StatusFlags::CARRY, carry);
        state.set_flag(StatusFlags::OVERFLOW, overflow);
        load_acc(state, result as u16);
    } else {
        let a = state.acc();
        let b = operand;
        let binary = a as i32 - b as i32 - borrow_in as i32;
        let result16 = binary as u16;
        let overflow = ((a ^ b) & (a ^ result16) & 0x8000) != 0;
        let (result, carry) = if decimal {
            let (lo, carry_lo) = bcd_sbc8(a as u8, b as u8, borrow_in);
            let (hi, carry_hi) = bcd_sbc8((a >> 8) as u8, (b >> 8) as u8, (!carry_lo) as u8);
            (((hi as u16) << 8) | lo as u16, carry_hi)
        } else {
            (result16, binary >= 0)
        };
        state.set_flag(StatusFlags::CARRY, carry);
        state.set_flag(StatusFlags::OVERFLOW, overflow);
        load_acc(state, result);
    }
}

fn bit<B: CpuBus>(
    state: &mut CpuState,
    bus: &B,
    mode: AddressingMode,
    operand: u32,
) -> Result<()> {
    let value = read_m(state, bus, mode, operand)?;
    let sign = sign_m(state);
    state.set_flag(StatusFlags::ZERO, state.acc() & value == 0);
    // BIT #imm only touches Z
    if mode != AddressingMode::Immediate {
        state.set_flag(StatusFlags::NEGATIVE, value & sign != 0);
        state.set_flag(StatusFlags::OVERFLOW, value & (sign >> 1) != 0);
    }
    Ok(())
}

fn compare(state: &mut CpuState, register: u16, value: u16, eight_bit: bool) {
    let result = register.wrapping_sub(value);
    state.set_flag(StatusFlags::CARRY, register >= value);
    if eight_bit {
        state.set_nz_8(result as u8);
    } else {
        state.set_nz_16(result);
    }
}

fn asl(state: &mut CpuState, value: u16) -> u16 {
    state.set_flag(StatusFlags::CARRY, value & sign_m(state) != 0);
    let result = (value << 1) & mask_m(state);
    state.set_nz_m(result);
    result
}

fn lsr(state: &mut CpuState, value: u16) -> u16 {
    state.set_flag(StatusFlags::CARRY, value & 1 != 0);
    let result = (value & mask_m(state)) >> 1;
    state.set_nz_m(result);
    result
}

fn rol(state: &mut CpuState, value: u16) -> u16 {
    let carry_in = state.flag(StatusFlags::CARRY) as u16;
    state.set_flag(StatusFlags::CARRY, value & sign_m(state) != 0);
    let result = ((value << 1) | carry_in) & mask_m(state);
    state.set_nz_m(result);
    result
}

fn ror(state: &mut CpuState, value: u16) -> u16 {
    let carry_in = if state.flag(StatusFlags::CARRY) {
        sign_m(state)
    } else {
        0
    };
    state.set_flag(StatusFlags::CARRY, value & 1 != 0);
    let result = ((value & mask_m(state)) >> 1) | carry_in;
    state.set_nz_m(result);
    result
}

fn branch_if<B: CpuBus>(
    state: &mut CpuState,
    bus: &B,
    mode: AddressingMode,
    operand: u32,
    condition: impl Fn(&CpuState) -> bool,
) -> Result<()> {
    if condition(&*state) {
        state.pc = effective_address(mode, operand, state, bus)? as u16;
    }
    Ok(())
}

fn push_index<B: CpuBus>(state: &mut CpuState, bus: &mut B, value: u16) -> Result<()> {
    if state.index_is_8bit() {
        state.push_u8(bus, value as u8)
    } else {
        state.push_u16(bus, value)
    }
}

fn pull_index<B: CpuBus>(state: &mut CpuState, bus: &mut B) -> Result<u16> {
    if state.index_is_8bit() {
        Ok(state.pull_u8(bus)? as u16)
    } else {
        state.pull_u16(bus)
    }
}

/// TXS/TCS target: page 1 in emulation mode, the full value otherwise.
fn stack_pointer(state: &CpuState, value: u16) -> u16 {
    if state.emulation_mode {
        STACK_PAGE | (value & 0x00FF)
    } else {
        value
    }
}

/// BRK/COP: push (PBR,) PC and P, then jump through the mode's vector.
fn interrupt<B: CpuBus>(
    state: &mut CpuState,
    bus: &mut B,
    brk: bool,
    emulation_vector: u32,
    native_vector: u32,
) -> Result<()> {
    if !state.emulation_mode {
        let pb = state.pb;
        state.push_u8(bus, pb)?;
    }
    let pc = state.pc;
    state.push_u16(bus, pc)?;
    if state.emulation_mode {
        state.break_flag = brk;
    }
    let p = state.status_byte();
    state.push_u8(bus, p)?;

    state.set_flag(StatusFlags::IRQ_DISABLE, true);
    state.set_flag(StatusFlags::DECIMAL, false);
    state.pb = 0;
    let vector = if state.emulation_mode {
        emulation_vector
    } else {
        native_vector
    };
    state.pc = bus.read_u16(vector)?;
    log::trace!("{} through vector {:04X}", if brk { "BRK" } else { "COP" }, vector);
    Ok(())
}

/// One byte of MVN/MVP. PC is rewound onto the instruction until the count
/// in C wraps past zero.
fn block_move<B: CpuBus>(
    state: &mut CpuState,
    bus: &mut B,
    source_bank: u32,
    destination_bank: u32,
    ascending: bool,
) -> Result<()> {
    let source = full_address(source_bank as u8, state.x_index());
    let destination = full_address(destination_bank as u8, state.y_index());
    let byte = bus.read_u8(source)?;
    bus.write_u8(destination, byte)?;
    state.db = destination_bank as u8;

    if ascending {
        state.set_x(state.x.wrapping_add(1));
        state.set_y(state.y.wrapping_add(1));
    } else {
        state.set_x(state.x.wrapping_sub(1));
        state.set_y(state.y.wrapping_sub(1));
    }

    let count = state.c().wrapping_sub(1);
    state.set_c(count);
    if count != 0xFFFF {
        state.pc = state.pc.wrapping_sub(3);
    }
    Ok(())
}
