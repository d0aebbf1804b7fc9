//! 65C816 register file, status flags and the emulation/native mode protocol.

mod hooks;


pub use hooks::{HookContext, HookFn, HookTable, HOOK_SLOTS};

use bitflags::bitflags;

use crate::cpu_bus::CpuBus;
use crate::error::Result;
use crate::instructions::Instruction;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const CARRY = 0x01;
        const ZERO = 0x02;
        const IRQ_DISABLE = 0x04;
        const DECIMAL = 0x08;
        const INDEX_8BIT = 0x10;
        const MEMORY_8BIT = 0x20;
        const OVERFLOW = 0x40;
        const NEGATIVE = 0x80;
    }
}

/// Emulation-mode stack page.
pub const STACK_PAGE: u16 = 0x0100;

/// Registers and flags of one processor.
///
/// In emulation mode `a` only holds the low byte of the accumulator; the high
/// byte lives in the hidden `b` register. In native mode `a` is the full 16-bit
/// accumulator and `b` is unused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuState {
    pub a: u16,
    pub b: u8,
    pub x: u16,
    pub y: u16,
    pub sp: u16,
    pub dp: u16,
    pub db: u8,
    pub pb: u8,
    pub pc: u16,
    pub p: StatusFlags,
    pub emulation_mode: bool,
    /// Break flag, only meaningful in emulation mode where bit 4 of P is not X.
    pub break_flag: bool,
    pub waiting_for_irq: bool,
    pub stopped: bool,
    pub instructions: u64,
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuState {
    /// Power-on state.
    pub fn new() -> Self {
        Self {
            a: 0,
            b: 0,
            x: 0,
            y: 0,
            sp: STACK_PAGE,
            dp: 0,
            db: 0,
            pb: 0,
            pc: 0,
            p: StatusFlags::MEMORY_8BIT | StatusFlags::INDEX_8BIT,
            emulation_mode: true,
            break_flag: false,
            waiting_for_irq: false,
            stopped: false,
            instructions: 0,
        }
    }

    #[inline]
    pub fn memory_is_8bit(&self) -> bool {
        self.emulation_mode || self.p.contains(StatusFlags::MEMORY_8BIT)
    }

    #[inline]
    pub fn index_is_8bit(&self) -> bool {
        self.emulation_mode || self.p.contains(StatusFlags::INDEX_8BIT)
    }

    #[inline]
    pub fn flag(&self, flag: StatusFlags) -> bool {
        self.p.contains(flag)
    }

    #[inline]
    pub fn set_flag(&mut self, flag: StatusFlags, value: bool) {
        self.p.set(flag, value);
    }

    /// Bank 0 program counter combined with the program bank.
    #[inline]
    pub fn full_pc(&self) -> u32 {
        full_address(self.pb, self.pc)
    }

    /// The 16-bit accumulator (B:A in emulation mode).
    pub fn c(&self) -> u16 {
        if self.emulation_mode {
            ((self.b as u16) << 8) | (self.a & 0x00FF)
        } else {
            self.a
        }
    }

    pub fn set_c(&mut self, value: u16) {
        if self.emulation_mode {
            self.b = (value >> 8) as u8;
            self.a = value & 0x00FF;
        } else {
            self.a = value;
        }
    }

    /// Accumulator value at the active width.
    pub fn acc(&self) -> u16 {
        if self.memory_is_8bit() {
            self.a & 0x00FF
        } else {
            self.a
        }
    }

    /// Stores into the accumulator at the active width, keeping the hidden high byte.
    pub fn set_acc(&mut self, value: u16) {
        if self.memory_is_8bit() {
            self.a = (self.a & 0xFF00) | (value & 0x00FF);
        } else {
            self.a = value;
        }
    }

    /// Index register value with the width rule applied.
    pub fn index(&self, value: u16) -> u16 {
        if self.index_is_8bit() {
            value & 0x00FF
        } else {
            value
        }
    }

    pub fn x_index(&self) -> u16 {
        self.index(self.x)
    }

    pub fn y_index(&self) -> u16 {
        self.index(self.y)
    }

    pub fn set_x(&mut self, value: u16) {
        self.x = self.index(value);
    }

    pub fn set_y(&mut self, value: u16) {
        self.y = self.index(value);
    }

    pub fn set_nz_8(&mut self, value: u8) {
        self.p.set(StatusFlags::NEGATIVE, value & 0x80 != 0);
        self.p.set(StatusFlags::ZERO, value == 0);
    }

    pub fn set_nz_16(&mut self, value: u16) {
        self.p.set(StatusFlags::NEGATIVE, value & 0x8000 != 0);
        self.p.set(StatusFlags::ZERO, value == 0);
    }

    /// N/Z from a value at accumulator width.
    pub fn set_nz_m(&mut self, value: u16) {
        if self.memory_is_8bit() {
            self.set_nz_8(value as u8);
        } else {
            self.set_nz_16(value);
        }
    }

    /// N/Z from a value at index width.
    pub fn set_nz_x(&mut self, value: u16) {
        if self.index_is_8bit() {
            self.set_nz_8(value as u8);
        } else {
            self.set_nz_16(value);
        }
    }

    /// Emulation → native. Carry takes the old E; M and X are forced to 8-bit.
    pub fn enter_native(&mut self) {
        let old_e = self.emulation_mode;
        self.p.set(StatusFlags::CARRY, old_e);
        if old_e {
            self.a = ((self.b as u16) << 8) | (self.a & 0x00FF);
        }
        self.emulation_mode = false;
        self.p.insert(StatusFlags::MEMORY_8BIT | StatusFlags::INDEX_8BIT);
        log::debug!("entered native mode at {:06X}", self.full_pc());
    }

    /// Native → emulation. Carry takes the old E; index registers and the
    /// accumulator are cut to 8 bits (the accumulator high byte moves to B) and
    /// the stack returns to page 1.
    pub fn enter_emulation(&mut self) {
        let old_e = self.emulation_mode;
        self.p.set(StatusFlags::CARRY, old_e);
        if !old_e {
            self.b = (self.a >> 8) as u8;
            self.a &= 0x00FF;
        }
        self.emulation_mode = true;
        self.x &= 0x00FF;
        self.y &= 0x00FF;
        self.sp = STACK_PAGE;
        self.p.insert(StatusFlags::MEMORY_8BIT | StatusFlags::INDEX_8BIT);
        log::debug!("entered emulation mode at {:06X}", self.full_pc());
    }

    /// XCE: swaps carry and E, running a mode transition only when E changes.
    pub fn exchange_carry_emulation(&mut self) {
        let carry = self.flag(StatusFlags::CARRY);
        match (self.emulation_mode, carry) {
            (true, false) => self.enter_native(),
            (false, true) => self.enter_emulation(),
            (e, _) => self.p.set(StatusFlags::CARRY, e),
        }
    }

    /// P as pushed on the stack. In emulation mode bit 5 reads as 1 and bit 4
    /// carries the break flag.
    pub fn status_byte(&self) -> u8 {
        if self.emulation_mode {
            let brk = if self.break_flag { 0x10 } else { 0 };
            (self.p.bits() & !0x30) | 0x20 | brk
        } else {
            self.p.bits()
        }
    }

    /// Restores P from a pulled byte, keeping the width invariants.
    pub fn set_status_byte(&mut self, value: u8) {
        if self.emulation_mode {
            self.break_flag = value & 0x10 != 0;
            self.p = StatusFlags::from_bits_truncate(value)
                | StatusFlags::MEMORY_8BIT
                | StatusFlags::INDEX_8BIT;
        } else {
            self.p = StatusFlags::from_bits_truncate(value);
        }
        self.apply_index_width();
    }

    /// REP: clears the given P bits (M/X cannot be cleared in emulation mode).
    pub fn clear_status_bits(&mut self, mask: u8) {
        let mut cleared = StatusFlags::from_bits_truncate(mask);
        if self.emulation_mode {
            cleared.remove(StatusFlags::MEMORY_8BIT | StatusFlags::INDEX_8BIT);
        }
        self.p.remove(cleared);
    }

    /// SEP: sets the given P bits.
    pub fn set_status_bits(&mut self, mask: u8) {
        self.p.insert(StatusFlags::from_bits_truncate(mask));
        self.apply_index_width();
    }

    // Switching to 8-bit indices drops the high bytes of X and Y.
    fn apply_index_width(&mut self) {
        if self.index_is_8bit() {
            self.x &= 0x00FF;
            self.y &= 0x00FF;
        }
    }

    /// Stack pointer after wrapping it the way the current mode requires.
    fn stack_wrap(&self, sp: u16) -> u16 {
        if self.emulation_mode {
            STACK_PAGE | (sp & 0x00FF)
        } else {
            sp
        }
    }

    pub fn push_u8<B: CpuBus>(&mut self, bus: &mut B, value: u8) -> Result<()> {
        let addr = self.stack_wrap(self.sp);
        bus.write_u8(addr as u32, value)?;
        self.sp = self.stack_wrap(self.sp.wrapping_sub(1));
        Ok(())
    }

    pub fn push_u16<B: CpuBus>(&mut self, bus: &mut B, value: u16) -> Result<()> {
        self.push_u8(bus, (value >> 8) as u8)?;
        self.push_u8(bus, (value & 0xFF) as u8)
    }

    pub fn pull_u8<B: CpuBus>(&mut self, bus: &mut B) -> Result<u8> {
        self.sp = self.stack_wrap(self.sp.wrapping_add(1));
        bus.read_u8(self.sp as u32)
    }

    pub fn pull_u16<B: CpuBus>(&mut self, bus: &mut B) -> Result<u16> {
        let lo = self.pull_u8(bus)? as u16;
        let hi = self.pull_u8(bus)? as u16;
        Ok((hi << 8) | lo)
    }
}

#[inline]
pub fn full_address(bank: u8, offset: u16) -> u32 {
    ((bank as u32) << 16) | (offset as u32)
}

/// Operand-width flags captured right before an instruction is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeContext {
    /// 8-bit accumulator / memory.
    pub m: bool,
    /// 8-bit index registers.
    pub x: bool,
}

impl Default for DecodeContext {
    fn default() -> Self {
        Self { m: true, x: true }
    }
}

impl DecodeContext {
    pub fn new(m: bool, x: bool) -> Self {
        Self { m, x }
    }

    pub fn from_state(state: &CpuState) -> Self {
        Self {
            m: state.memory_is_8bit(),
            x: state.index_is_8bit(),
        }
    }
}

/// A processor: register file plus its instrumentation hook slots.
pub struct Cpu {
    pub state: CpuState,
    hooks: HookTable,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            state: CpuState::new(),
            hooks: HookTable::new(),
        }
    }

    /// Power-on reset of the registers. Registered hooks survive.
    pub fn reset(&mut self) {
        self.state = CpuState::new();
    }

    pub fn state(&self) -> &CpuState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut CpuState {
        &mut self.state
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookTable {
        &mut self.hooks
    }

    /// Runs the hook in `index` (zero-based) if one is registered.
    pub(crate) fn invoke_hook(
        &mut self,
        index: usize,
        instruction: &Instruction,
        slot: u8,
    ) -> bool {
        let Cpu { state, hooks } = self;
        let ctx = HookContext {
            slot,
            instruction,
            state,
        };
        hooks.invoke(index, &ctx)
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("hooks", &self.hooks.registered())
            .finish()
    }
}
