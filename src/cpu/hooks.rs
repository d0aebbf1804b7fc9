//! Instrumentation hooks invoked by WDM.
//!
//! `WDM #n` with `n != 0` runs the hook registered in slot `n - 1`. Slots are
//! handed out first-free and stay owned by the processor until cleared.

use super::CpuState;
use crate::error::{CpuError, Result};
use crate::instructions::Instruction;

pub const HOOK_SLOTS: usize = 254;

/// What a hook sees when it fires: the WDM instruction and the processor state
/// with every earlier instruction applied.
pub struct HookContext<'a> {
    /// WDM operand (slot index + 1).
    pub slot: u8,
    pub instruction: &'a Instruction,
    pub state: &'a CpuState,
}

pub type HookFn = Box<dyn FnMut(&HookContext<'_>) + Send>;

pub struct HookTable {
    slots: Vec<Option<HookFn>>,
}

impl Default for HookTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HookTable {
    pub fn new() -> Self {
        Self {
            slots: (0..HOOK_SLOTS).map(|_| None).collect(),
        }
    }

    /// Stores `hook` in the first free slot and returns that slot's index.
    pub fn register(&mut self, hook: HookFn) -> Result<usize> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                CpuError::InvalidOperation(format!(
                    "all {} instrumentation hook slots are in use",
                    HOOK_SLOTS
                ))
            })?;
        self.slots[index] = Some(hook);
        log::debug!("registered instrumentation hook in slot {}", index);
        Ok(index)
    }

    pub fn remove(&mut self, index: usize) -> bool {
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .is_some()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    pub fn is_registered(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn registered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Runs the hook at `index`; an empty slot is a no-op.
    pub fn invoke(&mut self, index: usize, ctx: &HookContext<'_>) -> bool {
        match self.slots.get_mut(index) {
            Some(Some(hook)) => {
                hook(ctx);
                true
            }
            _ => false,
        }
    }
}
