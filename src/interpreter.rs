//! Fetch-decode-execute loop.
//!
//! An [`Interpreter`] owns one processor and runs it against a memory view,
//! either inline on the caller's thread or on a worker thread. Cancellation is
//! cooperative: the flag is polled between instructions, never inside one.

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::cpu::{Cpu, DecodeContext};
use crate::cpu_bus::CpuBus;
use crate::debug_flags;
use crate::error::{CpuError, Result};
use crate::instructions::{DispatchTable, InstructionRecord};
use crate::trace::{RegisterSnapshot, TraceBuffer, TraceEntry};

/// What happens to an execution error caught at the loop boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Keep it as the last error and end the run normally.
    #[default]
    Record,
    /// Keep it as the last error and hand it back to the caller.
    Propagate,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterpreterConfig {
    pub error_policy: ErrorPolicy,
    /// Log every instruction at trace level.
    pub trace: bool,
    /// Entries kept in the trace ring buffer.
    pub history: usize,
}

impl InterpreterConfig {
    pub fn from_env() -> Self {
        Self {
            error_policy: if debug_flags::rethrow_errors() {
                ErrorPolicy::Propagate
            } else {
                ErrorPolicy::Record
            },
            trace: debug_flags::trace(),
            history: debug_flags::trace_history(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Cancellation requested, waiting for the current instruction to finish.
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// STP executed.
    Stopped,
    /// WAI executed; interrupts are never delivered.
    WaitingForInterrupt,
    /// An execution error was recorded.
    Error,
}

/// Shared cancellation flag, polled once per instruction.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Shared {
    cpu: Mutex<Cpu>,
    table: DispatchTable,
    config: InterpreterConfig,
    running: AtomicBool,
    cancel: CancelToken,
    last_error: Mutex<Option<CpuError>>,
    stop_reason: Mutex<Option<StopReason>>,
    trace: Mutex<TraceBuffer>,
}

// Poisoning only means a hook panicked mid-instruction; the data is still
// the last consistent snapshot.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears the running flag when a run ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Shared {
    fn step<B: CpuBus>(&self, cpu: &mut Cpu, bus: &mut B) -> Result<InstructionRecord> {
        let ctx = DecodeContext::from_state(&cpu.state);
        let mut offset = cpu.state.full_pc();
        let record = self.table.decode_at(bus, &mut offset, ctx)?;

        if self.config.trace {
            log::trace!("{} | {}", record, RegisterSnapshot::from(&cpu.state));
        }
        if self.config.history > 0 {
            lock(&self.trace).push(TraceEntry::new(&record, &cpu.state));
        }

        cpu.state.pc = cpu.state.pc.wrapping_add(record.len() as u16);
        record
            .instruction
            .execute(record.operand1, record.operand2, cpu, bus)?;
        cpu.state.instructions += 1;
        Ok(record)
    }

    fn handle_error(&self, err: CpuError) -> Result<()> {
        *lock(&self.last_error) = Some(err.clone());
        match self.config.error_policy {
            ErrorPolicy::Record => {
                log::warn!("run stopped on error: {}", err);
                Ok(())
            }
            ErrorPolicy::Propagate => {
                log::error!("rethrowing execution error: {}", err);
                Err(err)
            }
        }
    }

    fn finish(&self, reason: StopReason) -> StopReason {
        *lock(&self.stop_reason) = Some(reason);
        log::debug!("run finished: {:?}", reason);
        reason
    }

    fn run_loop<B: CpuBus>(&self, bus: &mut B) -> Result<StopReason> {
        {
            let mut cpu = lock(&self.cpu);
            cpu.state.stopped = false;
            cpu.state.waiting_for_irq = false;
            log::debug!("run started at {:06X}", cpu.state.full_pc());
        }

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.finish(StopReason::Cancelled));
            }

            let mut cpu = lock(&self.cpu);
            if let Err(err) = self.step(&mut cpu, bus) {
                drop(cpu);
                self.finish(StopReason::Error);
                self.handle_error(err)?;
                return Ok(StopReason::Error);
            }
            if cpu.state.stopped {
                return Ok(self.finish(StopReason::Stopped));
            }
            if cpu.state.waiting_for_irq {
                return Ok(self.finish(StopReason::WaitingForInterrupt));
            }
        }
    }
}

pub struct Interpreter {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<Result<StopReason>>>>,
}

impl Interpreter {
    pub fn new(cpu: Cpu, config: InterpreterConfig) -> Result<Self> {
        Ok(Self::with_table(cpu, DispatchTable::standard()?, config))
    }

    pub fn with_table(cpu: Cpu, table: DispatchTable, config: InterpreterConfig) -> Self {
        let trace = TraceBuffer::new(config.history);
        Self {
            shared: Arc::new(Shared {
                cpu: Mutex::new(cpu),
                table,
                config,
                running: AtomicBool::new(false),
                cancel: CancelToken::new(),
                last_error: Mutex::new(None),
                stop_reason: Mutex::new(None),
                trace: Mutex::new(trace),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.shared.config
    }

    pub fn table(&self) -> &DispatchTable {
        &self.shared.table
    }

    /// The processor. Blocks for at most one instruction while a run is active.
    pub fn cpu(&self) -> MutexGuard<'_, Cpu> {
        lock(&self.shared.cpu)
    }

    pub fn state(&self) -> RunState {
        if !self.shared.running.load(Ordering::SeqCst) {
            RunState::Idle
        } else if self.shared.cancel.is_cancelled() {
            RunState::Stopping
        } else {
            RunState::Running
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    pub fn last_error(&self) -> Option<CpuError> {
        lock(&self.shared.last_error).clone()
    }

    pub fn take_last_error(&self) -> Option<CpuError> {
        lock(&self.shared.last_error).take()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        *lock(&self.shared.stop_reason)
    }

    /// Recorded trace entries, oldest first.
    pub fn trace(&self) -> Vec<TraceEntry> {
        lock(&self.shared.trace).iter().cloned().collect()
    }

    fn set_start(cpu: &mut Cpu, start: Option<u32>) {
        if let Some(address) = start {
            cpu.state.pb = (address >> 16) as u8;
            cpu.state.pc = address as u16;
        }
    }

    fn begin(&self) -> Result<()> {
        self.shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| CpuError::InvalidOperation("interpreter is already running".to_string()))
    }

    /// Decodes and executes exactly one instruction at `start` or the current PC.
    ///
    /// With [`ErrorPolicy::Record`] a failing instruction yields `Ok(None)` and
    /// the error is kept in [`Interpreter::last_error`].
    pub fn run_once<B: CpuBus>(
        &self,
        bus: &mut B,
        start: Option<u32>,
    ) -> Result<Option<InstructionRecord>> {
        self.begin()?;
        let _running = RunningGuard(&self.shared.running);

        let mut cpu = lock(&self.shared.cpu);
        Self::set_start(&mut cpu, start);
        let result = self.shared.step(&mut cpu, bus);
        drop(cpu);

        match result {
            Ok(record) => Ok(Some(record)),
            Err(err) => self.shared.handle_error(err).map(|_| None),
        }
    }

    /// Runs until cancelled, STP/WAI, or an error.
    ///
    /// Inline runs return when the loop ends. Concurrent runs return right away;
    /// use [`Interpreter::wait`] or [`Interpreter::stop`] to collect the result.
    /// An uncollected error from an earlier concurrent run is returned here instead
    /// of starting a new one.
    pub fn run<B>(&self, mut bus: B, start: Option<u32>, concurrent: bool) -> Result<()>
    where
        B: CpuBus + Send + 'static,
    {
        self.begin()?;
        // a finished concurrent run may still hold an error nobody collected
        if let Some(previous) = lock(&self.worker).take() {
            if let Err(err) = Self::join(previous) {
                self.shared.running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        }
        self.shared.cancel.reset();
        *lock(&self.shared.stop_reason) = None;
        Self::set_start(&mut lock(&self.shared.cpu), start);

        if !concurrent {
            let _running = RunningGuard(&self.shared.running);
            return self.shared.run_loop(&mut bus).map(|_| ());
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("cpu-interpreter".to_string())
            .spawn(move || {
                let _running = RunningGuard(&shared.running);
                shared.run_loop(&mut bus)
            });
        match spawned {
            Ok(handle) => {
                *lock(&self.worker) = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::SeqCst);
                Err(CpuError::InvalidOperation(format!(
                    "failed to spawn interpreter thread: {}",
                    err
                )))
            }
        }
    }

    /// Requests cancellation and waits for a concurrent run to finish.
    pub fn stop(&self) -> Result<()> {
        self.shared.cancel.cancel();
        self.wait()
    }

    /// Waits for a concurrent run to end on its own.
    pub fn wait(&self) -> Result<()> {
        let handle = lock(&self.worker).take();
        match handle {
            Some(handle) => Self::join(handle),
            None => Ok(()),
        }
    }

    fn join(handle: JoinHandle<Result<StopReason>>) -> Result<()> {
        handle
            .join()
            .map_err(|_| CpuError::InvalidOperation("interpreter thread panicked".to_string()))?
            .map(|_| ())
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
    }
}
