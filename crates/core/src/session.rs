//! Emulation Session.
//!
//! This module implements the single owned context that every other component hangs off.
//! It provides:
//! 1. **Lifecycle:** Construction from a [`Config`], image loading and full reset.
//! 2. **Calling Convention:** Stack push/pop and in-place argument access for hook handlers.
//! 3. **Dispatch:** Hook invocation, module acquisition and `GetProcAddress`-style resolution.
//! 4. **Run Control:** Single-step, run-until-breakpoint and run-to-address over an
//!    [`InstructionStepper`], with a cross-thread stop request.
//! 5. **Persistence:** Saving and restoring registers and the module list.
//! 6. **Allocation Tracing:** Blocks from the allocator hooks, keyed by call site, with the
//!    member layout the engine observes in them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::common::constants::{STATE_MAGIC, STATE_VERSION_MAJOR, STATE_VERSION_MINOR};
use crate::common::{ByteReader, MemoryFault, Result, StateError};
use crate::config::{Config, ImageFormat};
use crate::cpu::{Reg, RegisterFile};
use crate::debug::{AllocationTracer, BreakpointSet};
use crate::hooks::HookDispatch;
use crate::loader::{self, ImportReport, MappedImage};
use crate::memory::MemoryManager;
use crate::modules::{
    FixedPrompt, HostEnvironment, LoadDecision, LoadPolicy, ModuleDescriptor, ModulePrompt,
    ModuleRegistry, NoHost, Symbol,
};

/// The instruction decode/execute engine driving a session.
pub trait InstructionStepper {
    /// Executes the instruction at `session.regs.eip`, advancing EIP.
    ///
    /// Calls to hooked addresses are expected to go through [`Session::dispatch_hook`].
    fn execute_instruction(&mut self, session: &mut Session) -> Result<()>;
}

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// EIP reached a breakpoint (not executed).
    Breakpoint(u32),
    /// EIP reached the `run_to` target.
    Reached(u32),
    /// A stop was requested through [`Session::stop_handle`].
    StopRequested,
}

/// Image loaded by [`Session::load_image`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadedImage {
    /// Mapping layout.
    pub mapped: MappedImage,
    /// Import walk outcome (empty when the image has no imports).
    pub imports: ImportReport,
}

/// An emulation session.
#[derive(Debug)]
pub struct Session {
    /// CPU register state.
    pub regs: RegisterFile,
    /// Emulated address space.
    pub memory: MemoryManager,
    /// Known modules.
    pub modules: ModuleRegistry,
    /// Live hooks.
    pub hooks: HookDispatch,
    /// Stop addresses.
    pub breakpoints: BreakpointSet,
    /// Allocation-site traces.
    pub allocations: AllocationTracer,
    config: Config,
    image_base: u32,
    last_proc_name: String,
    stop_request: Arc<AtomicBool>,
}

impl Session {
    /// Creates a session with no host modules; unknown modules are faked.
    pub fn new(config: Config) -> Self {
        Self::with_host(
            config,
            Box::new(NoHost),
            Box::new(FixedPrompt(LoadDecision::Fake)),
        )
    }

    /// Creates a session whose real modules come from `host`.
    pub fn with_host(
        config: Config,
        host: Box<dyn HostEnvironment>,
        prompt: Box<dyn ModulePrompt>,
    ) -> Self {
        let memory = Self::fresh_memory(&config);
        let mut session = Self {
            regs: RegisterFile::new(),
            memory,
            modules: ModuleRegistry::new(host, prompt),
            hooks: HookDispatch::default(),
            breakpoints: BreakpointSet::new(),
            allocations: AllocationTracer::new(),
            config,
            image_base: 0,
            last_proc_name: String::new(),
            stop_request: Arc::new(AtomicBool::new(false)),
        };
        session.reset_registers();
        session
    }

    fn fresh_memory(config: &Config) -> MemoryManager {
        let mut memory = MemoryManager::new(config.stack_top(), config.stack_size());
        if !memory.init_heap(config.memory.heap_base, config.memory.heap_size) {
            warn!("session has no process heap");
        }
        memory
    }

    fn reset_registers(&mut self) {
        self.regs.reset();
        self.regs.set(Reg::Esp, self.memory.stack().top());
        if self.config.general.format == ImageFormat::Pe {
            self.regs.load_win32_segments();
        }
    }

    /// Session configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Load address of the main image (0 before [`Session::load_image`]).
    pub const fn image_base(&self) -> u32 {
        self.image_base
    }

    /// Name produced by the most recent `GetProcAddress`-style resolution.
    pub fn last_proc_name(&self) -> &str {
        &self.last_proc_name
    }

    /// Tears down all state: registers, memory, modules, hooks, breakpoints and traces.
    ///
    /// The host environment and prompt are kept.
    pub fn reset(&mut self) {
        self.memory = Self::fresh_memory(&self.config);
        self.modules.clear();
        self.hooks.clear();
        self.breakpoints.clear();
        self.allocations.clear();
        self.image_base = 0;
        self.last_proc_name.clear();
        self.stop_request.store(false, Ordering::Relaxed);
        self.reset_registers();
        info!("session reset");
    }

    /// Maps a PE32 image, points EIP at its entry and resolves its imports.
    pub fn load_image(&mut self, data: &[u8]) -> Result<LoadedImage> {
        let mapped = loader::map_image(&mut self.memory, data)?;
        self.image_base = mapped.image_base;
        self.regs.eip = mapped.entry;
        self.regs.initial_eip = mapped.entry;
        let imports = match mapped.import_directory {
            Some(rva) => loader::resolve_imports(self, rva, mapped.image_base)?,
            None => ImportReport::default(),
        };
        Ok(LoadedImage { mapped, imports })
    }

    // ═══════════════════════════════════════════════════════════
    // Stack and calling convention
    // ═══════════════════════════════════════════════════════════

    /// Pushes a dword; ESP is only moved if the write succeeds.
    pub fn push_u32(&mut self, val: u32) -> std::result::Result<(), MemoryFault> {
        let esp = self.regs.esp().wrapping_sub(4);
        self.memory.write_u32(esp, val)?;
        self.regs.set(Reg::Esp, esp);
        Ok(())
    }

    /// Pops a dword; ESP is only moved if the read succeeds.
    pub fn pop_u32(&mut self) -> std::result::Result<u32, MemoryFault> {
        let esp = self.regs.esp();
        let val = self.memory.read_u32(esp)?;
        self.regs.set(Reg::Esp, esp.wrapping_add(4));
        Ok(val)
    }

    /// Pushes call arguments right to left, so `args[0]` ends up at `[esp]`.
    pub fn push_args(&mut self, args: &[u32]) -> std::result::Result<(), MemoryFault> {
        args.iter().rev().try_for_each(|&a| self.push_u32(a))
    }

    /// Reads the `n`th dword argument in place (`[esp + 4n]`).
    pub fn stack_arg(&self, n: u32) -> std::result::Result<u32, MemoryFault> {
        self.memory
            .read_u32(self.regs.esp().wrapping_add(n.wrapping_mul(4)))
    }

    // ═══════════════════════════════════════════════════════════
    // Hooks and modules
    // ═══════════════════════════════════════════════════════════

    /// Runs the hook installed at `addr`.
    ///
    /// # Returns
    ///
    /// `false` if no hook is installed there; otherwise `true` once the handler has run.
    pub fn dispatch_hook(&mut self, addr: u32) -> Result<bool> {
        let Some((handler, emulated)) = self.hooks.record_call(addr) else {
            return Ok(false);
        };
        if emulated && self.config.general.trace_hooks {
            let name = self.hooks.find_by_address(addr).map_or("", |n| n.name.as_str());
            info!(addr, "hook {name}");
        }
        handler(self, addr)?;
        Ok(true)
    }

    /// Finds or registers `name` under `policy`.
    ///
    /// # Returns
    ///
    /// The module handle, or 0 when the module was refused.
    pub fn ensure_module(&mut self, name: &str, policy: LoadPolicy) -> u32 {
        self.modules
            .add_module(name, 0, policy)
            .map_or(0, ModuleDescriptor::base)
    }

    /// Resolves a function of the module with handle (or id) `module` the way
    /// `GetProcAddress` does, installing a hook for it.
    ///
    /// Ordinal imports are named `<MODULE>_0x<ORDINAL>` with the first `.` of the module
    /// name replaced by `_`; for an unknown handle the prefix is `ORDINAL_<HANDLE>`.
    pub fn resolve_proc(&mut self, module: u32, symbol: Symbol<'_>) -> u32 {
        let owner = self.modules.find_by_handle(module);
        let name = match symbol {
            Symbol::Name(name) => name.to_owned(),
            Symbol::Ordinal(ordinal) => {
                let prefix = owner.map_or_else(
                    || format!("ORDINAL_{module:08X}"),
                    |m| m.name.replacen('.', "_", 1),
                );
                format!("{prefix}_0x{ordinal:04X}")
            }
        };
        let real = owner.and_then(|m| m.export_address(symbol));
        let module_id = owner.map_or(0, |m| m.id);

        let address = self.hooks.resolve_by_name(&name, real, module_id);
        if let Some(export) = self.modules.reverse_lookup_export(address) {
            debug!(name = %name, address, export, "resolved to export");
        } else {
            debug!(name = %name, address, "resolved");
        }
        self.last_proc_name = name;
        address
    }

    // ═══════════════════════════════════════════════════════════
    // Allocation tracing
    // ═══════════════════════════════════════════════════════════

    /// Traces `[base, base + size)` back to the instruction being executed.
    ///
    /// Called by the allocator hooks; the call site is `regs.initial_eip`.
    pub fn trace_allocation(&mut self, base: u32, size: u32) -> bool {
        self.allocations
            .register(self.regs.initial_eip, base, size)
    }

    /// Reports a `width`-byte memory-operand access at `addr`.
    ///
    /// # Returns
    ///
    /// `(call_site, offset)` of the most recent traced block holding `addr`, if any.
    pub fn record_access(&mut self, addr: u32, width: u8) -> Option<(u32, u32)> {
        let _ = self.allocations.record_access(addr, width);
        self.allocations.trace_for(addr)
    }

    // ═══════════════════════════════════════════════════════════
    // Run control
    // ═══════════════════════════════════════════════════════════

    /// Executes exactly one instruction.
    pub fn step(&mut self, stepper: &mut dyn InstructionStepper) -> Result<()> {
        self.regs.initial_eip = self.regs.eip;
        stepper.execute_instruction(self)
    }

    /// Runs until EIP hits a breakpoint or a stop is requested.
    ///
    /// Both are checked before each instruction, so starting on a breakpoint executes nothing.
    pub fn run(&mut self, stepper: &mut dyn InstructionStepper) -> Result<StopReason> {
        loop {
            let eip = self.regs.eip;
            if self.breakpoints.is_breakpoint(eip) {
                debug!(eip, "breakpoint hit");
                return Ok(StopReason::Breakpoint(eip));
            }
            if self.stop_request.swap(false, Ordering::Relaxed) {
                return Ok(StopReason::StopRequested);
            }
            self.step(stepper)?;
        }
    }

    /// Runs until EIP equals `target`, a breakpoint is hit, or a stop is requested.
    pub fn run_to(&mut self, stepper: &mut dyn InstructionStepper, target: u32) -> Result<StopReason> {
        loop {
            let eip = self.regs.eip;
            if eip == target {
                return Ok(StopReason::Reached(eip));
            }
            if self.breakpoints.is_breakpoint(eip) {
                return Ok(StopReason::Breakpoint(eip));
            }
            if self.stop_request.swap(false, Ordering::Relaxed) {
                return Ok(StopReason::StopRequested);
            }
            self.step(stepper)?;
        }
    }

    /// Flag that stops a run between instructions when set; safe to set from another thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_request)
    }

    // ═══════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════

    /// Serialises the session: magic, version, image base, registers, module list.
    ///
    /// Memory contents are not included.
    pub fn save_state(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + crate::cpu::regs::ENCODED_LEN);
        out.extend_from_slice(&STATE_MAGIC.to_le_bytes());
        out.extend_from_slice(&STATE_VERSION_MAJOR.to_le_bytes());
        out.extend_from_slice(&STATE_VERSION_MINOR.to_le_bytes());
        out.extend_from_slice(&self.image_base.to_le_bytes());
        self.regs.encode(&mut out);
        self.modules.save(&mut out);
        out
    }

    /// Restores registers, image base and modules from [`Session::save_state`] output.
    ///
    /// Modules are replayed under the `LoadLibrary` policy. On error the session is left
    /// unchanged.
    pub fn load_state(&mut self, buf: &[u8]) -> std::result::Result<(), StateError> {
        let mut reader = ByteReader::new(buf);
        let magic = reader.u32()?;
        if magic != STATE_MAGIC {
            return Err(StateError::BadMagic(magic));
        }
        let major = reader.u16()?;
        let minor = reader.u16()?;
        if major != STATE_VERSION_MAJOR || minor > STATE_VERSION_MINOR {
            return Err(StateError::UnsupportedVersion { major, minor });
        }
        let image_base = reader.u32()?;
        let regs = RegisterFile::decode(&mut reader)?;
        self.modules
            .load(&mut reader, self.config.modules.load_library)?;
        self.image_base = image_base;
        self.regs = regs;
        info!(modules = self.modules.len(), "session state restored");
        Ok(())
    }
}
