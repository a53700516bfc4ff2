// =============================================================================
// kthreads — Architecture Abstraction
// =============================================================================
//
// The scheduler and allocator never execute a privileged instruction
// themselves. Everything that touches the CPU goes through the `Cpu` trait:
//
//   interrupt flag   — interrupts_enabled / enable / disable
//   idle             — halt (enable interrupts, wait for the next one)
//   thread bring-up  — prepare_stack (synthesize the first-switch frames)
//   thread switch    — switch (save one context, resume another)
//
// Backends:
//   x86_64/  — bare metal (target_os = "none"): CLI/STI/HLT through the
//              `x86_64` crate, a push/pop/ret context switch in assembly.
//   hosted   — unit tests: every kernel thread is a host thread that only
//              runs while it holds the baton, so exactly one runs at a time.
//
// To add a new architecture:
//   1. Create `arch/<arch>/mod.rs` implementing `Cpu`
//   2. Add a `#[cfg(...)]` here
//   3. Everything else just works
// =============================================================================

pub mod frame;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod x86_64;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use self::x86_64::X86Cpu;

#[cfg(test)]
pub mod hosted;

/// Entry point of a freshly created thread. Receives the opaque argument
/// given to `Cpu::prepare_stack` and never returns.
pub type BootFn = extern "C-unwind" fn(usize) -> !;

/// Saved execution context of a suspended thread.
///
/// Only the stack pointer is stored here; the callee-saved registers live
/// on the suspended thread's own stack (see `frame`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub sp: usize,
}

/// The CPU as seen by the kernel core. One logical CPU.
pub trait Cpu: Send + Sync {
    /// Checks whether maskable interrupts are currently delivered.
    fn interrupts_enabled(&self) -> bool;

    /// Enables maskable interrupts.
    fn enable_interrupts(&self);

    /// Disables maskable interrupts.
    fn disable_interrupts(&self);

    /// Enables interrupts and waits for the next one to arrive.
    ///
    /// Returns after the interrupt handler has run. Used by the idle task.
    fn halt(&self);

    /// Lays out a fresh stack so that the first `switch` to the returned
    /// context calls `boot(arg)`.
    ///
    /// # Safety
    /// `stack_top` must be the 16-byte aligned top of memory owned by the new
    /// thread for as long as it can run.
    unsafe fn prepare_stack(&self, stack_top: usize, boot: BootFn, arg: usize) -> Context;

    /// Saves the running thread's context into `from` and resumes `to`.
    ///
    /// Returns when some other thread switches back to `from`.
    ///
    /// # Safety
    /// Interrupts must be disabled. `to` must hold a context produced by
    /// `prepare_stack` or by an earlier `switch`, and both pointers must be
    /// valid for the duration of the call.
    unsafe fn switch(&self, from: *mut Context, to: *const Context);
}
