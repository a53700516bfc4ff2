// =============================================================================
// kthreads — X86Cpu
// =============================================================================
//
// The `Cpu` implementation used on bare metal. Thin wrappers around
// privileged instructions: CLI/STI/HLT via the `x86_64` crate, RFLAGS.IF for
// the current interrupt level, and the assembly switch in `switch.rs`.
//
// There is exactly one logical CPU, so `X86Cpu` carries no state. The boot
// glue creates one and hands it to the scheduler and the page allocator.
// =============================================================================

use x86_64::instructions::interrupts;

use super::switch::{context_switch_asm, thread_trampoline};
use crate::arch::{frame, BootFn, Context, Cpu};

#[derive(Debug, Default, Clone, Copy)]
pub struct X86Cpu;

impl X86Cpu {
    pub const fn new() -> Self {
        Self
    }
}

impl Cpu for X86Cpu {
    #[inline(always)]
    fn interrupts_enabled(&self) -> bool {
        interrupts::are_enabled()
    }

    #[inline(always)]
    fn enable_interrupts(&self) {
        interrupts::enable();
    }

    #[inline(always)]
    fn disable_interrupts(&self) {
        interrupts::disable();
    }

    /// STI;HLT back to back: the CPU delivers no interrupt between the two
    /// instructions, so a wake-up cannot slip in before we sleep.
    fn halt(&self) {
        interrupts::enable_and_hlt();
    }

    unsafe fn prepare_stack(&self, stack_top: usize, boot: BootFn, arg: usize) -> Context {
        // SAFETY: forwarded from the caller.
        let sp = unsafe {
            frame::write_initial_frame(stack_top, thread_trampoline as usize, boot, arg)
        };
        Context { sp }
    }

    unsafe fn switch(&self, from: *mut Context, to: *const Context) {
        debug_assert!(!interrupts::are_enabled());
        // SAFETY: both contexts are valid per the trait contract; `sp` is the
        // first field of the `repr(C)` Context.
        unsafe {
            context_switch_asm(&raw mut (*from).sp, (*to).sp);
        }
    }
}

