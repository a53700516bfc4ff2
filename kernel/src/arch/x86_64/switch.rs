//! Context switch and first-entry trampoline.
//!
//! `context_switch_asm` pushes the callee-saved registers on the old stack,
//! stores the old RSP, loads the new one, pops and `ret`s. Caller-saved
//! registers need no saving: the switch is an ordinary function call as far
//! as the compiler is concerned.
//!
//! A new thread's stack is forged by `arch::frame` so that the `ret` lands in
//! `thread_trampoline` with the boot function in r12 and its argument in r13.

core::arch::global_asm!(
    ".global context_switch_asm",
    "context_switch_asm:",
    // rdi = &mut old.sp
    // rsi = new.sp
    //
    // Save callee-saved registers on old stack
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    // Save old RSP
    "mov [rdi], rsp",
    // Load new RSP
    "mov rsp, rsi",
    // Restore callee-saved registers from new stack
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    // Return to wherever the new thread left off (pops RIP from stack)
    "ret",
    "",
    ".global thread_trampoline",
    "thread_trampoline:",
    // RSP == stack top here (16-byte aligned), so `call` leaves the callee
    // with the usual entry alignment.
    "xor ebp, ebp",
    "mov rdi, r13",
    "call r12",
    // The boot function never returns.
    "ud2",
);

unsafe extern "C" {
    /// Raw assembly context switch.
    ///
    /// Saves callee-saved registers on old stack, writes RSP to `*old_sp`,
    /// loads `new_sp`, restores registers, and `ret`s to the new thread's
    /// saved RIP.
    pub fn context_switch_asm(old_sp: *mut usize, new_sp: usize);

    /// Landing pad for the first switch into a thread. Not callable.
    pub fn thread_trampoline();
}
