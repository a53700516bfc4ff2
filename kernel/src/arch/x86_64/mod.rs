// =============================================================================
// kthreads — x86_64 Bare-Metal Backend
// =============================================================================
//
// All hardware-specific code for x86_64 lives here. Higher-level kernel
// code (scheduler, allocator, semaphores) is safe Rust calling into the
// `Cpu` trait implemented by `X86Cpu`.
//
// This module provides:
//   cpu.rs     — X86Cpu: interrupt flag, HLT, stack setup, switch
//   switch.rs  — the context switch routine and first-entry trampoline
// =============================================================================

pub mod cpu;
pub mod switch;

pub use cpu::X86Cpu;
