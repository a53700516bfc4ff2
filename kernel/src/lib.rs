// =============================================================================
// kthreads — Kernel Core Library
// =============================================================================
//
// The scheduling and memory-allocation core of a small preemptible kernel.
// It answers the two questions every kernel must answer:
//
//   1. Which ready thread runs next, and for how long?        (task/)
//   2. Which physical page(s) satisfy the next allocation?    (mm/)
//
// Threads coordinate through blocking primitives (sync/) whose wait queues
// are ordered exactly like the scheduler's ready queue.
//
// LAYERING (leaves first):
//   arch/   — the `Cpu` trait: interrupt flag, halt, stack setup, switch
//   sync/   — interrupt guards, IrqMutex, semaphore, lock, condition
//   mm/     — bit-vector free maps, placement strategies, two page pools
//   task/   — task arena, ordered queues, the scheduler itself
//
// Everything hardware-specific sits behind `arch::Cpu`. On bare metal the
// x86_64 backend is used; under `cargo test` the hosted backend runs each
// kernel thread as a host thread that only executes while it holds the
// baton, which reproduces single-CPU semantics exactly.
//
// =============================================================================

// =============================================================================
// Crate-level attributes
// =============================================================================
//
// #![no_std] — We don't link against Rust's standard library. The tests are
//   the exception: they run on the development machine and need std for the
//   hosted CPU backend.
// =============================================================================

#![cfg_attr(not(test), no_std)]

// Enable the `alloc` crate for heap-allocated types (Vec, Box, String, etc.).
// The embedding kernel provides the #[global_allocator].
extern crate alloc;

pub mod arch;
pub mod config;
pub mod error;
pub mod mm;
pub mod sync;
pub mod task;
pub mod util;

#[cfg(test)]
mod tests;

pub use config::{AllocStrategy, KernelConfig, SchedPolicy};
pub use error::KernelError;
pub use mm::{AllocFlags, PageAllocator};
pub use sync::{Condition, Lock, Semaphore};
pub use task::{Scheduler, Tid};
