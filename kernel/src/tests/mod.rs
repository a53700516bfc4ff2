// =============================================================================
// kthreads — Scenario Tests
// =============================================================================
//
// Whole-kernel scenarios on the hosted CPU. Each test boots its own kernel:
// a fresh HostCpu, a page arena split into the two pools, and a running
// scheduler whose idle task drives the timer. The test body runs as task
// "main" (tid 1); the idle task is tid 2, so the first spawned task is 3.
//
// Nothing here sleeps on wall-clock time. Ticks happen only when the idle
// task halts or when a test calls `timer_interrupt` itself, so every
// scenario is deterministic.
// =============================================================================


use alloc::sync::Arc;

use crate::arch::hosted::{leak, page_arena, HostCpu};
use crate::arch::Cpu;
use crate::config::KernelConfig;
use crate::mm::PageAllocator;
use crate::task::Scheduler;

/// Pages handed to the allocator by `boot`.
pub(crate) const BOOT_PAGES: usize = 64;

pub(crate) struct Kernel {
    pub cpu: Arc<HostCpu>,
    pub sched: &'static Scheduler,
}

impl Kernel {
    /// Leaks `value` for sharing with kernel tasks.
    pub fn leak<T>(&self, value: T) -> &'static T {
        leak(value)
    }
}

/// Boots a kernel with the default configuration.
pub(crate) fn boot() -> Kernel {
    boot_with(KernelConfig::default(), BOOT_PAGES)
}

pub(crate) fn boot_with(config: KernelConfig, pages: usize) -> Kernel {
    let cpu = Arc::new(HostCpu::new());
    let palloc = allocator(Arc::clone(&cpu) as Arc<dyn Cpu>, pages, &config);
    let sched = leak(Scheduler::new(
        Arc::clone(&cpu) as Arc<dyn Cpu>,
        Arc::new(palloc),
        config.policy,
    ));
    cpu.set_timer(move || sched.timer_interrupt());
    sched.start().unwrap();
    Kernel { cpu, sched }
}

/// An allocator over a fresh arena of `pages` pages.
pub(crate) fn allocator(cpu: Arc<dyn Cpu>, pages: usize, config: &KernelConfig) -> PageAllocator {
    // SAFETY: the arena is fresh and leaked, so the allocator owns it for good.
    unsafe { PageAllocator::new(cpu, page_arena(pages), pages, config) }
}
