// =============================================================================
// kthreads — Synchronization Primitives
// =============================================================================
//
// One CPU, so mutual exclusion in the core comes from masking the timer.
// Tasks that must wait go to sleep in a wait queue instead of spinning.
//
//   irq.rs        — InterruptGuard and IrqMutex (short, non-blocking)
//   semaphore.rs  — counting semaphore with a priority-ordered wait queue
//   lock.rs       — owned binary lock built on a semaphore
//   condition.rs  — Mesa-style condition variable paired with a Lock
//
// Lock ordering (outermost first):
//   1. Semaphore / condition wait-queue lock
//   2. Scheduler state
//   3. Page pool free map
//
// Never take an outer lock while holding an inner one, and never hold any
// of them across block/yield/sleep.
// =============================================================================

pub mod condition;
pub mod irq;
pub mod lock;
pub mod semaphore;

pub use condition::Condition;
pub use irq::{InterruptGuard, IrqMutex, IrqMutexGuard};
pub use lock::Lock;
pub use semaphore::Semaphore;
