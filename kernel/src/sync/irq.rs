// =============================================================================
// kthreads — Interrupt Guards
// =============================================================================
//
// On a single CPU, "nobody else can touch this" means "the timer can't fire
// right now". Two guards express that:
//
// InterruptGuard
//   Saves the current interrupt level, disables interrupts, and restores the
//   saved level when dropped — on every exit path, including unwinding.
//   Nested guards work: an inner guard saved "disabled" and leaves it so.
//
//   This is the thread's own preemption-suppressed level. It MAY be held
//   across a context switch (e.g. while blocking on a semaphore): each
//   thread's saved level lives in its own guard, and the switched-in thread
//   restores its own level when it drops its guard.
//
// IrqMutex<T>
//   A `spin::Mutex<T>` taken under an InterruptGuard. Protects a queue or a
//   free map shared between task context and interrupt context.
//
//   RULE: an IrqMutex guard must NEVER be held across a suspension point
//   (block, yield, sleep, switch). The thread that runs next would spin on
//   the lock forever — there is no other CPU to release it.
//
// IRQ SAFETY:
//   Interrupts are disabled BEFORE the spin lock is taken. Otherwise:
//     1. Thread A holds lock L with interrupts enabled
//     2. Timer fires, the handler tries to take L
//     3. DEADLOCK — the handler spins forever because A can't run
//
// =============================================================================

use alloc::sync::Arc;
use core::ops::{Deref, DerefMut};

use crate::arch::Cpu;

/// RAII interrupt-level guard.
#[must_use = "interrupts are re-enabled as soon as the guard is dropped"]
pub struct InterruptGuard<'a> {
    cpu: &'a dyn Cpu,
    was_enabled: bool,
}

impl<'a> InterruptGuard<'a> {
    /// Disables interrupts, remembering whether they were on.
    pub fn new(cpu: &'a dyn Cpu) -> Self {
        let was_enabled = cpu.interrupts_enabled();
        cpu.disable_interrupts();
        Self { cpu, was_enabled }
    }

    /// Whether interrupts were enabled when the guard was taken.
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.cpu.enable_interrupts();
        }
    }
}

/// Spin lock that also masks interrupts while held.
pub struct IrqMutex<T> {
    cpu: Arc<dyn Cpu>,
    inner: spin::Mutex<T>,
}

impl<T> IrqMutex<T> {
    pub fn new(cpu: Arc<dyn Cpu>, value: T) -> Self {
        Self {
            cpu,
            inner: spin::Mutex::new(value),
        }
    }

    /// Disables interrupts, then takes the lock.
    pub fn lock(&self) -> IrqMutexGuard<'_, T> {
        let irq = InterruptGuard::new(&*self.cpu);
        IrqMutexGuard {
            inner: self.inner.lock(),
            irq,
        }
    }
}

/// Guard for a held `IrqMutex`.
///
/// Fields drop in declaration order: the lock is released first, then the
/// interrupt level is restored.
#[must_use]
pub struct IrqMutexGuard<'a, T> {
    inner: spin::MutexGuard<'a, T>,
    irq: InterruptGuard<'a>,
}

impl<T> IrqMutexGuard<'_, T> {
    /// Whether interrupts were enabled before this lock was taken.
    pub fn interrupts_were_enabled(&self) -> bool {
        self.irq.was_enabled()
    }
}

impl<T> Deref for IrqMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for IrqMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::hosted::HostCpu;

    #[test]
    fn test_guard_restores_level() {
        let cpu = HostCpu::new();
        cpu.enable_interrupts();
        {
            let outer = InterruptGuard::new(&cpu);
            assert!(outer.was_enabled());
            assert!(!cpu.interrupts_enabled());
            {
                let inner = InterruptGuard::new(&cpu);
                assert!(!inner.was_enabled());
            }
            // Inner guard leaves interrupts off.
            assert!(!cpu.interrupts_enabled());
        }
        assert!(cpu.interrupts_enabled());
    }

    #[test]
    fn test_irq_mutex_masks_interrupts() {
        let cpu: Arc<dyn Cpu> = Arc::new(HostCpu::new());
        cpu.enable_interrupts();
        let counter = IrqMutex::new(Arc::clone(&cpu), 0u32);
        {
            let mut guard = counter.lock();
            *guard += 1;
            assert!(!cpu.interrupts_enabled());
        }
        assert!(cpu.interrupts_enabled());
        assert_eq!(*counter.lock(), 1);
    }
}
