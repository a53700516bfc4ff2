//! Sleeping mutual-exclusion lock.
//!
//! A binary semaphore that remembers which task holds it. Unlike a spin
//! lock it may be held across blocking operations. Recursive acquisition
//! and release by a non-holder are both fatal.

use super::irq::InterruptGuard;
use super::semaphore::Semaphore;
use crate::task::{Scheduler, Tid};

pub struct Lock {
    sema: Semaphore,
    holder: spin::Mutex<Option<Tid>>,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            sema: Semaphore::new(1),
            holder: spin::Mutex::new(None),
        }
    }

    /// Acquires the lock, sleeping until it is available.
    pub fn acquire(&self, sched: &Scheduler) {
        assert!(!self.held_by_current(sched), "lock acquired recursively");
        let _irq = InterruptGuard::new(sched.cpu());
        self.sema.down(sched);
        *self.holder.lock() = Some(sched.current_tid());
    }

    /// Acquires the lock only if it is free right now.
    pub fn try_acquire(&self, sched: &Scheduler) -> bool {
        assert!(!self.held_by_current(sched), "lock acquired recursively");
        let _irq = InterruptGuard::new(sched.cpu());
        let acquired = self.sema.try_down(sched);
        if acquired {
            *self.holder.lock() = Some(sched.current_tid());
        }
        acquired
    }

    pub fn release(&self, sched: &Scheduler) {
        assert!(
            self.held_by_current(sched),
            "lock released by a task that does not hold it"
        );
        let _irq = InterruptGuard::new(sched.cpu());
        *self.holder.lock() = None;
        self.sema.up(sched);
    }

    pub fn held_by_current(&self, sched: &Scheduler) -> bool {
        let holder = {
            let _irq = InterruptGuard::new(sched.cpu());
            *self.holder.lock()
        };
        holder.is_some_and(|tid| tid == sched.current_tid())
    }

    pub fn holder(&self) -> Option<Tid> {
        *self.holder.lock()
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}
