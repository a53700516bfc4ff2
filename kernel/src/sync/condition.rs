//! Condition variable, Mesa style.
//!
//! Each waiter parks on a private semaphore (its wait token), queued by the
//! priority it had when it started waiting. The snapshot matters: a waiter
//! is in no ready queue while it waits, so its live priority cannot be used
//! to order wake-ups. Signalled waiters re-acquire the lock before `wait`
//! returns and should re-check their predicate.

use alloc::sync::Arc;

use super::irq::InterruptGuard;
use super::lock::Lock;
use super::semaphore::Semaphore;
use crate::task::{OrderedQueue, SchedKey, Scheduler};

pub struct Condition {
    waiters: spin::Mutex<OrderedQueue<Arc<Semaphore>>>,
}

impl Condition {
    pub const fn new() -> Self {
        Self {
            waiters: spin::Mutex::new(OrderedQueue::new()),
        }
    }

    /// Releases `lock`, waits for a signal, re-acquires `lock`.
    pub fn wait(&self, lock: &Lock, sched: &Scheduler) {
        assert!(!sched.in_interrupt(), "condition wait in interrupt context");
        assert!(lock.held_by_current(sched), "condition wait without holding the lock");

        let token = Arc::new(Semaphore::new(0));
        {
            let key = SchedKey::priority(sched.get_priority());
            let _irq = InterruptGuard::new(sched.cpu());
            self.waiters.lock().insert(key, Arc::clone(&token));
        }
        lock.release(sched);
        token.down(sched);
        lock.acquire(sched);
    }

    /// Wakes the highest-priority waiter, if any.
    pub fn signal(&self, lock: &Lock, sched: &Scheduler) {
        assert!(lock.held_by_current(sched), "condition signal without holding the lock");
        if let Some(token) = self.pop(sched) {
            token.up(sched);
        }
    }

    /// Wakes every waiter, highest priority first.
    pub fn broadcast(&self, lock: &Lock, sched: &Scheduler) {
        assert!(lock.held_by_current(sched), "condition broadcast without holding the lock");
        while let Some(token) = self.pop(sched) {
            token.up(sched);
        }
    }

    pub fn waiters(&self) -> usize {
        self.waiters.lock().len()
    }

    fn pop(&self, sched: &Scheduler) -> Option<Arc<Semaphore>> {
        let _irq = InterruptGuard::new(sched.cpu());
        self.waiters.lock().pop_front()
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::boot;

    #[test]
    #[should_panic(expected = "without holding the lock")]
    fn test_wait_requires_lock() {
        let kernel = boot();
        let lock = Lock::new();
        Condition::new().wait(&lock, kernel.sched);
    }

    #[test]
    fn test_signal_without_waiters() {
        let kernel = boot();
        let lock = Lock::new();
        let cond = Condition::new();
        lock.acquire(kernel.sched);
        cond.signal(&lock, kernel.sched);
        cond.broadcast(&lock, kernel.sched);
        assert_eq!(cond.waiters(), 0);
        lock.release(kernel.sched);
    }
}
