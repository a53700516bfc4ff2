// =============================================================================
// kthreads — Counting Semaphore
// =============================================================================
//
// A non-negative count plus a queue of tasks waiting for it to go positive.
// The wait queue uses the ready queue's ordering key, so `up` always wakes
// the waiter the scheduler would have run first.
//
//   down     — take one unit, sleeping while the count is zero
//   try_down — take one unit only if available, never sleeps
//   up       — wake the head waiter (if any) and add one unit
//
// Every operation runs with interrupts masked for its whole duration, which
// makes it atomic with respect to the timer and to every other operation on
// the same semaphore. `up` may be called from an interrupt handler; `down`
// may not.
//
// The woken task re-checks the count: a task that ran in between may have
// taken the unit, in which case the waiter queues up again.
// =============================================================================

use alloc::sync::Arc;

use log::info;

use super::irq::InterruptGuard;
use crate::config::PRI_DEFAULT;
use crate::error::KernelResult;
use crate::task::{Scheduler, TaskQueue};

struct SemaState {
    value: u32,
    waiters: TaskQueue,
}

pub struct Semaphore {
    state: spin::Mutex<SemaState>,
}

impl Semaphore {
    pub const fn new(value: u32) -> Self {
        Self {
            state: spin::Mutex::new(SemaState {
                value,
                waiters: TaskQueue::new(),
            }),
        }
    }

    /// Takes one unit, blocking the running task until one is available.
    ///
    /// Must not be called from interrupt context.
    pub fn down(&self, sched: &Scheduler) {
        assert!(!sched.in_interrupt(), "semaphore down in interrupt context");
        let _irq = InterruptGuard::new(sched.cpu());
        loop {
            let mut state = self.state.lock();
            if state.value > 0 {
                state.value -= 1;
                return;
            }
            sched.enqueue_current(&mut state.waiters);
            drop(state);
            sched.block();
        }
    }

    /// Takes one unit if the count is positive. Never blocks.
    pub fn try_down(&self, sched: &Scheduler) -> bool {
        let _irq = InterruptGuard::new(sched.cpu());
        let mut state = self.state.lock();
        if state.value > 0 {
            state.value -= 1;
            true
        } else {
            false
        }
    }

    /// Releases one unit, waking the most urgent waiter.
    pub fn up(&self, sched: &Scheduler) {
        let _irq = InterruptGuard::new(sched.cpu());
        {
            let mut state = self.state.lock();
            if let Some(task) = state.waiters.pop_front() {
                sched.unblock(task);
            }
            state.value += 1;
        }
        sched.preempt_check();
    }

    pub fn value(&self) -> u32 {
        self.state.lock().value
    }

    /// Number of tasks blocked in `down`.
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Ping-pongs control with a helper task ten times.
    pub fn self_test(sched: &'static Scheduler) -> KernelResult<()> {
        info!("sema: testing semaphores...");
        let pair = Arc::new([Semaphore::new(0), Semaphore::new(0)]);
        let theirs = Arc::clone(&pair);
        sched.spawn("sema-test", PRI_DEFAULT, move || {
            for _ in 0..10 {
                theirs[0].down(sched);
                theirs[1].up(sched);
            }
        })?;
        for _ in 0..10 {
            pair[0].up(sched);
            pair[1].down(sched);
        }
        info!("sema: done.");
        Ok(())
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::boot;

    #[test]
    fn test_try_down() {
        let kernel = boot();
        let sema = Semaphore::new(1);
        assert!(sema.try_down(kernel.sched));
        assert!(!sema.try_down(kernel.sched));
        sema.up(kernel.sched);
        assert_eq!(sema.value(), 1);
    }

    #[test]
    fn test_up_wakes_waiter_first_in_key_order() {
        let kernel = boot();
        let sched = kernel.sched;
        let sema = kernel.leak(Semaphore::new(0));
        let order = kernel.leak(spin::Mutex::new(alloc::vec::Vec::new()));

        // Lower than main: they run only when main blocks.
        for (name, priority) in [("low", 10), ("high", 20), ("mid", 15)] {
            sched
                .spawn(name, priority, move || {
                    sema.down(sched);
                    order.lock().push(name);
                })
                .unwrap();
        }
        sched.sleep(1);
        assert_eq!(sema.waiters(), 3);

        for _ in 0..3 {
            sema.up(sched);
            sched.sleep(1);
        }
        assert_eq!(*order.lock(), ["high", "mid", "low"]);
        assert_eq!(sema.value(), 0);
    }

    #[test]
    fn test_self_test() {
        let kernel = boot();
        Semaphore::self_test(kernel.sched).unwrap();
    }
}
