// =============================================================================
// kthreads — Hosted CPU (unit tests)
// =============================================================================
//
// Runs the kernel core on a development machine without emulating x86.
//
// HOW IT WORKS:
//   - Every kernel thread is backed by a host thread (a "strand").
//   - A single baton says which strand may run. `switch` hands the baton to
//     the target strand and parks the caller until the baton comes back.
//     Exactly one strand executes kernel code at any time, which is the
//     single-CPU model the scheduler is written for.
//   - The interrupt flag is a plain boolean. Nothing fires asynchronously:
//     a timer "interrupt" happens only when the idle thread halts (the
//     installed timer handler runs in its place) or when a test calls the
//     scheduler's interrupt entry points itself.
//
// FAILURE REPORTING:
//   A panic in any strand poisons the baton; the test thread (strand 0)
//   notices on its next wait and panics too, so the test fails instead of
//   hanging. The test thread also gives up after STALL_LIMIT.
// =============================================================================

use std::alloc::{alloc_zeroed, Layout};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{BootFn, Context, Cpu};
use crate::config::PAGE_SIZE;

/// Strand of the thread that created the `HostCpu` (the test itself).
pub const MAIN_STRAND: usize = 0;

const STALL_LIMIT: Duration = Duration::from_secs(20);

type TimerHandler = Arc<dyn Fn() + Send + Sync>;

struct Baton {
    running: usize,
    poisoned: bool,
}

struct Shared {
    baton: Mutex<Baton>,
    turn: Condvar,
}

impl Shared {
    fn baton(&self) -> MutexGuard<'_, Baton> {
        self.baton.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Parks the calling strand until it holds the baton.
    fn wait_turn(&self, strand: usize) {
        let deadline = Instant::now() + STALL_LIMIT;
        let mut baton = self.baton();
        loop {
            if baton.poisoned {
                drop(baton);
                panic!("a kernel thread panicked");
            }
            if baton.running == strand {
                return;
            }
            if strand == MAIN_STRAND {
                let now = Instant::now();
                if now >= deadline {
                    drop(baton);
                    panic!("test thread stalled: every kernel thread is blocked");
                }
                baton = self
                    .turn
                    .wait_timeout(baton, deadline - now)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            } else {
                baton = self.turn.wait(baton).unwrap_or_else(|e| e.into_inner());
            }
        }
    }

    fn pass(&self, strand: usize) {
        self.baton().running = strand;
        self.turn.notify_all();
    }

    fn poison(&self) {
        self.baton().poisoned = true;
        self.turn.notify_all();
    }
}

/// Single simulated CPU.
pub struct HostCpu {
    interrupts: AtomicBool,
    shared: Arc<Shared>,
    next_strand: AtomicUsize,
    timer: Mutex<Option<TimerHandler>>,
}

impl HostCpu {
    /// Creates a CPU whose only strand is the calling thread, with
    /// interrupts disabled as they are at boot.
    pub fn new() -> Self {
        Self {
            interrupts: AtomicBool::new(false),
            shared: Arc::new(Shared {
                baton: Mutex::new(Baton {
                    running: MAIN_STRAND,
                    poisoned: false,
                }),
                turn: Condvar::new(),
            }),
            next_strand: AtomicUsize::new(MAIN_STRAND + 1),
            timer: Mutex::new(None),
        }
    }

    /// Installs the handler `halt` runs in place of a timer interrupt.
    pub fn set_timer(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(handler));
    }
}

impl Default for HostCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for HostCpu {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn enable_interrupts(&self) {
        self.interrupts.store(true, Ordering::SeqCst);
    }

    fn disable_interrupts(&self) {
        self.interrupts.store(false, Ordering::SeqCst);
    }

    fn halt(&self) {
        self.enable_interrupts();
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match timer {
            Some(handler) => handler(),
            None => panic!("halted with no timer installed: nothing can wake the CPU"),
        }
    }

    unsafe fn prepare_stack(&self, _stack_top: usize, boot: BootFn, arg: usize) -> Context {
        let strand = self.next_strand.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        std::thread::Builder::new()
            .name(format!("kthread-{}", strand))
            .spawn(move || {
                shared.wait_turn(strand);
                let outcome = panic::catch_unwind(AssertUnwindSafe(move || -> () { boot(arg) }));
                if let Err(payload) = outcome {
                    shared.poison();
                    panic::resume_unwind(payload);
                }
            })
            .expect("failed to spawn host strand");
        Context { sp: strand }
    }

    unsafe fn switch(&self, from: *mut Context, to: *const Context) {
        assert!(!self.interrupts_enabled(), "context switch with interrupts enabled");
        let me = self.shared.baton().running;
        // SAFETY: valid per the trait contract.
        let next = unsafe {
            (*from).sp = me;
            (*to).sp
        };
        self.shared.pass(next);
        self.shared.wait_turn(me);
    }
}

/// Page-aligned, zeroed memory standing in for a free physical region.
/// Leaked on purpose: pools hand out pointers into it for the whole test.
pub fn page_arena(pages: usize) -> NonNull<u8> {
    let layout =
        Layout::from_size_align(pages.max(1) * PAGE_SIZE, PAGE_SIZE).expect("arena layout");
    // SAFETY: the layout has a non-zero size.
    let ptr = unsafe { alloc_zeroed(layout) };
    NonNull::new(ptr).expect("arena allocation failed")
}

/// Boxes `value` and leaks it, for kernel objects that must be `'static`.
pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}
