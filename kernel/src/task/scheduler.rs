// =============================================================================
// kthreads — Scheduler
// =============================================================================
//
// One CPU, many tasks. The scheduler owns:
//   - the task arena and the all-tasks registry
//   - the ready queue, kept sorted by the active policy's key
//   - the sleep queue
//   - the per-tick policy work (aging, MLFQS, round-robin slice)
//
// LIFECYCLE:
//   spawn ──► READY ──(picked)──► RUNNING ──exit──► DYING ──(next task)──► reaped
//               ▲                   │  │
//               └──── yield ────────┘  └── block / sleep ──► BLOCKED
//               ▲                                               │
//               └─────────────────── unblock / wake ────────────┘
//
// PREEMPTION CHECK:
//   After anything that may put a more urgent task at the head of the ready
//   queue (spawn, unblock, priority change, aging, promotion), the head is
//   compared with the running task. If it runs first we yield at once, or,
//   inside an interrupt, at interrupt exit.
//
// LOCKING:
//   All scheduler state sits in one IrqMutex. The guard is dropped before
//   every context switch; the interrupt level of the switching task is held
//   by its own InterruptGuard across the switch and restored when it runs
//   again. Lock order when nested: semaphore state, then scheduler state,
//   then a pool.
//
// =============================================================================

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, info, trace};

use super::queue::{SchedKey, TaskQueue};
use super::sleep::SleepQueue;
use super::table::{TaskRef, TaskTable};
use super::tcb::{Task, TaskInfo, TaskKind, TaskState, Tid};
use crate::arch::Cpu;
use crate::config::{
	Priority, SchedPolicy, AGING_THRESHOLD, MLFQS_LEVELS, PAGE_SIZE, PRI_DEFAULT, PRI_MAX,
	PRI_MIN, TIME_SLICE,
};
use crate::error::{KernelError, KernelResult};
use crate::mm::{AllocFlags, PageAllocator};
use crate::sync::{InterruptGuard, IrqMutex, IrqMutexGuard};

// ── Statistics ──────────────────────────────────────────────────

/// Cumulative timer ticks by what was running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
	pub idle: u64,
	pub kernel: u64,
	pub user: u64,
}

// ── Scheduler state ─────────────────────────────────────────────

/// Everything guarded by the scheduler lock.
pub(crate) struct SchedState {
	policy: SchedPolicy,
	tasks: TaskTable,
	/// Every live task, in creation order. Exiting tasks leave at once.
	all: Vec<TaskRef>,
	ready: TaskQueue,
	sleepers: SleepQueue,
	current: TaskRef,
	idle: Option<TaskRef>,
	/// Task switched away from, until the switch completes.
	prev: Option<TaskRef>,
	next_tid: u32,
	/// Ticks since the running task was switched in.
	slice: u32,
	stats: TickStats,
}

impl SchedState {
	/// Adopts the running flow of control as task "main".
	pub(crate) fn new(policy: SchedPolicy) -> Self {
		let mut tasks = TaskTable::new();
		let mut main = Task::new(Tid(1), "main", PRI_DEFAULT, policy.is_mlfqs());
		main.state = TaskState::Running;
		let main = tasks.insert(main);

		Self {
			policy,
			tasks,
			all: alloc::vec![main],
			ready: TaskQueue::new(),
			sleepers: SleepQueue::new(),
			current: main,
			idle: None,
			prev: None,
			next_tid: 2,
			slice: 0,
			stats: TickStats::default(),
		}
	}

	fn alloc_tid(&mut self) -> Tid {
		let tid = Tid(self.next_tid);
		self.next_tid += 1;
		tid
	}

	fn key(&self, task: TaskRef) -> SchedKey {
		SchedKey::of(self.tasks.get(task), self.policy.is_mlfqs())
	}

	fn is_idle(&self, task: TaskRef) -> bool {
		self.idle == Some(task)
	}

	/// The running task, after checking it is sane.
	fn current_task(&self) -> &Task {
		let task = self.tasks.get(self.current);
		assert_eq!(task.state, TaskState::Running, "current task {} not running", task.tid);
		assert!(task.stack_intact(), "stack overflow in task {}", task.tid);
		task
	}

	/// Marks `task` READY and queues it by key, with a fresh age.
	fn make_ready(&mut self, task: TaskRef) {
		let key = self.key(task);
		let t = self.tasks.get_mut(task);
		t.state = TaskState::Ready;
		t.age = 0;
		self.ready.insert(key, task);
	}

	pub(crate) fn unblock(&mut self, task: TaskRef) {
		let state = self.tasks.get(task).state;
		assert_eq!(
			state,
			TaskState::Blocked,
			"unblocking task {} which is not blocked",
			self.tasks.get(task).tid
		);
		self.make_ready(task);
	}

	/// Re-sorts a queued task after its key changed.
	fn requeue(&mut self, task: TaskRef) {
		if self.ready.remove(&task) {
			let key = self.key(task);
			self.ready.insert(key, task);
		}
	}

	/// Whether the head of the ready queue should displace the running task.
	fn should_preempt(&self) -> bool {
		match self.ready.front_key() {
			None => false,
			Some(_) if self.is_idle(self.current) => true,
			Some(head) => head.runs_before(&self.key(self.current)),
		}
	}

	fn pick_next(&mut self) -> TaskRef {
		match self.ready.pop_front().or(self.idle) {
			Some(next) => next,
			None => panic!("no task to run and no idle task"),
		}
	}

	fn account_tick(&mut self) {
		let current = self.current;
		if self.is_idle(current) {
			self.stats.idle += 1;
		} else if self.tasks.get(current).kind == TaskKind::User {
			self.stats.user += 1;
		} else {
			self.stats.kernel += 1;
		}
	}

	/// Unblocks every sleeper due at `now`. Returns how many woke.
	pub(crate) fn wake_sleepers(&mut self, now: u64) -> usize {
		let due = self.sleepers.take_due(now, &self.tasks);
		for &task in &due {
			self.unblock(task);
		}
		due.len()
	}

	/// Plain-mode aging: every ready task gets older, and one that reaches
	/// the threshold gains a priority point.
	pub(crate) fn age_ready(&mut self) {
		let queued: Vec<TaskRef> = self.ready.iter().copied().collect();
		for task in queued {
			let t = self.tasks.get_mut(task);
			t.age += 1;
			if t.age >= AGING_THRESHOLD {
				t.age = 0;
				if t.priority < PRI_MAX {
					t.priority += 1;
					self.requeue(task);
				}
			}
		}
	}

	/// MLFQS promotion: a task left waiting long enough climbs a level.
	pub(crate) fn promote_ready(&mut self) {
		let queued: Vec<TaskRef> = self.ready.iter().copied().collect();
		for task in queued {
			let t = self.tasks.get_mut(task);
			t.age += 1;
			if t.age >= AGING_THRESHOLD {
				t.age = 0;
				if t.level > 0 {
					let level = t.level - 1;
					t.enter_level(level);
					self.requeue(task);
				}
			}
		}
	}

	/// MLFQS demotion: charges a tick to the running task. Returns whether
	/// its quantum ran out, which asks for a yield.
	pub(crate) fn charge_quantum(&mut self) -> bool {
		let current = self.current;
		if self.is_idle(current) {
			return false;
		}
		let t = self.tasks.get_mut(current);
		t.quantum_left = t.quantum_left.saturating_sub(1);
		if t.quantum_left > 0 {
			return false;
		}
		let level = (t.level + 1).min(MLFQS_LEVELS - 1);
		t.enter_level(level);
		true
	}

	/// Switches policy, re-keying every task and rebuilding the ready queue.
	fn apply_policy(&mut self, policy: SchedPolicy) {
		self.policy = policy;
		let idle = self.idle;
		let refs: Vec<TaskRef> = self.tasks.iter().map(|(r, _)| r).collect();
		for task in refs {
			if Some(task) == idle {
				continue;
			}
			let t = self.tasks.get_mut(task);
			t.age = 0;
			if policy.is_mlfqs() {
				t.enter_level(0);
			} else {
				t.level = 0;
				t.priority = t.base_priority;
			}
		}
		let queued: Vec<TaskRef> = self.ready.drain().collect();
		for task in queued {
			let key = self.key(task);
			self.ready.insert(key, task);
		}
	}

	pub(crate) fn ready_is_sorted(&self) -> bool {
		self.ready.is_sorted()
	}
}

// ── Scheduler ───────────────────────────────────────────────────

/// What a new task needs on its first run.
struct TaskStart {
	sched: &'static Scheduler,
	entry: Box<dyn FnOnce() + Send>,
}

pub struct Scheduler {
	cpu: Arc<dyn Cpu>,
	palloc: Arc<PageAllocator>,
	state: IrqMutex<SchedState>,
	/// Timer ticks since boot.
	ticks: AtomicU64,
	in_interrupt: AtomicBool,
	yield_on_return: AtomicBool,
}

impl Scheduler {
	/// Creates the scheduler and adopts the caller as task "main".
	///
	/// Interrupts must be off; they stay off until `start`.
	pub fn new(cpu: Arc<dyn Cpu>, palloc: Arc<PageAllocator>, policy: SchedPolicy) -> Self {
		assert!(!cpu.interrupts_enabled(), "scheduler created with interrupts enabled");
		info!("sched: {} scheduling", policy);
		Self {
			state: IrqMutex::new(Arc::clone(&cpu), SchedState::new(policy)),
			cpu,
			palloc,
			ticks: AtomicU64::new(0),
			in_interrupt: AtomicBool::new(false),
			yield_on_return: AtomicBool::new(false),
		}
	}

	/// Creates the idle task and enables interrupts: preemptive scheduling
	/// starts here.
	pub fn start(&'static self) -> KernelResult<()> {
		let idle = self.create("idle", PRI_MIN, Box::new(move || self.idle_loop()))?;
		{
			let mut state = self.state.lock();
			assert!(state.idle.is_none(), "scheduler started twice");
			let t = state.tasks.get_mut(idle);
			t.priority = PRI_MIN;
			t.base_priority = PRI_MIN;
			state.idle = Some(idle);
		}
		self.cpu.enable_interrupts();
		Ok(())
	}

	/// Runs whenever nothing else is ready. Never sits in the ready queue.
	fn idle_loop(&self) {
		loop {
			self.cpu.disable_interrupts();
			self.block();
			// Interrupts back on, then sleep until the next one.
			self.cpu.halt();
		}
	}

	// ── Creation ────────────────────────────────────────────────

	/// Creates a task running `entry` and makes it READY.
	///
	/// The task exits when `entry` returns. Fails with `OutOfPages` when the
	/// kernel pool has no page for its stack.
	pub fn spawn<F>(&'static self, name: &str, priority: Priority, entry: F) -> KernelResult<Tid>
	where
		F: FnOnce() + Send + 'static,
	{
		assert!(priority <= PRI_MAX, "priority {} out of range", priority);
		let task = self.create(name, priority, Box::new(entry))?;
		let tid = {
			let mut state = self.state.lock();
			state.make_ready(task);
			state.tasks.get(task).tid
		};
		debug!("sched: spawned {} '{}' at priority {}", tid, name, priority);
		self.preempt_check();
		Ok(tid)
	}

	/// Allocates the page, forges the first frame, registers the task.
	/// The task is left BLOCKED and unqueued.
	fn create(
		&'static self,
		name: &str,
		priority: Priority,
		entry: Box<dyn FnOnce() + Send>,
	) -> KernelResult<TaskRef> {
		let page = self
			.palloc
			.get_page(AllocFlags::ZERO)
			.ok_or(KernelError::OutOfPages)?;

		let start = Box::into_raw(Box::new(TaskStart { sched: self, entry })) as usize;
		let stack_top = page.as_ptr() as usize + PAGE_SIZE;
		// SAFETY: the page was just allocated for this task alone.
		let context = unsafe { self.cpu.prepare_stack(stack_top, task_boot, start) };

		let mut state = self.state.lock();
		let tid = state.alloc_tid();
		let mut task = Task::new(tid, name, priority, state.policy.is_mlfqs());
		// SAFETY: as above.
		unsafe { task.attach_page(page) };
		task.context = context;
		let task = state.tasks.insert(task);
		state.all.push(task);
		Ok(task)
	}

	// ── Switching ───────────────────────────────────────────────

	/// Picks the next task and switches to it. The running task's state must
	/// already say where it is going.
	fn schedule(&self, mut state: IrqMutexGuard<'_, SchedState>) {
		assert!(!state.interrupts_were_enabled(), "scheduling with interrupts enabled");
		let cur = state.current;
		assert_ne!(state.tasks.get(cur).state, TaskState::Running);

		let next = state.pick_next();
		assert!(
			state.tasks.get(next).stack_intact(),
			"stack overflow in task {}",
			state.tasks.get(next).tid
		);

		if next != cur {
			trace!("sched: {} -> {}", state.tasks.get(cur).tid, state.tasks.get(next).tid);
			state.current = next;
			state.prev = Some(cur);
			let from = &raw mut state.tasks.get_mut(cur).context;
			let to = &raw const state.tasks.get(next).context;
			drop(state);
			// SAFETY: interrupts are off and both contexts live in the arena
			// until their tasks are reaped, which cannot happen mid-switch.
			unsafe { self.cpu.switch(from, to) };
		} else {
			drop(state);
		}
		self.finish_switch();
	}

	/// Runs on the incoming task right after a switch: marks it RUNNING,
	/// starts a new slice, and reaps the previous task if it was dying.
	fn finish_switch(&self) {
		let dead = {
			let mut state = self.state.lock();
			let cur = state.current;
			state.tasks.get_mut(cur).state = TaskState::Running;
			state.slice = 0;
			match state.prev.take() {
				Some(prev) if state.tasks.get(prev).state == TaskState::Dying => {
					Some(state.tasks.remove(prev))
				}
				_ => None,
			}
		};

		if let Some(task) = dead {
			debug!("sched: reaped {} '{}'", task.tid, task.name);
			if let Some(page) = task.page() {
				// SAFETY: the dying task's stack is no longer in use.
				unsafe { self.palloc.free_page(page) };
			}
		}
	}

	// ── Task-context operations ─────────────────────────────────

	/// Puts the running task to sleep until someone unblocks it.
	///
	/// Interrupts must be off; the caller has already queued the task
	/// wherever its waker will find it.
	pub fn block(&self) {
		assert!(!self.in_interrupt(), "block called from interrupt context");
		let mut state = self.state.lock();
		let cur = state.current;
		state.tasks.get_mut(cur).state = TaskState::Blocked;
		self.schedule(state);
	}

	/// Gives up the CPU. The running task goes back into the ready queue
	/// behind every task with the same key.
	pub fn yield_now(&self) {
		assert!(!self.in_interrupt(), "yield called from interrupt context");
		let _irq = InterruptGuard::new(self.cpu());
		let mut state = self.state.lock();
		let cur = state.current;
		if state.is_idle(cur) {
			state.tasks.get_mut(cur).state = TaskState::Ready;
		} else {
			state.make_ready(cur);
		}
		self.schedule(state);
	}

	/// Ends the running task. Its page is released once the next task is
	/// on the CPU.
	pub fn exit(&self) -> ! {
		assert!(!self.in_interrupt(), "exit called from interrupt context");
		self.cpu.disable_interrupts();
		let mut state = self.state.lock();
		let cur = state.current;
		assert!(!state.is_idle(cur), "idle task exited");
		state.all.retain(|&task| task != cur);
		let t = state.tasks.get_mut(cur);
		t.state = TaskState::Dying;
		debug!("sched: {} '{}' exiting", t.tid, t.name);
		self.schedule(state);
		unreachable!("dying task scheduled again");
	}

	/// Blocks the running task until tick `deadline`.
	pub fn sleep_until(&self, deadline: u64) {
		assert!(!self.in_interrupt(), "sleep called from interrupt context");
		let _irq = InterruptGuard::new(self.cpu());
		if deadline <= self.ticks() {
			return;
		}
		let mut state = self.state.lock();
		let cur = state.current;
		assert!(!state.is_idle(cur), "idle task cannot sleep");
		let t = state.tasks.get_mut(cur);
		t.wake_at = deadline;
		t.state = TaskState::Blocked;
		state.sleepers.insert(cur, deadline);
		self.schedule(state);
	}

	/// Blocks the running task for `ticks` timer ticks.
	pub fn sleep(&self, ticks: u64) {
		self.sleep_until(self.ticks().saturating_add(ticks));
	}

	/// Wakes every sleeper whose deadline is `<= now`. Interrupts must be
	/// off; the caller runs the preemption check.
	pub fn wake(&self, now: u64) -> usize {
		let mut state = self.state.lock();
		assert!(!state.interrupts_were_enabled(), "wake with interrupts enabled");
		state.wake_sleepers(now)
	}

	/// Makes a BLOCKED task READY. Does not preempt: the caller finishes its
	/// own bookkeeping first, then calls `preempt_check`.
	pub(crate) fn unblock(&self, task: TaskRef) {
		self.state.lock().unblock(task);
	}

	/// Queues the running task on `queue` by its current key.
	pub(crate) fn enqueue_current(&self, queue: &mut TaskQueue) {
		let state = self.state.lock();
		let cur = state.current;
		queue.insert(state.key(cur), cur);
	}

	/// Yields if the head of the ready queue should run before the current
	/// task. Inside an interrupt the yield waits for interrupt exit.
	pub fn preempt_check(&self) {
		let preempt = self.state.lock().should_preempt();
		if !preempt {
			return;
		}
		if self.in_interrupt() {
			self.yield_on_return.store(true, Ordering::SeqCst);
		} else {
			self.yield_now();
		}
	}

	/// Sets the running task's priority and yields if it is no longer the
	/// most urgent. Under MLFQS only the base priority is recorded.
	pub fn set_priority(&self, priority: Priority) {
		assert!(priority <= PRI_MAX, "priority {} out of range", priority);
		{
			let mut state = self.state.lock();
			let cur = state.current;
			let mlfqs = state.policy.is_mlfqs();
			let t = state.tasks.get_mut(cur);
			t.base_priority = priority;
			if !mlfqs {
				t.priority = priority;
			}
		}
		self.preempt_check();
	}

	pub fn get_priority(&self) -> Priority {
		self.state.lock().current_task().priority
	}

	pub fn base_priority(&self) -> Priority {
		self.state.lock().current_task().base_priority
	}

	/// Classifies the running task's ticks as kernel or user time.
	pub fn set_kind(&self, kind: TaskKind) {
		let mut state = self.state.lock();
		let cur = state.current;
		state.tasks.get_mut(cur).kind = kind;
	}

	// ── Interrupt entry points ──────────────────────────────────

	/// Marks the start of an interrupt handler. Interrupts must be off.
	pub fn interrupt_enter(&self) {
		assert!(!self.cpu.interrupts_enabled(), "interrupt entered with interrupts enabled");
		let nested = self.in_interrupt.swap(true, Ordering::SeqCst);
		assert!(!nested, "nested interrupt");
	}

	/// Marks the end of an interrupt handler and performs the yield
	/// requested during it, if any.
	pub fn interrupt_exit(&self) {
		assert!(self.in_interrupt(), "interrupt exit outside interrupt context");
		self.in_interrupt.store(false, Ordering::SeqCst);
		if self.yield_on_return.swap(false, Ordering::SeqCst) {
			self.yield_now();
		}
	}

	pub fn in_interrupt(&self) -> bool {
		self.in_interrupt.load(Ordering::SeqCst)
	}

	/// Timer tick. Called from the timer handler between
	/// `interrupt_enter` and `interrupt_exit`.
	pub fn tick(&self) {
		assert!(self.in_interrupt(), "tick outside interrupt context");
		let now = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
		self.wake(now);

		let slice_over = {
			let mut state = self.state.lock();
			state.account_tick();
			match state.policy {
				SchedPolicy::Priority { aging: true } => {
					state.age_ready();
					false
				}
				SchedPolicy::Priority { aging: false } => {
					state.slice += 1;
					state.slice >= TIME_SLICE
				}
				SchedPolicy::Mlfqs => {
					state.promote_ready();
					state.charge_quantum()
				}
			}
		};

		if slice_over {
			self.yield_on_return.store(true, Ordering::SeqCst);
		}
		self.preempt_check();
	}

	/// A whole timer interrupt: enter, tick, exit.
	pub fn timer_interrupt(&self) {
		let _irq = InterruptGuard::new(self.cpu());
		self.interrupt_enter();
		self.tick();
		self.interrupt_exit();
	}

	// ── Mode selection ──────────────────────────────────────────

	pub fn policy(&self) -> SchedPolicy {
		self.state.lock().policy
	}

	/// Switches scheduling policy. Every task is re-keyed: MLFQS puts all of
	/// them on level 0, plain mode restores their base priorities.
	pub fn set_policy(&self, policy: SchedPolicy) {
		self.state.lock().apply_policy(policy);
		info!("sched: {} scheduling", policy);
		self.preempt_check();
	}

	// ── Introspection ───────────────────────────────────────────

	pub fn cpu(&self) -> &dyn Cpu {
		&*self.cpu
	}

	pub fn palloc(&self) -> &PageAllocator {
		&self.palloc
	}

	/// Timer ticks since boot.
	pub fn ticks(&self) -> u64 {
		self.ticks.load(Ordering::SeqCst)
	}

	pub fn current_tid(&self) -> Tid {
		self.state.lock().current_task().tid
	}

	pub fn current_name(&self) -> String {
		self.state.lock().current_task().name.clone()
	}

	pub fn current_info(&self) -> TaskInfo {
		self.state.lock().current_task().info()
	}

	/// Snapshots of every live task, in creation order.
	pub fn tasks(&self) -> Vec<TaskInfo> {
		let state = self.state.lock();
		state.all.iter().map(|&task| state.tasks.get(task).info()).collect()
	}

	/// Calls `f` on a snapshot of every live task. No scheduler lock is held
	/// while `f` runs.
	pub fn for_each(&self, mut f: impl FnMut(&TaskInfo)) {
		for info in self.tasks() {
			f(&info);
		}
	}

	/// Tids in ready-queue order.
	pub fn ready_tids(&self) -> Vec<Tid> {
		let state = self.state.lock();
		state.ready.iter().map(|&task| state.tasks.get(task).tid).collect()
	}

	pub fn ready_is_sorted(&self) -> bool {
		self.state.lock().ready_is_sorted()
	}

	/// Earliest pending wake-up tick.
	pub fn next_wakeup(&self) -> Option<u64> {
		self.state.lock().sleepers.next_wake()
	}

	pub fn stats(&self) -> TickStats {
		self.state.lock().stats
	}

	pub fn print_stats(&self) {
		let stats = self.stats();
		info!(
			"Thread: {} idle ticks, {} kernel ticks, {} user ticks",
			stats.idle, stats.kernel, stats.user
		);
	}
}

/// First code a new task runs, reached through the forged stack frame.
extern "C-unwind" fn task_boot(arg: usize) -> ! {
	// SAFETY: `arg` is the TaskStart leaked by `create`, used exactly once.
	let start = unsafe { Box::from_raw(arg as *mut TaskStart) };
	let TaskStart { sched, entry } = *start;

	sched.finish_switch();
	sched.cpu.enable_interrupts();
	entry();
	sched.exit()
}
