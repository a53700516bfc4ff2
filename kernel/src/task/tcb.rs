//! Task control block.

use alloc::string::String;
use core::fmt;
use core::ptr::NonNull;

use crate::arch::Context;
use crate::config::{
	Priority, MLFQS_QUANTUM, MLFQS_TIER_PRIORITY, STACK_MAGIC, TASK_NAME_MAX,
};

// ── Task identifiers ────────────────────────────────────────────

/// Thread identifier. Allocated sequentially from 1; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

// ── Task state ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
	/// In the ready queue (or the idle task, which is never queued).
	Ready,
	/// On the CPU.
	Running,
	/// Waiting on a semaphore or a sleep deadline.
	Blocked,
	/// Exited; storage is reclaimed by whoever runs next.
	Dying,
}

/// What a tick spent in this task counts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskKind {
	#[default]
	Kernel,
	User,
}

// ── Task ────────────────────────────────────────────────────────

pub struct Task {
	pub tid: Tid,
	pub name: String,
	pub state: TaskState,
	pub kind: TaskKind,
	/// Saved stack pointer while not running.
	pub context: Context,
	/// Priority the ready queue orders by.
	pub priority: Priority,
	/// Priority the task asked for; aging and MLFQS never touch it.
	pub base_priority: Priority,
	/// Ticks spent ready since the last aging step.
	pub age: u32,
	/// MLFQS queue level, 0 is the most urgent.
	pub level: usize,
	/// MLFQS ticks left before demotion.
	pub quantum_left: u32,
	/// Tick at which a sleeping task wakes.
	pub wake_at: u64,
	/// Backing page: guard header at the bottom, stack above it.
	page: Option<NonNull<u8>>,
}

// Safety: the page pointer is owned by the task and only dereferenced
// under the scheduler lock.
unsafe impl Send for Task {}

impl Task {
	pub fn new(tid: Tid, name: &str, priority: Priority, mlfqs: bool) -> Self {
		let mut task = Self {
			tid,
			name: name.chars().take(TASK_NAME_MAX).collect(),
			state: TaskState::Blocked,
			kind: TaskKind::Kernel,
			context: Context::default(),
			priority,
			base_priority: priority,
			age: 0,
			level: 0,
			quantum_left: MLFQS_QUANTUM[0],
			wake_at: 0,
			page: None,
		};
		if mlfqs {
			task.enter_level(0);
		}
		task
	}

	/// Moves to MLFQS `level`: tier priority and a fresh quantum.
	pub fn enter_level(&mut self, level: usize) {
		self.level = level;
		self.priority = MLFQS_TIER_PRIORITY[level];
		self.quantum_left = MLFQS_QUANTUM[level];
	}

	/// Takes ownership of `page` and stamps the guard value at its base.
	///
	/// # Safety
	/// `page` must be a writable, exclusively owned page.
	pub unsafe fn attach_page(&mut self, page: NonNull<u8>) {
		unsafe { page.cast::<u32>().as_ptr().write_volatile(STACK_MAGIC) };
		self.page = Some(page);
	}

	pub fn page(&self) -> Option<NonNull<u8>> {
		self.page
	}

	/// False once the stack has grown into the guard header.
	pub fn stack_intact(&self) -> bool {
		match self.page {
			// SAFETY: the page stays allocated for the task's lifetime.
			Some(page) => unsafe { page.cast::<u32>().as_ptr().read_volatile() == STACK_MAGIC },
			None => true,
		}
	}

	pub fn info(&self) -> TaskInfo {
		TaskInfo {
			tid: self.tid,
			name: self.name.clone(),
			state: self.state,
			kind: self.kind,
			priority: self.priority,
			base_priority: self.base_priority,
			level: self.level,
		}
	}
}

/// Snapshot of a task for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
	pub tid: Tid,
	pub name: String,
	pub state: TaskState,
	pub kind: TaskKind,
	pub priority: Priority,
	pub base_priority: Priority,
	pub level: usize,
}
