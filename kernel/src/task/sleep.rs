//! Sleep queue: blocked tasks waiting for a wake-up tick.
//!
//! Unordered. The earliest deadline is cached so a tick with nothing due
//! costs one comparison; the queue is only scanned when something is due.

use alloc::vec::Vec;

use super::table::{TaskRef, TaskTable};

pub struct SleepQueue {
	sleepers: Vec<TaskRef>,
	next_wake: u64,
}

impl SleepQueue {
	pub const fn new() -> Self {
		Self {
			sleepers: Vec::new(),
			next_wake: u64::MAX,
		}
	}

	/// Adds a sleeper whose deadline is already stored in its task.
	pub fn insert(&mut self, task: TaskRef, deadline: u64) {
		self.sleepers.push(task);
		self.next_wake = self.next_wake.min(deadline);
	}

	/// Earliest deadline, if anyone sleeps.
	pub fn next_wake(&self) -> Option<u64> {
		(!self.sleepers.is_empty()).then_some(self.next_wake)
	}

	/// Removes every sleeper whose deadline is `<= now` and recomputes the
	/// cached minimum from the rest.
	pub fn take_due(&mut self, now: u64, tasks: &TaskTable) -> Vec<TaskRef> {
		if now < self.next_wake {
			return Vec::new();
		}

		let (due, rest): (Vec<TaskRef>, Vec<TaskRef>) = self
			.sleepers
			.drain(..)
			.partition(|&task| tasks.get(task).wake_at <= now);
		self.sleepers = rest;
		self.next_wake = self
			.sleepers
			.iter()
			.map(|&task| tasks.get(task).wake_at)
			.min()
			.unwrap_or(u64::MAX);
		due
	}

	pub fn len(&self) -> usize {
		self.sleepers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sleepers.is_empty()
	}
}

impl Default for SleepQueue {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::PRI_DEFAULT;
	use crate::task::tcb::{Task, Tid};

	fn sleeper(tasks: &mut TaskTable, queue: &mut SleepQueue, tid: u32, deadline: u64) -> TaskRef {
		let mut task = Task::new(Tid(tid), "sleeper", PRI_DEFAULT, false);
		task.wake_at = deadline;
		let task = tasks.insert(task);
		queue.insert(task, deadline);
		task
	}

	#[test]
	fn test_wakes_due_and_recomputes_minimum() {
		let mut tasks = TaskTable::new();
		let mut queue = SleepQueue::new();
		assert_eq!(queue.next_wake(), None);

		let a = sleeper(&mut tasks, &mut queue, 1, 30);
		let b = sleeper(&mut tasks, &mut queue, 2, 10);
		let c = sleeper(&mut tasks, &mut queue, 3, 10);
		assert_eq!(queue.next_wake(), Some(10));

		assert!(queue.take_due(9, &tasks).is_empty());
		assert_eq!(queue.take_due(10, &tasks), [b, c]);
		assert_eq!(queue.next_wake(), Some(30));
		assert_eq!(queue.len(), 1);

		assert_eq!(queue.take_due(100, &tasks), [a]);
		assert!(queue.is_empty());
		assert_eq!(queue.next_wake(), None);
	}
}
