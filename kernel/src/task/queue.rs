//! Scheduling key and the ordered queues built on it.
//!
//! Plain priority mode orders by priority, highest first. MLFQS orders by
//! queue level (lowest first), then priority. Insertion is stable: an entry
//! goes behind every entry that runs no later than it, so equal keys keep
//! arrival order. Keys are captured at insertion; a task whose priority or
//! level changes while queued has to be removed and inserted again.

use alloc::collections::VecDeque;

use super::table::TaskRef;
use super::tcb::Task;
use crate::config::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedKey {
	level: usize,
	priority: Priority,
}

impl SchedKey {
	/// Key of `task` under the active policy.
	pub fn of(task: &Task, mlfqs: bool) -> Self {
		Self {
			level: if mlfqs { task.level } else { 0 },
			priority: task.priority,
		}
	}

	/// Key that orders by priority alone.
	pub const fn priority(priority: Priority) -> Self {
		Self { level: 0, priority }
	}

	/// Strictly more urgent than `other`.
	pub fn runs_before(&self, other: &SchedKey) -> bool {
		self.level < other.level || (self.level == other.level && self.priority > other.priority)
	}
}

/// Queue kept sorted by `SchedKey`.
pub struct OrderedQueue<T> {
	entries: VecDeque<(SchedKey, T)>,
}

/// Ready queue and semaphore wait queues.
pub type TaskQueue = OrderedQueue<TaskRef>;

impl<T> OrderedQueue<T> {
	pub const fn new() -> Self {
		Self {
			entries: VecDeque::new(),
		}
	}

	pub fn insert(&mut self, key: SchedKey, item: T) {
		let pos = self
			.entries
			.iter()
			.position(|(queued, _)| key.runs_before(queued))
			.unwrap_or(self.entries.len());
		self.entries.insert(pos, (key, item));
	}

	pub fn pop_front(&mut self) -> Option<T> {
		self.entries.pop_front().map(|(_, item)| item)
	}

	pub fn front_key(&self) -> Option<SchedKey> {
		self.entries.front().map(|(key, _)| *key)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.entries.iter().map(|(_, item)| item)
	}

	/// Empties the queue, handing back the items in queue order.
	pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
		self.entries.drain(..).map(|(_, item)| item)
	}

	/// Whether the keys are in non-increasing urgency.
	pub fn is_sorted(&self) -> bool {
		self.entries
			.iter()
			.zip(self.entries.iter().skip(1))
			.all(|((a, _), (b, _))| !b.runs_before(a))
	}
}

impl<T: PartialEq> OrderedQueue<T> {
	/// Removes `item`. Returns whether it was queued.
	pub fn remove(&mut self, item: &T) -> bool {
		match self.entries.iter().position(|(_, queued)| queued == item) {
			Some(pos) => {
				self.entries.remove(pos);
				true
			}
			None => false,
		}
	}
}

impl<T> Default for OrderedQueue<T> {
	fn default() -> Self {
		Self::new()
	}
}
