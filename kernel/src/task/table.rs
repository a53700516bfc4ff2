//! Task arena.
//!
//! Every task control block lives in one table slot. Queues hold `TaskRef`
//! handles, never tasks, so a task sits in at most one queue without any
//! link fields of its own.

use alloc::vec::Vec;

use super::tcb::Task;

/// Stable handle to a task slot. Valid until the task is reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskRef(usize);

#[derive(Default)]
pub struct TaskTable {
	slots: Vec<Option<Task>>,
	vacant: Vec<usize>,
}

impl TaskTable {
	pub const fn new() -> Self {
		Self {
			slots: Vec::new(),
			vacant: Vec::new(),
		}
	}

	pub fn insert(&mut self, task: Task) -> TaskRef {
		match self.vacant.pop() {
			Some(slot) => {
				self.slots[slot] = Some(task);
				TaskRef(slot)
			}
			None => {
				self.slots.push(Some(task));
				TaskRef(self.slots.len() - 1)
			}
		}
	}

	pub fn remove(&mut self, task: TaskRef) -> Task {
		let removed = self.slots[task.0].take();
		match removed {
			Some(removed) => {
				self.vacant.push(task.0);
				removed
			}
			None => panic!("stale task handle {:?}", task),
		}
	}

	pub fn get(&self, task: TaskRef) -> &Task {
		match self.slots.get(task.0) {
			Some(Some(task)) => task,
			_ => panic!("stale task handle {:?}", task),
		}
	}

	pub fn get_mut(&mut self, task: TaskRef) -> &mut Task {
		match self.slots.get_mut(task.0) {
			Some(Some(task)) => task,
			_ => panic!("stale task handle {:?}", task),
		}
	}

	pub fn iter(&self) -> impl Iterator<Item = (TaskRef, &Task)> {
		self.slots
			.iter()
			.enumerate()
			.filter_map(|(slot, task)| task.as_ref().map(|task| (TaskRef(slot), task)))
	}

	pub fn len(&self) -> usize {
		self.slots.len() - self.vacant.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::PRI_DEFAULT;
	use crate::task::Tid;

	#[test]
	fn test_slots_are_reused() {
		let mut table = TaskTable::new();
		let a = table.insert(Task::new(Tid(1), "a", PRI_DEFAULT, false));
		let b = table.insert(Task::new(Tid(2), "b", PRI_DEFAULT, false));
		assert_eq!(table.len(), 2);

		assert_eq!(table.remove(a).tid, Tid(1));
		let c = table.insert(Task::new(Tid(3), "c", PRI_DEFAULT, false));
		assert_eq!(c, a);
		assert_eq!(table.get(c).name, "c");
		assert_eq!(table.get(b).tid, Tid(2));
		assert_eq!(table.iter().map(|(r, _)| r).collect::<Vec<_>>(), [c, b]);
	}

	#[test]
	#[should_panic(expected = "stale task handle")]
	fn test_stale_handle() {
		let mut table = TaskTable::new();
		let a = table.insert(Task::new(Tid(1), "a", PRI_DEFAULT, false));
		table.remove(a);
		table.get(a);
	}
}
