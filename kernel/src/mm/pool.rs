//! A memory pool: a contiguous run of physical pages plus its free map.
//!
//! The free map lives in the pool's own leading pages, so a pool of N pages
//! exposes slightly fewer than N. Every search, claim and release runs under
//! the pool's guard; kernel and user pools have independent guards.

use alloc::sync::Arc;
use core::ptr::NonNull;

use log::info;

use super::bitmap::Bitmap;
use super::placement;
use crate::arch::Cpu;
use crate::config::{AllocStrategy, PAGE_SIZE};
use crate::sync::IrqMutex;

/// Free map plus next-fit cursor. Only touched under the pool guard.
struct PoolState {
	used: Bitmap<'static>,
	cursor: usize,
}

// Safety: the bitmap points into pool memory that only this state accesses,
// and only under the pool guard.
unsafe impl Send for PoolState {}

pub struct Pool {
	name: &'static str,
	/// Address of allocatable page 0 (just past the free map).
	base: usize,
	/// Allocatable pages.
	pages: usize,
	state: IrqMutex<PoolState>,
}

impl Pool {
	/// Builds a pool over `page_cnt` pages starting at `start`, reserving
	/// the leading pages for the free map.
	///
	/// # Panics
	/// If the free map alone does not fit in `page_cnt` pages.
	///
	/// # Safety
	/// `start` must be page aligned and the region must be unused memory
	/// owned exclusively by this pool for the rest of the kernel's life.
	pub unsafe fn new(
		cpu: Arc<dyn Cpu>,
		name: &'static str,
		start: NonNull<u8>,
		page_cnt: usize,
	) -> Self {
		let start = start.as_ptr() as usize;
		assert_eq!(start % PAGE_SIZE, 0, "{} starts at unaligned {:#x}", name, start);

		// ── 1. Size the free map and carve it out of the front ──
		let map_pages = Bitmap::bytes_for(page_cnt).div_ceil(PAGE_SIZE);
		if map_pages > page_cnt {
			panic!("Not enough memory in {} for bitmap.", name);
		}
		let pages = page_cnt - map_pages;

		// ── 2. Clear it: every page starts out free ──
		// SAFETY: the leading `map_pages` pages belong to us and are aligned.
		let used = unsafe { Bitmap::from_raw(start as *mut usize, pages) };

		info!("{} pages available in {}.", pages, name);

		Self {
			name,
			base: start + map_pages * PAGE_SIZE,
			pages,
			state: IrqMutex::new(cpu, PoolState { used, cursor: 0 }),
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Allocatable pages, as reported at initialization.
	pub fn page_count(&self) -> usize {
		self.pages
	}

	/// Address of page `idx`.
	pub fn page_addr(&self, idx: usize) -> NonNull<u8> {
		assert!(idx < self.pages, "page {} outside {}", idx, self.name);
		// SAFETY: base is non-zero and the offset stays inside the pool.
		unsafe { NonNull::new_unchecked((self.base + idx * PAGE_SIZE) as *mut u8) }
	}

	/// Whether `addr` falls inside the allocatable range.
	pub fn contains(&self, addr: usize) -> bool {
		addr >= self.base && addr < self.base + self.pages * PAGE_SIZE
	}

	/// Index of the page holding `addr`. `addr` must be inside the pool.
	pub fn page_index(&self, addr: usize) -> usize {
		debug_assert!(self.contains(addr));
		(addr - self.base) / PAGE_SIZE
	}

	/// Currently free pages.
	pub fn free_pages(&self) -> usize {
		let state = self.state.lock();
		state.used.count(0, self.pages, false)
	}

	/// Whether page `idx` is part of a live allocation.
	pub fn is_used(&self, idx: usize) -> bool {
		self.state.lock().used.test(idx)
	}

	/// Searches for and claims `cnt` pages in one guarded step.
	pub(super) fn claim(&self, strategy: AllocStrategy, cnt: usize) -> Option<usize> {
		let mut state = self.state.lock();
		let PoolState { used, cursor } = &mut *state;
		placement::claim(strategy, used, cursor, cnt)
	}

	/// Returns `[idx, idx + cnt)` to the pool.
	///
	/// # Panics
	/// If any page in the range is already free.
	pub(super) fn release(&self, idx: usize, cnt: usize) {
		let mut state = self.state.lock();
		assert!(
			state.used.all(idx, cnt),
			"{}: freeing pages {}..{} that are not all allocated (double free?)",
			self.name,
			idx,
			idx + cnt
		);
		state.used.set_range(idx, cnt, false);
	}
}
