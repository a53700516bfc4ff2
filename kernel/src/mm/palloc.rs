//! Page allocator: two pools, one placement strategy switch.
//!
//! Free memory handed over at boot is split in half. The upper half becomes
//! the user pool (capped by the configured limit), the rest the kernel pool.
//! Requests pick a pool with `AllocFlags::USER` and get contiguous pages
//! placed by the current `AllocStrategy`.

use alloc::sync::Arc;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;
use log::{info, trace, warn};

use super::pool::Pool;
use crate::arch::Cpu;
use crate::config::{AllocStrategy, KernelConfig, FREED_PAGE_FILL, PAGE_SIZE};

bitflags! {
	/// How a page request behaves.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct AllocFlags: u32 {
		/// Panic instead of returning `None` when the pool is exhausted.
		const ASSERT = 1 << 0;
		/// Zero the pages before returning them.
		const ZERO = 1 << 1;
		/// Allocate from the user pool.
		const USER = 1 << 2;
	}
}

pub struct PageAllocator {
	kernel: Pool,
	user: Pool,
	strategy: AtomicU8,
}

impl PageAllocator {
	/// Carves the kernel and user pools out of `free_pages` pages at
	/// `free_start`.
	///
	/// # Safety
	/// The region must be page aligned, unused, and handed over to the
	/// allocator for good.
	pub unsafe fn new(
		cpu: Arc<dyn Cpu>,
		free_start: NonNull<u8>,
		free_pages: usize,
		config: &KernelConfig,
	) -> Self {
		let user_pages = (free_pages / 2).min(config.user_page_limit);
		let kernel_pages = free_pages - user_pages;

		// SAFETY: both halves are disjoint sub-ranges of the caller's region.
		let (kernel, user) = unsafe {
			let user_start = NonNull::new_unchecked(free_start.as_ptr().add(kernel_pages * PAGE_SIZE));
			(
				Pool::new(Arc::clone(&cpu), "kernel pool", free_start, kernel_pages),
				Pool::new(cpu, "user pool", user_start, user_pages),
			)
		};
		Self::from_pools(kernel, user, config.strategy)
	}

	/// Assembles an allocator from pools built by the caller.
	pub fn from_pools(kernel: Pool, user: Pool, strategy: AllocStrategy) -> Self {
		Self {
			kernel,
			user,
			strategy: AtomicU8::new(strategy.to_raw()),
		}
	}

	pub fn strategy(&self) -> AllocStrategy {
		AllocStrategy::from_raw(self.strategy.load(Ordering::Relaxed))
	}

	/// Selects the placement strategy for all later requests.
	pub fn set_strategy(&self, strategy: AllocStrategy) {
		self.strategy.store(strategy.to_raw(), Ordering::Relaxed);
		info!("palloc: placement strategy is now {}", strategy);
	}

	pub fn kernel_pool(&self) -> &Pool {
		&self.kernel
	}

	pub fn user_pool(&self) -> &Pool {
		&self.user
	}

	/// Gets `page_cnt` contiguous free pages.
	///
	/// Returns `None` when no sufficient run exists, or panics if `ASSERT`
	/// is set. A zero-page request always returns `None`.
	pub fn get_multiple(&self, flags: AllocFlags, page_cnt: usize) -> Option<NonNull<u8>> {
		if page_cnt == 0 {
			return None;
		}

		let pool = if flags.contains(AllocFlags::USER) { &self.user } else { &self.kernel };
		let pages = pool
			.claim(self.strategy(), page_cnt)
			.map(|idx| pool.page_addr(idx));

		match pages {
			Some(pages) => {
				if flags.contains(AllocFlags::ZERO) {
					// SAFETY: the run was just claimed and belongs to nobody else.
					unsafe { ptr::write_bytes(pages.as_ptr(), 0, page_cnt * PAGE_SIZE) };
				}
				trace!("palloc: {} page(s) at {:p} from {}", page_cnt, pages, pool.name());
				Some(pages)
			}
			None if flags.contains(AllocFlags::ASSERT) => {
				panic!("palloc: out of pages ({} requested from {})", page_cnt, pool.name());
			}
			None => {
				warn!("palloc: no run of {} free page(s) in {}", page_cnt, pool.name());
				None
			}
		}
	}

	/// Gets a single free page.
	pub fn get_page(&self, flags: AllocFlags) -> Option<NonNull<u8>> {
		self.get_multiple(flags, 1)
	}

	/// Returns `page_cnt` pages starting at `pages`.
	///
	/// # Panics
	/// If `pages` is unaligned, lies in neither pool, runs past the end of
	/// its pool, or any page in the range is already free.
	///
	/// # Safety
	/// The pages must not be used after this call. In debug builds they are
	/// overwritten with `FREED_PAGE_FILL`.
	pub unsafe fn free_multiple(&self, pages: NonNull<u8>, page_cnt: usize) {
		let addr = pages.as_ptr() as usize;
		assert_eq!(addr % PAGE_SIZE, 0, "palloc: freeing unaligned address {:#x}", addr);
		if page_cnt == 0 {
			return;
		}

		let pool = match self.pool_of(addr) {
			Some(pool) => pool,
			None => panic!("palloc: freeing {:#x}, which belongs to neither pool", addr),
		};
		let idx = pool.page_index(addr);
		assert!(
			idx + page_cnt <= pool.page_count(),
			"palloc: freeing {} page(s) at index {} overruns {}",
			page_cnt,
			idx,
			pool.name()
		);

		if cfg!(debug_assertions) {
			// SAFETY: the range lies inside the pool and the caller gives it up.
			unsafe { ptr::write_bytes(pages.as_ptr(), FREED_PAGE_FILL, page_cnt * PAGE_SIZE) };
		}

		pool.release(idx, page_cnt);
	}

	/// Returns the single page at `page`.
	///
	/// # Safety
	/// Same as `free_multiple`.
	pub unsafe fn free_page(&self, page: NonNull<u8>) {
		unsafe { self.free_multiple(page, 1) }
	}

	/// Index of the page holding `ptr` inside whichever pool owns it.
	pub fn page_index_of(&self, ptr: *const u8) -> Option<usize> {
		let addr = ptr as usize;
		self.pool_of(addr).map(|pool| pool.page_index(addr))
	}

	fn pool_of(&self, addr: usize) -> Option<&Pool> {
		[&self.kernel, &self.user]
			.into_iter()
			.find(|pool| pool.contains(addr))
	}
}
