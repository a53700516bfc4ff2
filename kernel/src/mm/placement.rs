//! Placement strategies.
//!
//! Each strategy finds a run of free bits and claims it in the same call:
//! the caller holds the pool guard across both, so nothing can slip in
//! between the search and the claim.

use super::bitmap::Bitmap;
use crate::config::AllocStrategy;

/// Finds and claims `cnt` pages with `strategy`. Returns the first index.
pub fn claim(
	strategy: AllocStrategy,
	map: &mut Bitmap<'_>,
	cursor: &mut usize,
	cnt: usize,
) -> Option<usize> {
	if cnt == 0 || cnt > map.len() {
		return None;
	}
	match strategy {
		AllocStrategy::FirstFit => first_fit(map, cnt),
		AllocStrategy::NextFit => next_fit(map, cursor, cnt),
		AllocStrategy::BestFit => best_fit(map, cnt),
		AllocStrategy::Buddy => buddy_fit(map, cnt),
	}
}

/// Lowest-indexed run of `cnt` free pages.
pub fn first_fit(map: &mut Bitmap<'_>, cnt: usize) -> Option<usize> {
	let idx = map.scan(0, cnt, false)?;
	map.set_range(idx, cnt, true);
	Some(idx)
}

/// First run at or after `cursor`; failing that, the first run before it.
/// The cursor moves just past the claimed run, wrapping to 0 at the end.
pub fn next_fit(map: &mut Bitmap<'_>, cursor: &mut usize, cnt: usize) -> Option<usize> {
	let start = (*cursor).min(map.len());
	// Runs starting at or after the cursor were all rejected by the first
	// pass, so the wrapped pass can only succeed before the cursor.
	let idx = map
		.scan(start, cnt, false)
		.or_else(|| map.scan(0, cnt, false))?;
	map.set_range(idx, cnt, true);

	*cursor = idx + cnt;
	if *cursor >= map.len() {
		*cursor = 0;
	}
	Some(idx)
}

/// Smallest free run that still holds `cnt` pages. An exact fit ends the
/// walk; ties go to the lower index.
pub fn best_fit(map: &mut Bitmap<'_>, cnt: usize) -> Option<usize> {
	let mut best: Option<(usize, usize)> = None;
	let mut idx = 0;
	while idx < map.len() {
		if map.test(idx) {
			idx += 1;
			continue;
		}
		let run = map.run_len(idx, false);
		if run == cnt {
			best = Some((idx, run));
			break;
		}
		if run > cnt && best.is_none_or(|(_, len)| run < len) {
			best = Some((idx, run));
		}
		idx += run;
	}

	let (idx, _) = best?;
	map.set_range(idx, cnt, true);
	Some(idx)
}

/// First fully free block of `cnt.next_power_of_two()` pages at an index
/// that is a multiple of the block size.
///
/// Only the requested pages are marked used; the tail of the block stays
/// free but no later block-aligned search will pick the block again while
/// any of its pages is in use.
pub fn buddy_fit(map: &mut Bitmap<'_>, cnt: usize) -> Option<usize> {
	let block = cnt.checked_next_power_of_two()?;
	let idx = (0..map.len())
		.step_by(block)
		.take_while(|&start| start.checked_add(block).is_some_and(|end| end <= map.len()))
		.find(|&start| map.none(start, block))?;
	map.set_range(idx, cnt, true);
	Some(idx)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn with_map(bits: usize, f: impl FnOnce(&mut Bitmap<'_>)) {
		let mut words = [0usize; 4];
		let mut map = Bitmap::new(&mut words, bits);
		f(&mut map);
	}

	#[test]
	fn test_first_fit_lowest_run() {
		with_map(20, |map| {
			assert_eq!(first_fit(map, 4), Some(0));
			assert_eq!(first_fit(map, 4), Some(4));
			map.set_range(0, 4, false);
			assert_eq!(first_fit(map, 4), Some(0));
			assert_eq!(first_fit(map, 13), None);
			assert_eq!(first_fit(map, 12), Some(8));
		});
	}

	#[test]
	fn test_next_fit_advances_cursor() {
		with_map(20, |map| {
			let mut cursor = 0;
			assert_eq!(next_fit(map, &mut cursor, 4), Some(0));
			assert_eq!(cursor, 4);
			map.set_range(0, 4, false);
			// Still continues from the cursor, not from the hole at 0.
			assert_eq!(next_fit(map, &mut cursor, 4), Some(4));
			assert_eq!(cursor, 8);
		});
	}

	#[test]
	fn test_next_fit_wraps() {
		with_map(20, |map| {
			let mut cursor = 0;
			assert_eq!(next_fit(map, &mut cursor, 16), Some(0));
			assert_eq!(next_fit(map, &mut cursor, 4), Some(16));
			// Claim reached the end: cursor wraps.
			assert_eq!(cursor, 0);

			map.set_range(2, 5, false);
			cursor = 10;
			assert_eq!(next_fit(map, &mut cursor, 5), Some(2));
			assert_eq!(cursor, 7);
			assert_eq!(next_fit(map, &mut cursor, 1), None);
		});
	}

	#[test]
	fn test_best_fit_prefers_exact_match() {
		with_map(20, |map| {
			// Free runs: [0, 10) and [15, 18).
			map.set_range(10, 5, true);
			map.set_range(18, 2, true);
			assert_eq!(best_fit(map, 3), Some(15));
			assert_eq!(best_fit(map, 3), Some(0));
		});
	}

	#[test]
	fn test_best_fit_smallest_sufficient_run() {
		with_map(30, |map| {
			// Free runs: [0, 8), [9, 14), [15, 30).
			map.set(8, true);
			map.set(14, true);
			assert_eq!(best_fit(map, 4), Some(9));
			assert_eq!(best_fit(map, 9), Some(15));
			assert_eq!(best_fit(map, 9), None);
		});
	}

	#[test]
	fn test_buddy_block_aligned() {
		with_map(32, |map| {
			map.set(1, true);
			// Block [0, 4) is dirty, so 3 pages land in [4, 8).
			assert_eq!(buddy_fit(map, 3), Some(4));
			assert!(!map.test(7));
			// [4, 8) is partly used now; the next block is [8, 12).
			assert_eq!(buddy_fit(map, 4), Some(8));
			assert_eq!(buddy_fit(map, 5), Some(16));
			assert_eq!(buddy_fit(map, 16), None);
		});
	}

	#[test]
	fn test_zero_pages_never_claim() {
		with_map(8, |map| {
			let mut cursor = 0;
			for strategy in AllocStrategy::ALL {
				assert_eq!(claim(strategy, map, &mut cursor, 0), None);
			}
			assert!(map.none(0, 8));
		});
	}

	#[test]
	fn test_oversized_requests_fail() {
		with_map(20, |map| {
			// A non-zero cursor, as after an earlier claim.
			let mut cursor = 1;
			map.set(0, true);
			for strategy in AllocStrategy::ALL {
				assert_eq!(claim(strategy, map, &mut cursor, 21), None);
				assert_eq!(claim(strategy, map, &mut cursor, usize::MAX), None);
			}
			// The helpers alone fail cleanly too.
			assert_eq!(next_fit(map, &mut cursor, usize::MAX), None);
			assert_eq!(buddy_fit(map, usize::MAX), None);
			assert_eq!(buddy_fit(map, (usize::MAX >> 1) + 2), None);
			assert_eq!(best_fit(map, usize::MAX), None);
			assert_eq!(map.count(0, 20, true), 1);
		});
	}
}
