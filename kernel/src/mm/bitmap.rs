//! Bit vector over caller-provided storage.
//!
//! Bit **1** = used, bit **0** = free. The page pools place their bitmap in
//! their own leading pages, so the vector never allocates; it only borrows
//! the words it is given.

use core::mem::size_of;

const WORD_BITS: usize = usize::BITS as usize;

pub struct Bitmap<'a> {
	words: &'a mut [usize],
	bits: usize,
}

impl<'a> Bitmap<'a> {
	/// Words needed to hold `bits` bits.
	pub const fn words_for(bits: usize) -> usize {
		bits.div_ceil(WORD_BITS)
	}

	/// Bytes of storage needed to hold `bits` bits.
	pub const fn bytes_for(bits: usize) -> usize {
		Self::words_for(bits) * size_of::<usize>()
	}

	/// Creates an all-clear bitmap of `bits` bits in `words`.
	///
	/// # Panics
	/// If `words` is too short.
	pub fn new(words: &'a mut [usize], bits: usize) -> Self {
		assert!(
			words.len() >= Self::words_for(bits),
			"bitmap of {} bits needs {} words, got {}",
			bits,
			Self::words_for(bits),
			words.len()
		);
		words.fill(0);
		Self { words, bits }
	}

	/// Creates an all-clear bitmap of `bits` bits at `buf`.
	///
	/// # Safety
	/// `buf` must be aligned for `usize`, valid for writes of
	/// `bytes_for(bits)` bytes and not accessed through any other path for
	/// `'a`.
	pub unsafe fn from_raw(buf: *mut usize, bits: usize) -> Self {
		let words = unsafe { core::slice::from_raw_parts_mut(buf, Self::words_for(bits)) };
		Self::new(words, bits)
	}

	pub fn len(&self) -> usize {
		self.bits
	}

	pub fn is_empty(&self) -> bool {
		self.bits == 0
	}

	#[inline]
	pub fn test(&self, idx: usize) -> bool {
		assert!(idx < self.bits, "bit {} out of range ({} bits)", idx, self.bits);
		self.words[idx / WORD_BITS] & (1 << (idx % WORD_BITS)) != 0
	}

	#[inline]
	pub fn set(&mut self, idx: usize, value: bool) {
		assert!(idx < self.bits, "bit {} out of range ({} bits)", idx, self.bits);
		let mask = 1 << (idx % WORD_BITS);
		if value {
			self.words[idx / WORD_BITS] |= mask;
		} else {
			self.words[idx / WORD_BITS] &= !mask;
		}
	}

	pub fn set_range(&mut self, start: usize, cnt: usize, value: bool) {
		for idx in start..start + cnt {
			self.set(idx, value);
		}
	}

	/// Number of bits in `[start, start + cnt)` equal to `value`.
	pub fn count(&self, start: usize, cnt: usize, value: bool) -> usize {
		(start..start + cnt).filter(|&idx| self.test(idx) == value).count()
	}

	/// Whether any bit in `[start, start + cnt)` equals `value`.
	pub fn contains(&self, start: usize, cnt: usize, value: bool) -> bool {
		(start..start + cnt).any(|idx| self.test(idx) == value)
	}

	/// Every bit in the range is set.
	pub fn all(&self, start: usize, cnt: usize) -> bool {
		!self.contains(start, cnt, false)
	}

	/// No bit in the range is set.
	pub fn none(&self, start: usize, cnt: usize) -> bool {
		!self.contains(start, cnt, true)
	}

	/// Lowest index `>= start` at which `cnt` consecutive bits equal
	/// `value`. A window that fails skips past its last mismatching bit.
	pub fn scan(&self, start: usize, cnt: usize, value: bool) -> Option<usize> {
		if cnt == 0 {
			return None;
		}
		let mut idx = start;
		loop {
			let end = idx.checked_add(cnt).filter(|&end| end <= self.bits)?;
			match (idx..end).rev().find(|&b| self.test(b) != value) {
				None => return Some(idx),
				Some(mismatch) => idx = mismatch + 1,
			}
		}
	}

	/// Length of the run of `value` bits starting at `start`.
	pub fn run_len(&self, start: usize, value: bool) -> usize {
		(start..self.bits)
			.take_while(|&idx| self.test(idx) == value)
			.count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_storage_size() {
		assert_eq!(Bitmap::words_for(0), 0);
		assert_eq!(Bitmap::words_for(1), 1);
		assert_eq!(Bitmap::words_for(WORD_BITS), 1);
		assert_eq!(Bitmap::words_for(WORD_BITS + 1), 2);
		assert_eq!(Bitmap::bytes_for(WORD_BITS + 1), 2 * size_of::<usize>());
	}

	#[test]
	fn test_set_and_count() {
		let mut words = [usize::MAX; 2];
		let mut map = Bitmap::new(&mut words, 100);
		assert!(map.none(0, 100));

		map.set_range(60, 10, true);
		assert!(map.all(60, 10));
		assert!(!map.all(59, 2));
		assert_eq!(map.count(0, 100, true), 10);
		assert!(map.test(64));

		map.set(64, false);
		assert_eq!(map.count(60, 10, true), 9);
	}

	#[test]
	fn test_scan_skips_blocked_windows() {
		let mut words = [0; 1];
		let mut map = Bitmap::new(&mut words, 20);
		map.set(3, true);
		map.set(9, true);

		assert_eq!(map.scan(0, 3, false), Some(0));
		assert_eq!(map.scan(0, 4, false), Some(4));
		assert_eq!(map.scan(0, 6, false), Some(10));
		assert_eq!(map.scan(0, 11, false), None);
		assert_eq!(map.scan(11, 9, false), Some(11));
		assert_eq!(map.scan(0, 1, true), Some(3));
		assert_eq!(map.scan(0, 0, false), None);
		assert_eq!(map.scan(5, usize::MAX, false), None);
		assert_eq!(map.scan(usize::MAX, 1, false), None);
	}

	#[test]
	fn test_run_len() {
		let mut words = [0; 1];
		let mut map = Bitmap::new(&mut words, 16);
		map.set_range(4, 3, true);
		assert_eq!(map.run_len(0, false), 4);
		assert_eq!(map.run_len(4, true), 3);
		assert_eq!(map.run_len(7, false), 9);
	}

	#[test]
	#[should_panic(expected = "out of range")]
	fn test_out_of_range_bit() {
		let mut words = [0; 1];
		let map = Bitmap::new(&mut words, 8);
		map.test(8);
	}
}
