//! Recoverable kernel errors.
//!
//! Broken invariants are not errors: they panic at the point of detection.
//! Only conditions a caller can reasonably handle end up here.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
	/// No free page left in the kernel pool for a new task.
	OutOfPages,
	/// Placement strategy name not recognised.
	UnknownStrategy,
	/// Scheduling policy name not recognised.
	UnknownPolicy,
}

impl KernelError {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::OutOfPages => "out of pages",
			Self::UnknownStrategy => "unknown placement strategy",
			Self::UnknownPolicy => "unknown scheduling policy",
		}
	}
}

impl fmt::Display for KernelError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

pub type KernelResult<T> = Result<T, KernelError>;
