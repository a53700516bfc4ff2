//! Kernel-wide constants and the run-time configuration handed to the
//! scheduler and the page allocator at construction.
//!
//! There are no ambient mode switches: a `KernelConfig` is built once by the
//! boot glue (usually from the command line) and passed in explicitly.

use core::fmt;
use core::str::FromStr;

use crate::error::KernelError;

// ── Memory ──────────────────────────────────────────────────────

/// Size of a single physical page.
pub const PAGE_SIZE: usize = 4096;

/// Byte written over freed pages in debug builds.
pub const FREED_PAGE_FILL: u8 = 0xcc;

// ── Priorities ──────────────────────────────────────────────────

/// Scheduling priority. Higher runs first.
pub type Priority = u8;

/// Lowest priority (the idle task).
pub const PRI_MIN: Priority = 0;
/// Priority given to tasks that do not ask for anything else.
pub const PRI_DEFAULT: Priority = 31;
/// Highest priority.
pub const PRI_MAX: Priority = 63;

/// Ticks a task may wait in the ready queue before it is aged (plain mode)
/// or promoted one level (MLFQS).
pub const AGING_THRESHOLD: u32 = 20;

/// Round-robin time slice, in ticks, when neither aging nor MLFQS applies.
pub const TIME_SLICE: u32 = 4;

// ── MLFQS ───────────────────────────────────────────────────────

/// Number of feedback queue levels.
pub const MLFQS_LEVELS: usize = 3;

/// Fixed priority of each level. Level 0 is the most urgent.
pub const MLFQS_TIER_PRIORITY: [Priority; MLFQS_LEVELS] = [63, 62, 61];

/// Quantum length of each level, in ticks.
pub const MLFQS_QUANTUM: [u32; MLFQS_LEVELS] = [2, 4, 8];

// ── Tasks ───────────────────────────────────────────────────────

/// Written at the base of every task page; a mismatch means the stack grew
/// into the page header.
pub const STACK_MAGIC: u32 = 0xcd6a_bf4b;

/// Longest task name kept; longer names are truncated.
pub const TASK_NAME_MAX: usize = 16;

// ── Placement strategy ──────────────────────────────────────────

/// How a pool picks a run of free pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocStrategy {
	/// Lowest-indexed sufficient run.
	#[default]
	FirstFit,
	/// First sufficient run at or after the pool's cursor, wrapping once.
	NextFit,
	/// Smallest sufficient run; an exact match ends the scan.
	BestFit,
	/// First free power-of-two block at a block-aligned index.
	Buddy,
}

impl AllocStrategy {
	pub const ALL: [AllocStrategy; 4] = [
		AllocStrategy::FirstFit,
		AllocStrategy::NextFit,
		AllocStrategy::BestFit,
		AllocStrategy::Buddy,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			AllocStrategy::FirstFit => "first-fit",
			AllocStrategy::NextFit => "next-fit",
			AllocStrategy::BestFit => "best-fit",
			AllocStrategy::Buddy => "buddy",
		}
	}

	pub(crate) fn to_raw(self) -> u8 {
		self as u8
	}

	pub(crate) fn from_raw(raw: u8) -> Self {
		match raw {
			1 => AllocStrategy::NextFit,
			2 => AllocStrategy::BestFit,
			3 => AllocStrategy::Buddy,
			_ => AllocStrategy::FirstFit,
		}
	}
}

impl fmt::Display for AllocStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AllocStrategy {
	type Err = KernelError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"first-fit" | "firstfit" | "first" => Ok(AllocStrategy::FirstFit),
			"next-fit" | "nextfit" | "next" => Ok(AllocStrategy::NextFit),
			"best-fit" | "bestfit" | "best" => Ok(AllocStrategy::BestFit),
			"buddy" => Ok(AllocStrategy::Buddy),
			_ => Err(KernelError::UnknownStrategy),
		}
	}
}

// ── Scheduling policy ───────────────────────────────────────────

/// How the ready queue is ordered and what happens on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
	/// Strict priority order. With `aging`, tasks waiting in the ready
	/// queue gain priority over time; without it, equal priorities share
	/// the CPU in `TIME_SLICE` rounds.
	Priority { aging: bool },
	/// Three-level feedback queue with demotion and promotion.
	Mlfqs,
}

impl SchedPolicy {
	pub fn is_mlfqs(&self) -> bool {
		matches!(self, SchedPolicy::Mlfqs)
	}
}

impl Default for SchedPolicy {
	fn default() -> Self {
		SchedPolicy::Priority { aging: false }
	}
}

impl fmt::Display for SchedPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SchedPolicy::Priority { aging: false } => f.write_str("priority"),
			SchedPolicy::Priority { aging: true } => f.write_str("aging"),
			SchedPolicy::Mlfqs => f.write_str("mlfqs"),
		}
	}
}

impl FromStr for SchedPolicy {
	type Err = KernelError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"priority" | "rr" => Ok(SchedPolicy::Priority { aging: false }),
			"aging" => Ok(SchedPolicy::Priority { aging: true }),
			"mlfqs" => Ok(SchedPolicy::Mlfqs),
			_ => Err(KernelError::UnknownPolicy),
		}
	}
}

// ── KernelConfig ────────────────────────────────────────────────

/// Everything the core needs to know at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
	pub policy: SchedPolicy,
	pub strategy: AllocStrategy,
	/// Upper bound on the user pool, in pages.
	pub user_page_limit: usize,
}

impl Default for KernelConfig {
	fn default() -> Self {
		Self {
			policy: SchedPolicy::default(),
			strategy: AllocStrategy::default(),
			user_page_limit: usize::MAX,
		}
	}
}

impl KernelConfig {
	pub fn with_policy(mut self, policy: SchedPolicy) -> Self {
		self.policy = policy;
		self
	}

	pub fn with_strategy(mut self, strategy: AllocStrategy) -> Self {
		self.strategy = strategy;
		self
	}

	pub fn with_user_page_limit(mut self, pages: usize) -> Self {
		self.user_page_limit = pages;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_strategy_names() {
		for strategy in AllocStrategy::ALL {
			assert_eq!(strategy.as_str().parse::<AllocStrategy>(), Ok(strategy));
			assert_eq!(AllocStrategy::from_raw(strategy.to_raw()), strategy);
		}
		assert_eq!("bestfit".parse::<AllocStrategy>(), Ok(AllocStrategy::BestFit));
		assert_eq!("worst-fit".parse::<AllocStrategy>(), Err(KernelError::UnknownStrategy));
	}

	#[test]
	fn test_policy_names() {
		for policy in [
			SchedPolicy::Priority { aging: false },
			SchedPolicy::Priority { aging: true },
			SchedPolicy::Mlfqs,
		] {
			assert_eq!(policy.to_string().parse::<SchedPolicy>(), Ok(policy));
		}
		assert_eq!("cfs".parse::<SchedPolicy>(), Err(KernelError::UnknownPolicy));
	}

	#[test]
	fn test_mlfqs_tiers_descend() {
		assert_eq!(MLFQS_TIER_PRIORITY[0], PRI_MAX);
		assert!(MLFQS_TIER_PRIORITY.windows(2).all(|w| w[0] > w[1]));
		assert!(MLFQS_QUANTUM.windows(2).all(|w| w[0] < w[1]));
	}

	#[test]
	fn test_config_builder() {
		let config = KernelConfig::default()
			.with_policy(SchedPolicy::Mlfqs)
			.with_strategy(AllocStrategy::Buddy)
			.with_user_page_limit(64);
		assert!(config.policy.is_mlfqs());
		assert_eq!(config.strategy, AllocStrategy::Buddy);
		assert_eq!(config.user_page_limit, 64);
	}
}
