// =============================================================================
// kthreads — Kernel Utilities
// =============================================================================
//
//   logger.rs — `log` backend writing colored records to a kernel sink
// =============================================================================

pub mod logger;
