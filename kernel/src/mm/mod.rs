// =============================================================================
// kthreads — Physical Page Allocation
// =============================================================================
//
// Two independent pools (kernel, user), each a contiguous run of pages with
// a bit-vector free map stored in its own leading pages.
//
//   bitmap.rs    — the bit vector (1 = used, 0 = free)
//   placement.rs — first-fit, next-fit, best-fit, block-aligned buddy
//   pool.rs      — one pool: free map, next-fit cursor, guard
//   palloc.rs    — the allocator: pool selection, flags, free checks
//
// Every search-and-claim and every release runs under the owning pool's
// IrqMutex. Zeroing and the out-of-pages assertion happen after the guard is
// dropped.
// =============================================================================

pub mod bitmap;
pub mod palloc;
pub mod placement;
pub mod pool;

pub use palloc::{AllocFlags, PageAllocator};
pub use pool::Pool;
