//! Kernel tasks and the scheduler that multiplexes them onto the CPU.
//!
//!   tcb.rs       — task control block, ids, states
//!   table.rs     — task arena; queues hold `TaskRef` handles into it
//!   queue.rs     — scheduling key and the stable ordered queue
//!   sleep.rs     — tasks waiting for a timer tick
//!   scheduler.rs — policy, switching, timer tick, introspection

mod queue;
mod scheduler;
mod sleep;
mod table;
mod tcb;

pub use queue::{OrderedQueue, SchedKey, TaskQueue};
pub use scheduler::{Scheduler, TickStats};
pub use table::TaskRef;
pub use tcb::{TaskInfo, TaskKind, TaskState, Tid};
