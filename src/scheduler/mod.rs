//! Task scheduling for the resource runtime.
//!
//! Provides task prioritization and the generic task/agent pool that the
//! loader drives from its tick.

mod priority;
mod task_pool;

pub use priority::{PrioritizedItem, Priority};
pub use task_pool::{RunTask, StartTaskStatus, Task, TaskAgent, TaskInfo, TaskPool, TaskStatus};
