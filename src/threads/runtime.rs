//! Tokio runtime whose threads are tracked in a `ThreadGroup`.
//!
//! Worker threads publish WAITING while parked and RUNNABLE while polling.
//! Blocking threads publish RUNNABLE while running a task through
//! `run_tracked` and TIMED_WAITING while idle in the pool.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use super::hierarchy::{attach_current, detach_current, set_current_state, ThreadGroup, ThreadState};

/// Multi-threaded runtime whose worker and blocking threads join `group`
/// as daemon threads named `<prefix>-N`.
pub fn build_tracked_runtime(
    group: &Arc<ThreadGroup>,
    prefix: &str,
    max_blocking: usize,
) -> io::Result<Runtime> {
    let start_group = Arc::clone(group);
    let prefix = prefix.to_string();
    let next = Arc::new(AtomicUsize::new(1));
    Builder::new_multi_thread()
        .enable_all()
        .thread_name_fn(move || format!("{}-{}", prefix, next.fetch_add(1, Ordering::Relaxed)))
        .max_blocking_threads(max_blocking)
        .on_thread_start(move || attach_current(&start_group, true))
        .on_thread_stop(detach_current)
        .on_thread_park(|| set_current_state(ThreadState::Waiting))
        .on_thread_unpark(|| set_current_state(ThreadState::Runnable))
        .build()
}

/// Runs `f` on the current blocking thread, publishing RUNNABLE for its
/// duration and TIMED_WAITING afterwards while the pool keeps the thread.
pub fn run_tracked<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    set_current_state(ThreadState::Runnable);
    let result = f();
    set_current_state(ThreadState::TimedWaiting);
    result
}
