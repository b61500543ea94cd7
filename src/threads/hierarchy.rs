//! Process-local thread group hierarchy.
//!
//! Rust threads carry no group membership and no inspectable stack, so
//! threads that want to be visible join a `ThreadGroup` (by being spawned
//! through one or by attaching themselves) and publish frames and state
//! cooperatively through guards. Groups hold their children and threads
//! weakly: a dropped group or an exited thread leaves a dead slot that
//! enumeration skips.

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;

use once_cell::sync::Lazy;

/// Default priority, matching the conventional "normal" level.
pub const NORM_PRIORITY: i32 = 5;

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

static SYSTEM_GROUP: Lazy<Arc<ThreadGroup>> = Lazy::new(|| ThreadGroup::root("system"));
static MAIN_GROUP: Lazy<Arc<ThreadGroup>> = Lazy::new(|| ThreadGroup::new(&SYSTEM_GROUP, "main"));

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadRecord>>> = const { RefCell::new(None) };
}

/// Lifecycle state of a tracked thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    New = 0,
    Runnable = 1,
    Blocked = 2,
    Waiting = 3,
    TimedWaiting = 4,
    Terminated = 5,
}

impl ThreadState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ThreadState::New,
            1 => ThreadState::Runnable,
            2 => ThreadState::Blocked,
            3 => ThreadState::Waiting,
            4 => ThreadState::TimedWaiting,
            _ => ThreadState::Terminated,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ThreadState::New => "NEW",
            ThreadState::Runnable => "RUNNABLE",
            ThreadState::Blocked => "BLOCKED",
            ThreadState::Waiting => "WAITING",
            ThreadState::TimedWaiting => "TIMED_WAITING",
            ThreadState::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One published stack frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub module: String,
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl StackFrame {
    pub fn new(module: &str, function: &str, file: &str, line: u32) -> Self {
        Self {
            module: module.to_string(),
            function: function.to_string(),
            file: file.to_string(),
            line,
        }
    }
}

/// Builds a `StackFrame` for the calling location.
#[macro_export]
macro_rules! frame {
    ($function:expr) => {
        $crate::threads::StackFrame::new(module_path!(), $function, file!(), line!())
    };
}

/// A named node in the thread group tree.
pub struct ThreadGroup {
    id: u64,
    name: String,
    parent: Option<Arc<ThreadGroup>>,
    children: Mutex<Vec<Weak<ThreadGroup>>>,
    threads: Mutex<Vec<Weak<ThreadRecord>>>,
}

impl fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadGroup")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl ThreadGroup {
    fn root(name: &str) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            parent: None,
            children: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Creates a child group under `parent`.
    pub fn new(parent: &Arc<ThreadGroup>, name: &str) -> Arc<Self> {
        let group = Arc::new(Self {
            id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            parent: Some(Arc::clone(parent)),
            children: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        });
        let mut children = parent.children.lock().unwrap_or_else(PoisonError::into_inner);
        children.retain(|w| w.strong_count() > 0);
        children.push(Arc::downgrade(&group));
        drop(children);
        group
    }

    /// The top of the hierarchy.
    pub fn system() -> Arc<ThreadGroup> {
        Arc::clone(&SYSTEM_GROUP)
    }

    /// Group of threads that never joined one explicitly.
    pub fn main() -> Arc<ThreadGroup> {
        Arc::clone(&MAIN_GROUP)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<Arc<ThreadGroup>> {
        self.parent.clone()
    }

    /// Direct child slots; `None` marks a group dropped since registration.
    pub fn child_slots(&self) -> Vec<Option<Arc<ThreadGroup>>> {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Weak::upgrade)
            .collect()
    }

    /// Direct threads that have started and not yet terminated.
    pub fn live_threads(&self) -> Vec<Arc<ThreadRecord>> {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|t| t.is_alive())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.live_threads().len()
    }

    pub fn active_group_count(&self) -> usize {
        self.child_slots().iter().flatten().count()
    }

    /// Starts configuring a thread that will run inside this group.
    pub fn builder(self: &Arc<Self>, name: &str) -> TrackedBuilder {
        TrackedBuilder {
            group: Arc::clone(self),
            name: name.to_string(),
            priority: NORM_PRIORITY,
            daemon: false,
        }
    }

    /// Spawns a normal-priority thread in this group.
    pub fn spawn<F, T>(self: &Arc<Self>, name: &str, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.builder(name).spawn(f)
    }

    fn enroll(self: &Arc<Self>, name: &str, priority: i32, daemon: bool) -> Arc<ThreadRecord> {
        let record = Arc::new(ThreadRecord {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            priority,
            daemon,
            group: Arc::clone(self),
            state: AtomicU8::new(ThreadState::New as u8),
            interrupted: AtomicBool::new(false),
            frames: Mutex::new(Vec::new()),
        });
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.retain(|w| w.strong_count() > 0);
        threads.push(Arc::downgrade(&record));
        record
    }
}

/// Thread configuration before spawning.
pub struct TrackedBuilder {
    group: Arc<ThreadGroup>,
    name: String,
    priority: i32,
    daemon: bool,
}

impl TrackedBuilder {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn spawn<F, T>(self, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let record = self.group.enroll(&self.name, self.priority, self.daemon);
        std::thread::Builder::new()
            .name(self.name)
            .spawn(move || {
                let _attached = Attachment::install(record);
                f()
            })
    }
}

/// Live bookkeeping for one tracked thread.
pub struct ThreadRecord {
    id: u64,
    name: String,
    priority: i32,
    daemon: bool,
    group: Arc<ThreadGroup>,
    state: AtomicU8,
    interrupted: AtomicBool,
    frames: Mutex<Vec<StackFrame>>,
}

impl ThreadRecord {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &Arc<ThreadGroup> {
        &self.group
    }

    pub fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self.state(), ThreadState::New | ThreadState::Terminated)
    }

    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Published frames, innermost first. `None` once the thread ended.
    pub fn stack(&self) -> Option<Vec<StackFrame>> {
        if self.state() == ThreadState::Terminated {
            return None;
        }
        let frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        Some(frames.iter().rev().cloned().collect())
    }

    fn set_state(&self, state: ThreadState) -> ThreadState {
        ThreadState::from_u8(self.state.swap(state as u8, Ordering::AcqRel))
    }
}

/// Keeps the current OS thread enrolled until dropped.
struct Attachment;

impl Attachment {
    fn install(record: Arc<ThreadRecord>) -> Self {
        record.set_state(ThreadState::Runnable);
        CURRENT.with(|c| *c.borrow_mut() = Some(record));
        Attachment
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        detach_current();
    }
}

/// Enrolls the calling thread in `group`. Intended for runtime hooks such as
/// tokio's `on_thread_start`; pair with `detach_current`.
pub fn attach_current(group: &Arc<ThreadGroup>, daemon: bool) {
    let name = std::thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("thread-{:?}", std::thread::current().id()));
    let record = group.enroll(&name, NORM_PRIORITY, daemon);
    record.set_state(ThreadState::Runnable);
    CURRENT.with(|c| *c.borrow_mut() = Some(record));
}

/// Marks the calling thread terminated and releases its record.
pub fn detach_current() {
    let record = CURRENT.with(|c| c.borrow_mut().take());
    if let Some(record) = record {
        record.set_state(ThreadState::Terminated);
        record
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Record of the calling thread, if it is tracked.
pub fn current_record() -> Option<Arc<ThreadRecord>> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Group of the calling thread; untracked threads belong to `main`.
pub fn current_group() -> Arc<ThreadGroup> {
    current_record()
        .map(|r| Arc::clone(r.group()))
        .unwrap_or_else(ThreadGroup::main)
}

/// Publishes `state` for the calling thread with no restore. Used by
/// runtime park hooks, which have no scope to hang a guard on.
pub fn set_current_state(state: ThreadState) {
    if let Some(record) = current_record() {
        record.set_state(state);
    }
}

/// Pops its frame from the current thread's stack when dropped.
#[must_use = "the frame is popped when the guard is dropped"]
pub struct FrameGuard {
    record: Option<Arc<ThreadRecord>>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Some(record) = &self.record {
            record
                .frames
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop();
        }
    }
}

/// Pushes `frame` onto the calling thread's published stack. A no-op on
/// untracked threads.
pub fn enter_frame(frame: StackFrame) -> FrameGuard {
    let record = current_record();
    if let Some(r) = &record {
        r.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);
    }
    FrameGuard { record }
}

/// Restores the previous state of the current thread when dropped.
#[must_use = "the previous state is restored when the guard is dropped"]
pub struct StateGuard {
    record: Option<Arc<ThreadRecord>>,
    previous: ThreadState,
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        if let Some(record) = &self.record {
            record.set_state(self.previous);
        }
    }
}

/// Publishes `state` for the calling thread until the guard drops.
pub fn enter_state(state: ThreadState) -> StateGuard {
    let record = current_record();
    let previous = record
        .as_ref()
        .map(|r| r.set_state(state))
        .unwrap_or(ThreadState::Runnable);
    StateGuard { record, previous }
}
