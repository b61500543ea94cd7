//! Thread and thread-group walker.
//!
//! The walker reads the hierarchy through `ThreadSource`, a capability that
//! only ever returns entries valid at the time of the call. Groups are
//! visited by identity, so renamed or identically named groups and even
//! cyclic parent links cannot make traversal loop.

pub mod hierarchy;
pub mod runtime;
pub mod stack;

use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::Arc;

pub use hierarchy::{
    attach_current, current_group, current_record, detach_current, enter_frame, enter_state,
    set_current_state, FrameGuard, StackFrame, StateGuard, ThreadGroup, ThreadRecord,
    ThreadState, TrackedBuilder,
};
pub use runtime::{build_tracked_runtime, run_tracked};
pub use stack::capture_current_stack;

/// Location placeholder for threads without a caller frame.
pub const UNKNOWN_LOCATION: &str = "?,?,?,?";

/// Immutable capture of one thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSnapshot {
    pub group: String,
    pub id: u64,
    pub name: String,
    pub priority: i32,
    pub state: ThreadState,
    pub alive: bool,
    pub daemon: bool,
    pub interrupted: bool,
    /// Innermost frame first; `None` when the stack could not be read.
    pub stack: Option<Vec<StackFrame>>,
}

/// One rendered row of the group tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadGroupNode {
    pub depth: usize,
    pub name: String,
    pub parent_name: String,
    pub thread_count: usize,
    pub group_count: usize,
}

/// Read access to a thread hierarchy.
pub trait ThreadSource {
    type Group: Clone;

    fn current_group(&self) -> Self::Group;
    fn parent(&self, group: &Self::Group) -> Option<Self::Group>;
    /// Identity of a group, stable for its lifetime.
    fn group_id(&self, group: &Self::Group) -> u64;
    fn group_name(&self, group: &Self::Group) -> String;
    /// Direct child slots; `None` entries are groups removed mid-enumeration.
    fn child_groups(&self, group: &Self::Group) -> Vec<Option<Self::Group>>;
    fn thread_count(&self, group: &Self::Group) -> usize;
    /// Snapshots of the direct threads captured right now.
    fn threads(&self, group: &Self::Group) -> Vec<ThreadSnapshot>;
}

/// `ThreadSource` over the process-local `ThreadGroup` tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalThreads;

impl ThreadSource for LocalThreads {
    type Group = Arc<ThreadGroup>;

    fn current_group(&self) -> Self::Group {
        current_group()
    }

    fn parent(&self, group: &Self::Group) -> Option<Self::Group> {
        group.parent()
    }

    fn group_id(&self, group: &Self::Group) -> u64 {
        group.id()
    }

    fn group_name(&self, group: &Self::Group) -> String {
        group.name().to_string()
    }

    fn child_groups(&self, group: &Self::Group) -> Vec<Option<Self::Group>> {
        group.child_slots()
    }

    fn thread_count(&self, group: &Self::Group) -> usize {
        group.active_count()
    }

    fn threads(&self, group: &Self::Group) -> Vec<ThreadSnapshot> {
        group
            .live_threads()
            .iter()
            .map(|t| snapshot(t))
            .collect()
    }
}

/// Captures a tracked thread. The record may terminate while this runs;
/// the snapshot then reports it as not alive with no stack. The calling
/// thread reports its unwound stack instead of its published frames.
pub fn snapshot(record: &ThreadRecord) -> ThreadSnapshot {
    let is_current = current_record().is_some_and(|c| std::ptr::eq(Arc::as_ptr(&c), record));
    let stack = match record.stack() {
        Some(published) if is_current => {
            let unwound = capture_current_stack();
            Some(if unwound.is_empty() { published } else { unwound })
        }
        other => other,
    };
    ThreadSnapshot {
        group: record.group().name().to_string(),
        id: record.id(),
        name: record.name().to_string(),
        priority: record.priority(),
        state: record.state(),
        alive: record.is_alive(),
        daemon: record.is_daemon(),
        interrupted: record.is_interrupted(),
        stack,
    }
}

/// Recursive walker over a `ThreadSource`.
pub struct ThreadWalker<S> {
    source: S,
}

impl<S: ThreadSource> ThreadWalker<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Follows parent links from the current group until none remains.
    pub fn find_root_group(&self) -> S::Group {
        let mut group = self.source.current_group();
        let mut seen = HashSet::new();
        seen.insert(self.source.group_id(&group));
        while let Some(parent) = self.source.parent(&group) {
            if !seen.insert(self.source.group_id(&parent)) {
                break;
            }
            group = parent;
        }
        group
    }

    /// Preorder listing of `root` and all groups below it.
    pub fn list_groups(&self, root: &S::Group) -> Vec<ThreadGroupNode> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.visit_group(root, 0, &mut seen, &mut out);
        out
    }

    fn visit_group(
        &self,
        group: &S::Group,
        depth: usize,
        seen: &mut HashSet<u64>,
        out: &mut Vec<ThreadGroupNode>,
    ) {
        if !seen.insert(self.source.group_id(group)) {
            return;
        }
        let children: Vec<S::Group> = self.source.child_groups(group).into_iter().flatten().collect();
        out.push(ThreadGroupNode {
            depth,
            name: self.source.group_name(group),
            parent_name: self
                .source
                .parent(group)
                .map(|p| self.source.group_name(&p))
                .unwrap_or_default(),
            thread_count: self.source.thread_count(group),
            group_count: children.len(),
        });
        for child in &children {
            self.visit_group(child, depth + 1, seen, out);
        }
    }

    /// Every thread reachable from the root group, in group preorder.
    pub fn list_threads(&self) -> Vec<ThreadSnapshot> {
        let root = self.find_root_group();
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(group) = stack.pop() {
            if !seen.insert(self.source.group_id(&group)) {
                continue;
            }
            out.extend(self.source.threads(&group));
            let children: Vec<S::Group> =
                self.source.child_groups(&group).into_iter().flatten().collect();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// `indent name,parent,threads,groups` per group.
    pub fn render_group_tree(&self, out: &mut dyn Write) -> io::Result<()> {
        let root = self.find_root_group();
        for node in self.list_groups(&root) {
            writeln!(
                out,
                "{}{},{},{},{}",
                "  ".repeat(node.depth),
                node.name,
                node.parent_name,
                node.thread_count,
                node.group_count
            )?;
        }
        Ok(())
    }

    /// One line per thread with its current and calling frame.
    pub fn render_thread_details(&self, out: &mut dyn Write) -> io::Result<()> {
        for t in self.list_threads() {
            writeln!(
                out,
                "{},{},{},{},{},{},{},{},{}",
                t.group,
                t.id,
                t.name,
                t.priority,
                t.state,
                if t.alive { "" } else { "notalive" },
                if t.daemon { "daemon" } else { "" },
                if t.interrupted { "interrupted" } else { "" },
                two_frame_location(&t)
            )?;
        }
        Ok(())
    }

    /// `group id frame frame ...` per thread.
    pub fn render_thread_stacks(&self, out: &mut dyn Write) -> io::Result<()> {
        for t in self.list_threads() {
            writeln!(out, "{} {} {}", t.group, t.id, full_stack(&t))?;
        }
        Ok(())
    }
}

/// `module.fn(),file:line,module.fn(),file:line`, or the placeholder when
/// fewer than two frames are known.
pub fn two_frame_location(t: &ThreadSnapshot) -> String {
    match t.stack.as_deref() {
        Some([top, caller, ..]) => format!(
            "{}.{}(),{}:{},{}.{}(),{}:{}",
            top.module, top.function, top.file, top.line,
            caller.module, caller.function, caller.file, caller.line
        ),
        _ => UNKNOWN_LOCATION.to_string(),
    }
}

/// Every frame as `module.fn();file:line ` or `-` if the stack is unknown.
pub fn full_stack(t: &ThreadSnapshot) -> String {
    match &t.stack {
        Some(frames) => frames
            .iter()
            .map(|f| format!("{}.{}();{}:{} ", f.module, f.function, f.file, f.line))
            .collect(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Hand-built hierarchy for walker tests. Groups are indexes; parent
    /// links may form cycles and child lists may contain removed slots.
    #[derive(Default)]
    struct FakeSource {
        current: usize,
        names: Vec<String>,
        parents: HashMap<usize, usize>,
        children: HashMap<usize, Vec<Option<usize>>>,
        threads: HashMap<usize, Vec<ThreadSnapshot>>,
    }

    impl FakeSource {
        fn group(&mut self, name: &str, parent: Option<usize>) -> usize {
            let id = self.names.len();
            self.names.push(name.to_string());
            if let Some(p) = parent {
                self.parents.insert(id, p);
                self.children.entry(p).or_default().push(Some(id));
            }
            id
        }

        fn thread(&mut self, group: usize, id: u64, name: &str, stack: Option<Vec<StackFrame>>) {
            let snap = ThreadSnapshot {
                group: self.names[group].clone(),
                id,
                name: name.to_string(),
                priority: 5,
                state: ThreadState::Runnable,
                alive: true,
                daemon: false,
                interrupted: false,
                stack,
            };
            self.threads.entry(group).or_default().push(snap);
        }
    }

    impl ThreadSource for &FakeSource {
        type Group = usize;

        fn current_group(&self) -> usize {
            self.current
        }
        fn parent(&self, g: &usize) -> Option<usize> {
            self.parents.get(g).copied()
        }
        fn group_id(&self, g: &usize) -> u64 {
            *g as u64
        }
        fn group_name(&self, g: &usize) -> String {
            self.names[*g].clone()
        }
        fn child_groups(&self, g: &usize) -> Vec<Option<usize>> {
            self.children.get(g).cloned().unwrap_or_default()
        }
        fn thread_count(&self, g: &usize) -> usize {
            self.threads.get(g).map_or(0, Vec::len)
        }
        fn threads(&self, g: &usize) -> Vec<ThreadSnapshot> {
            self.threads.get(g).cloned().unwrap_or_default()
        }
    }

    fn render(f: impl Fn(&mut dyn Write) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sample() -> FakeSource {
        let mut src = FakeSource::default();
        let system = src.group("system", None);
        let main = src.group("main", Some(system));
        let pool = src.group("pool", Some(main));
        src.children.entry(main).or_default().push(None);
        src.current = pool;
        src.thread(system, 1, "reaper", None);
        src.thread(
            pool,
            7,
            "worker",
            Some(vec![StackFrame::new("m", "run", "w.rs", 10), StackFrame::new("m", "loop", "w.rs", 4)]),
        );
        src.thread(main, 2, "main", Some(vec![StackFrame::new("m", "main", "main.rs", 1)]));
        src
    }

    #[test]
    fn test_root_is_found_from_current_group() {
        let src = sample();
        let walker = ThreadWalker::new(&src);
        assert_eq!(walker.find_root_group(), 0);
    }

    #[test]
    fn test_group_tree_skips_removed_slots() {
        let src = sample();
        let walker = ThreadWalker::new(&src);
        let text = render(|out| walker.render_group_tree(out));
        assert_eq!(text, "system,,1,1\n  main,system,1,1\n    pool,main,1,0\n");
    }

    #[test]
    fn test_traversal_terminates_with_cyclic_links_and_duplicate_names() {
        let mut src = FakeSource::default();
        let a = src.group("same", None);
        let b = src.group("same", Some(a));
        src.parents.insert(a, b);
        src.children.entry(b).or_default().push(Some(a));
        src.current = b;

        let walker = ThreadWalker::new(&src);
        let root = walker.find_root_group();
        let groups = walker.list_groups(&root);
        assert_eq!(groups.len(), 2);
        assert!(walker.list_threads().is_empty());
    }

    #[test]
    fn test_thread_details_and_placeholder() {
        let src = sample();
        let walker = ThreadWalker::new(&src);
        let text = render(|out| walker.render_thread_details(out));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "system,1,reaper,5,RUNNABLE,,,,?,?,?,?");
        assert_eq!(lines[1], "main,2,main,5,RUNNABLE,,,,?,?,?,?");
        assert_eq!(lines[2], "pool,7,worker,5,RUNNABLE,,,,m.run(),w.rs:10,m.loop(),w.rs:4");
    }

    #[test]
    fn test_stack_dump() {
        let src = sample();
        let walker = ThreadWalker::new(&src);
        let text = render(|out| walker.render_thread_stacks(out));
        assert_eq!(
            text,
            "system 1 -\nmain 2 m.main();main.rs:1 \npool 7 m.run();w.rs:10 m.loop();w.rs:4 \n"
        );
    }

    #[test]
    fn test_local_threads_include_tracked_worker() {
        let group = ThreadGroup::new(&ThreadGroup::main(), "walker-test");
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let handle = group
            .spawn("walker-test-1", move || {
                let _f = enter_frame(crate::frame!("only"));
                ready_tx.send(()).unwrap();
                done_rx.recv().unwrap();
            })
            .unwrap();
        ready_rx.recv().unwrap();

        let walker = ThreadWalker::new(LocalThreads);
        let found: Vec<ThreadSnapshot> = walker
            .list_threads()
            .into_iter()
            .filter(|t| t.name == "walker-test-1")
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].group, "walker-test");
        assert_eq!(two_frame_location(&found[0]), UNKNOWN_LOCATION);

        let tree = render(|out| walker.render_group_tree(out));
        assert!(tree.starts_with("system,,"));
        assert!(tree.contains("\n    walker-test,main,1,0\n"));

        done_tx.send(()).unwrap();
        handle.join().unwrap();
    }
}
