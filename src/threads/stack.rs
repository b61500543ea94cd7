//! Symbolized stack of the calling thread.
//!
//! Other threads can only be seen through the frames they publish, but the
//! thread rendering a report can walk its own stack.

use backtrace::Backtrace;

use super::StackFrame;

/// Symbol prefixes of the standard library, the unwinder and compiler
/// shims. Frames under them are dropped.
const RUNTIME_PREFIXES: &[&str] = &["std::", "core::", "alloc::", "backtrace::", "__", "_start"];

/// Stack of the calling thread, innermost first, beginning at the caller of
/// this function.
pub fn capture_current_stack() -> Vec<StackFrame> {
    let trace = Backtrace::new();
    let symbols = trace
        .frames()
        .iter()
        .flat_map(|frame| frame.symbols())
        .filter_map(|symbol| {
            let name = format!("{:#}", symbol.name()?);
            let file = symbol
                .filename()
                .and_then(|path| path.file_name())
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "?".to_string());
            Some((name, file, symbol.lineno().unwrap_or(0)))
        });

    let mut frames = Vec::new();
    let mut past_self = false;
    for (name, file, line) in symbols {
        if !past_self {
            past_self = name.ends_with("capture_current_stack");
            continue;
        }
        if is_runtime_symbol(&name) {
            continue;
        }
        let (module, function) = split_symbol(&name);
        frames.push(StackFrame::new(&sanitize(module), &sanitize(function), &file, line));
    }
    frames
}

fn is_runtime_symbol(name: &str) -> bool {
    let path = name.trim_start_matches('<');
    RUNTIME_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// `a::b::c` becomes `("a::b", "c")`. Separators inside generic arguments
/// are ignored.
fn split_symbol(name: &str) -> (&str, &str) {
    let mut depth = 0usize;
    let mut split = None;
    let bytes = name.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => split = Some(i),
            _ => {}
        }
    }
    match split {
        Some(i) => (&name[..i], &name[i + 2..]),
        None => ("", name),
    }
}

/// Report lines are comma separated.
fn sanitize(part: &str) -> String {
    part.replace(", ", ";").replace(',', ";")
}
