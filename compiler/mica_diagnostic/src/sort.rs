//! Stable diagnostic ordering across incremental passes.

use rustc_hash::FxHashMap;

use crate::Diagnostic;

/// Sort diagnostics so an incremental pass presents them in the same
/// order a cold pass would.
///
/// Files keep the order they were first seen in the previous pass; files
/// new this pass are appended in the order they became known. Within a
/// file, diagnostics sort by line; a multi-line block (header plus
/// continuation lines) moves as one unit keyed by its header. Two
/// messages sharing `(path, line)` keep their relative order from the new
/// pass. Diagnostics without a file sort after all file-scoped ones.
pub fn sort_messages_preserving_file_order(
    mut messages: Vec<Diagnostic>,
    previous_file_order: &[String],
) -> Vec<Diagnostic> {
    let mut rank: FxHashMap<&str, usize> = FxHashMap::default();
    for (index, path) in previous_file_order.iter().enumerate() {
        rank.insert(path.as_str(), index);
    }
    // New files follow all previously known files, in discovery order.
    let mut next_rank = previous_file_order.len();
    let mut new_ranks: FxHashMap<String, usize> = FxHashMap::default();
    for message in &messages {
        if let Some(path) = message.path.as_deref() {
            if !rank.contains_key(path) && !new_ranks.contains_key(path) {
                new_ranks.insert(path.to_owned(), next_rank);
                next_rank += 1;
            }
        }
    }

    let key = |d: &Diagnostic| -> (usize, i64) {
        match d.path.as_deref() {
            Some(path) => {
                let file_rank = rank
                    .get(path)
                    .copied()
                    .or_else(|| new_ranks.get(path).copied())
                    .unwrap_or(usize::MAX - 1);
                (file_rank, d.line)
            }
            // File-less diagnostics sort after everything file-scoped.
            None => (usize::MAX, d.line),
        }
    };

    // A stable sort preserves new-pass relative order on (path, line)
    // ties, and blocks travel whole because continuation lines live on
    // their header diagnostic.
    messages.sort_by_key(key);
    messages
}
