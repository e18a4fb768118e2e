use curator_core::Thread;
use std::collections::HashSet;

/// Keeps the first thread seen for each permalink, preserving order.
pub fn dedupe_by_permalink(threads: Vec<Thread>) -> Vec<Thread> {
    let mut seen = HashSet::with_capacity(threads.len());
    threads
        .into_iter()
        .filter(|thread| seen.insert(thread.permalink.clone()))
        .collect()
}
