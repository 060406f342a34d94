use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

pub const DEFAULT_LOG_TAIL_LINES: usize = 50;
const MAX_LINE_CHARS: usize = 500;

/// The last lines an action printed during one attempt.
///
/// Clones share one buffer, so a runner can write into the handle it received
/// in its [`ActionContext`](crate::ActionContext) while the worker reads it
/// back after the attempt, whatever the outcome.
#[derive(Debug, Clone)]
pub struct LogTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push_line(&self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(clip(line));
    }

    pub fn push_text(&self, text: &str) {
        for line in text.lines() {
            self.push_line(line);
        }
    }

    /// Retained lines joined with `\n`; `None` when nothing was written.
    pub fn contents(&self) -> Option<String> {
        let lines = self.lock();
        if lines.is_empty() {
            return None;
        }
        Some(lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"))
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn clip(line: &str) -> String {
    match line.char_indices().nth(MAX_LINE_CHARS) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_string(),
    }
}
