//! Log sinks for the operation that triggered an install.

use std::sync::{Mutex, PoisonError};

/// Where an install reports progress, visible to whoever asked for it.
pub trait TaskListener: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl TaskListener for NullListener {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Keeps every line in memory. Error lines are prefixed with `ERROR: `.
#[derive(Debug, Default)]
pub struct BufferListener {
    lines: Mutex<Vec<String>>,
}

impl BufferListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    fn push(&self, line: String) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

impl TaskListener for BufferListener {
    fn info(&self, message: &str) {
        self.push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.push(format!("ERROR: {message}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_keeps_order_and_marks_errors() {
        let listener = BufferListener::new();
        listener.info("one");
        listener.error("two");

        assert_eq!(listener.lines(), vec!["one", "ERROR: two"]);
        assert!(listener.contains("two"));
        assert!(!listener.contains("three"));
    }
}
