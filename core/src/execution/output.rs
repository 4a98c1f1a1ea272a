//! Output capture: the bounded stderr tail kept per running job.
//!
//! The tail is what a failure report quotes, so it is snapshotted before the
//! job's handle is disposed.

use std::collections::VecDeque;

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// The last `max_lines` lines of one stream. Older lines are evicted and
/// only counted.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    max_lines: usize,
    evicted: usize,
}

impl OutputBuffer {
    pub fn new(max_lines: usize) -> Self {
        OutputBuffer {
            lines: VecDeque::new(),
            max_lines: max_lines.max(1),
            evicted: 0,
        }
    }

    pub fn push_line(&mut self, text: &str) {
        if self.lines.len() >= self.max_lines {
            self.lines.pop_front();
            self.evicted += 1;
        }
        self.lines.push_back(text.to_string());
    }

    /// Buffered lines joined with newlines, oldest first, preceded by a note
    /// when earlier lines were evicted.
    pub fn text(&self) -> String {
        let mut out = String::new();
        if self.evicted > 0 {
            out.push_str(&format!("[{} earlier lines omitted]\n", self.evicted));
        }
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(line);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_lines_in_order() {
        let mut buf = OutputBuffer::new(10);
        buf.push_line("hello");
        buf.push_line("world");
        assert_eq!(buf.text(), "hello\nworld");
    }

    #[test]
    fn evicts_oldest_and_says_so() {
        let mut buf = OutputBuffer::new(3);
        for word in ["a", "bb", "ccc", "dddd", "e"] {
            buf.push_line(word);
        }
        assert_eq!(buf.text(), "[2 earlier lines omitted]\nccc\ndddd\ne");
    }

    #[test]
    fn zero_capacity_still_keeps_the_last_line() {
        let mut buf = OutputBuffer::new(0);
        assert_eq!(buf.text(), "");
        buf.push_line("x");
        buf.push_line("y");
        assert_eq!(buf.text(), "[1 earlier lines omitted]\ny");
    }
}
