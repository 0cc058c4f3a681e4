//! Bounded event log

use std::collections::VecDeque;

use super::LogEntry;

/// Ring buffer of log entries, oldest evicted first
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The most recent `n` entries, oldest first
    pub fn tail(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogLevel;

    #[test]
    fn test_evicts_oldest_first() {
        let mut buffer = LogBuffer::new(1000);
        for i in 0..1500 {
            buffer.push(LogEntry::new(LogLevel::Info, format!("entry {}", i)));
        }

        assert_eq!(buffer.len(), 1000);
        let messages: Vec<_> = buffer.iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages.first().map(String::as_str), Some("entry 500"));
        assert_eq!(messages.last().map(String::as_str), Some("entry 1499"));
        assert!(messages
            .windows(2)
            .all(|w| w[0].trim_start_matches("entry ").parse::<u32>().unwrap() + 1
                == w[1].trim_start_matches("entry ").parse::<u32>().unwrap()));
    }

    #[test]
    fn test_tail_is_oldest_first() {
        let mut buffer = LogBuffer::new(10);
        for i in 0..5 {
            buffer.push(LogEntry::new(LogLevel::Info, format!("{}", i)));
        }

        let tail: Vec<_> = buffer.tail(3).into_iter().map(|e| e.message).collect();
        assert_eq!(tail, vec!["2", "3", "4"]);
        assert_eq!(buffer.tail(20).len(), 5);
    }
}
