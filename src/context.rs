//! Explicit logging context.
//!
//! `DebugLog` is constructed once by the host application and handed to the
//! components that report cycle events. Every line goes to the `log` facade
//! and is also kept in a bounded ring so an in-app viewer can show recent
//! activity without any global state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub index: u64,
    pub level: log::Level,
    pub message: String,
}

#[derive(Debug)]
struct LogRing {
    lines: VecDeque<LogLine>,
    capacity: usize,
    next_index: u64,
}

/// Cloneable handle to a shared log ring.
#[derive(Clone, Debug)]
pub struct DebugLog {
    ring: Arc<Mutex<LogRing>>,
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(LogRing {
                lines: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
                capacity: capacity.max(1),
                next_index: 0,
            })),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(log::Level::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(log::Level::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(log::Level::Error, message.into());
    }

    /// Debug lines go to the facade only; they are too chatty for the ring.
    pub fn debug(&self, message: impl AsRef<str>) {
        log::debug!("{}", message.as_ref());
    }

    fn record(&self, level: log::Level, message: String) {
        log::log!(level, "{}", message);
        // A poisoned ring only loses the in-app copy.
        let Ok(mut ring) = self.ring.lock() else {
            return;
        };
        while ring.lines.len() >= ring.capacity {
            ring.lines.pop_front();
        }
        let index = ring.next_index;
        ring.next_index += 1;
        ring.lines.push_back(LogLine {
            index,
            level,
            message,
        });
    }

    /// Snapshot of retained lines, oldest first.
    pub fn recent(&self) -> Vec<LogLine> {
        self.ring
            .lock()
            .map(|ring| ring.lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count_at(&self, level: log::Level) -> usize {
        self.ring
            .lock()
            .map(|ring| ring.lines.iter().filter(|l| l.level == level).count())
            .unwrap_or(0)
    }
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
