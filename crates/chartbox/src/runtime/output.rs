//! Captured stdout/stderr
//!
//! Buffers are shared with the executor so that a timed-out run still
//! reports what it printed before the deadline.

use std::sync::{Arc, Mutex, MutexGuard};

/// Hard ceiling on captured bytes per stream
pub const MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

pub type SharedOutput = Arc<Mutex<OutputBuffer>>;

#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
    lines: usize,
    max_lines: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            ..Default::default()
        }
    }

    pub fn shared(max_lines: usize) -> SharedOutput {
        Arc::new(Mutex::new(Self::new(max_lines)))
    }

    /// Append text, dropping everything past the line or byte ceiling
    pub fn write(&mut self, text: &str) {
        if self.truncated {
            return;
        }
        for segment in text.split_inclusive('\n') {
            if self.lines >= self.max_lines || self.text.len() + segment.len() > MAX_OUTPUT_BYTES {
                self.truncated = true;
                return;
            }
            self.text.push_str(segment);
            if segment.ends_with('\n') {
                self.lines += 1;
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

/// Lock a shared buffer, recovering it if a worker panicked mid-write
pub fn lock(output: &SharedOutput) -> MutexGuard<'_, OutputBuffer> {
    output.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
