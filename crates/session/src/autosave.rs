use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingSave {
    markup: String,
    due: Instant,
}

/// Trailing-edge debounce for document writes. Every edit re-arms the
/// deadline and replaces the carried markup, so a burst of edits produces
/// a single write of the latest state.
#[derive(Debug, Clone)]
pub struct SaveDebouncer {
    delay: Duration,
    pending: Option<PendingSave>,
}

impl SaveDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn schedule(&mut self, markup: String, now: Instant) {
        self.pending = Some(PendingSave {
            markup,
            due: now + self.delay,
        });
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.due)
    }

    /// Hands out the markup once its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        if self.pending.as_ref().is_some_and(|pending| pending.due <= now) {
            return self.pending.take().map(|pending| pending.markup);
        }
        None
    }

    /// Hands out the markup right away, due or not.
    pub fn flush(&mut self) -> Option<String> {
        self.pending.take().map(|pending| pending.markup)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
