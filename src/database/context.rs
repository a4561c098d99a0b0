use std::time::Duration;
use tokio::time::Instant;

/// Caller-supplied deadline for a relational call.
///
/// Every call further bounds it by the configured timeout for its kind of
/// operation; whichever ends first wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// No deadline of its own.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline
            .map_or(false, |deadline| deadline <= Instant::now())
    }

    /// This context, cut short to at most `timeout` from now.
    pub fn shrink(&self, timeout: Duration) -> Self {
        let bound = Instant::now() + timeout;
        Self {
            deadline: Some(self.deadline.map_or(bound, |deadline| deadline.min(bound))),
        }
    }
}
