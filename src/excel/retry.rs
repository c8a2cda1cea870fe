use std::time::Duration;

/// Exponential backoff schedule shared by the acquirer and the note writer:
/// `base * 2^attempt`, attempt counted from zero.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    /// Delay to sleep after failed attempt number `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        // Cap the shift so a misconfigured attempt count cannot overflow.
        let factor = 1u32 << attempt.min(16);
        self.base.saturating_mul(factor)
    }
}
