//! [`ActuationGuard`] – consecutive actuation failure counter.
//!
//! A single refused command is tolerated: the control loop logs it and
//! tries again on the next tick.  A sink that keeps refusing is treated as
//! lost, and the loop halts.  The guard counts failures in a row and signals
//! when that count reaches its threshold; any successful tick resets it.
//!
//! # Example
//!
//! ```rust
//! use sumo_runtime::failure_guard::ActuationGuard;
//!
//! let mut guard = ActuationGuard::new(3);
//!
//! assert!(!guard.record_failure());
//! assert!(!guard.record_failure());
//! guard.record_success(); // streak broken
//!
//! assert!(!guard.record_failure());
//! assert!(!guard.record_failure());
//! assert!(guard.record_failure()); // third in a row → escalate
//! ```

/// Default number of consecutive failures before the loop halts.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// ActuationGuard
// ─────────────────────────────────────────────────────────────────────────────

/// Counts consecutive actuation failures.
#[derive(Debug, Clone)]
pub struct ActuationGuard {
    /// Failures in a row that trigger escalation.  Never zero.
    threshold: usize,
    consecutive: usize,
}

impl Default for ActuationGuard {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

impl ActuationGuard {
    /// Create a guard escalating after `threshold` failures in a row.
    ///
    /// A threshold of 0 is treated as 1.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Failures recorded since the last success.
    pub fn consecutive_failures(&self) -> usize {
        self.consecutive
    }

    /// Record a failed tick.  Returns `true` once the threshold is reached.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.is_escalated()
    }

    /// Record a successful tick, clearing the streak.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn is_escalated(&self) -> bool {
        self.consecutive >= self.threshold
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_at_threshold() {
        let mut guard = ActuationGuard::new(3);
        assert!(!guard.record_failure());
        assert!(!guard.record_failure());
        assert!(guard.record_failure());
    }

    #[test]
    fn does_not_escalate_below_threshold() {
        let mut guard = ActuationGuard::new(4);
        for _ in 0..3 {
            assert!(!guard.record_failure());
        }
        assert_eq!(guard.consecutive_failures(), 3);
    }

    #[test]
    fn stays_escalated_past_threshold() {
        let mut guard = ActuationGuard::new(2);
        guard.record_failure();
        assert!(guard.record_failure());
        assert!(guard.record_failure());
    }

    #[test]
    fn success_breaks_streak() {
        let mut guard = ActuationGuard::new(3);
        guard.record_failure();
        guard.record_failure();
        guard.record_success();
        assert!(!guard.is_escalated());
        assert!(!guard.record_failure());
    }

    #[test]
    fn reset_clears_escalation() {
        let mut guard = ActuationGuard::new(1);
        assert!(guard.record_failure());
        guard.reset();
        assert!(!guard.is_escalated());
        assert_eq!(guard.consecutive_failures(), 0);
    }

    #[test]
    fn zero_threshold_behaves_as_one() {
        let mut guard = ActuationGuard::new(0);
        assert_eq!(guard.threshold(), 1);
        assert!(guard.record_failure());
    }

    #[test]
    fn default_threshold_is_five() {
        let mut guard = ActuationGuard::default();
        for _ in 0..4 {
            assert!(!guard.record_failure());
        }
        assert!(guard.record_failure());
    }
}
