use crate::error::{Result, VfsError};
use std::time::{Duration, Instant};

/// Absolute time budget shared by every evaluation of one query.
///
/// The deadline is fixed when the query starts; entries visited later get
/// whatever is left, there is no per-entry reset.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    /// Start a budget of `budget` now; `None` never expires
    pub fn start(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// A deadline that never expires
    pub fn unbounded() -> Self {
        Self::start(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Time left before expiry, or `Timeout` if none is left.
    ///
    /// Unbounded deadlines report `Duration::MAX`.
    pub fn remaining(&self) -> Result<Duration> {
        let Some(budget) = self.budget else {
            return Ok(Duration::MAX);
        };
        let elapsed = self.elapsed();
        match budget.checked_sub(elapsed) {
            Some(left) if !left.is_zero() => Ok(left),
            _ => Err(VfsError::Timeout { elapsed, budget }),
        }
    }

    /// `Err(Timeout)` if the budget is exhausted
    pub fn check(&self) -> Result<()> {
        self.remaining().map(|_| ())
    }

    pub fn is_expired(&self) -> bool {
        self.check().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_expires() {
        let deadline = Deadline::unbounded();
        assert_eq!(deadline.remaining().unwrap(), Duration::MAX);
        assert!(!deadline.is_expired());
    }

    #[test]
    fn test_zero_budget_expires_immediately() {
        let deadline = Deadline::start(Some(Duration::ZERO));
        assert!(matches!(deadline.remaining(), Err(VfsError::Timeout { .. })));
    }

    #[test]
    fn test_budget_runs_out() {
        let deadline = Deadline::start(Some(Duration::from_millis(20)));
        assert!(deadline.remaining().unwrap() <= Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(30));
        assert!(deadline.is_expired());
    }
}
