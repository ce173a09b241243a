
use serde::Serialize;
use uuid::Uuid;

use super::recipient::RecipientId;

/// Result of one fan-out call.
///
/// `succeeded + permanently_failed.len() + transiently_failed.len() == attempted`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub broadcast_id: Uuid,
    pub attempted: usize,
    pub succeeded: usize,
    pub permanently_failed: Vec<RecipientId>,
    pub transiently_failed: Vec<RecipientId>,
    pub total: usize,
    pub duration_ms: u64,
}

impl BroadcastOutcome {
    pub fn empty() -> Self {
        Self {
            broadcast_id: Uuid::new_v4(),
            attempted: 0,
            succeeded: 0,
            permanently_failed: Vec::new(),
            transiently_failed: Vec::new(),
            total: 0,
            duration_ms: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.permanently_failed.len() + self.transiently_failed.len()
    }

    pub fn rate_per_second(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        self.total as f64 / (self.duration_ms as f64 / 1000.0)
    }

    /// Folds in a second pass that was sent to this outcome's
    /// `transiently_failed` recipients.
    pub fn merge_fallback(mut self, fallback: BroadcastOutcome) -> Self {
        self.succeeded += fallback.succeeded;
        self.permanently_failed.extend(fallback.permanently_failed);
        self.transiently_failed = fallback.transiently_failed;
        self.duration_ms += fallback.duration_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(succeeded: usize, permanent: &[i64], transient: &[i64]) -> BroadcastOutcome {
        let attempted = succeeded + permanent.len() + transient.len();
        BroadcastOutcome {
            broadcast_id: Uuid::new_v4(),
            attempted,
            succeeded,
            permanently_failed: permanent.iter().copied().map(RecipientId).collect(),
            transiently_failed: transient.iter().copied().map(RecipientId).collect(),
            total: attempted,
            duration_ms: 1500,
        }
    }

    #[test]
    fn test_merge_fallback_keeps_invariant() {
        let first = outcome(5, &[1], &[2, 3, 4]);
        let fallback = outcome(2, &[3], &[]);
        let merged = first.merge_fallback(fallback);

        assert_eq!(merged.attempted, 9);
        assert_eq!(merged.succeeded, 7);
        assert_eq!(merged.permanently_failed, vec![RecipientId(1), RecipientId(3)]);
        assert!(merged.transiently_failed.is_empty());
        assert_eq!(merged.succeeded + merged.failed(), merged.attempted);
        assert_eq!(merged.duration_ms, 3000);
    }

    #[test]
    fn test_rate_per_second() {
        let o = outcome(3, &[], &[]);
        assert!((o.rate_per_second() - 2.0).abs() < f64::EPSILON);
        assert_eq!(BroadcastOutcome::empty().rate_per_second(), 0.0);
    }
}
