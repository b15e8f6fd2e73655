use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use shared::domain::ReviewerId;

/// At most one submission per reviewer at a time.
///
/// Cloning shares the underlying set, so one gate can be handed to every
/// coordinator serving the same reviewers.
#[derive(Debug, Clone, Default)]
pub struct SubmissionGate {
    inflight: Arc<Mutex<HashSet<ReviewerId>>>,
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks and marks the reviewer in one critical section. The returned
    /// permit clears the mark when dropped.
    pub fn try_acquire(&self, reviewer: ReviewerId) -> Option<SubmissionPermit> {
        if !self.lock().insert(reviewer) {
            return None;
        }
        Some(SubmissionPermit {
            gate: self.clone(),
            reviewer,
        })
    }

    pub fn is_in_flight(&self, reviewer: ReviewerId) -> bool {
        self.lock().contains(&reviewer)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<ReviewerId>> {
        // The set stays consistent even if a holder panicked.
        self.inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
pub struct SubmissionPermit {
    gate: SubmissionGate,
    reviewer: ReviewerId,
}

impl SubmissionPermit {
    pub fn reviewer(&self) -> ReviewerId {
        self.reviewer
    }
}

impl Drop for SubmissionPermit {
    fn drop(&mut self) {
        self.gate.lock().remove(&self.reviewer);
    }
}
