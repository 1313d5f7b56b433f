//! Fire-and-forget notifications about settlement outcomes.

use crate::domain::DistributionResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Receives distribution outcomes. Failures never affect the settlement.
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn distribution_completed(&self, result: &DistributionResult);
}

/// Notifier that writes outcomes to the tracing log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn distribution_completed(&self, result: &DistributionResult) {
        if result.partial {
            warn!(
                goal_id = %result.goal_id,
                escrow_id = %result.escrow_id,
                failures = result.errors.len(),
                "Distribution finished with failed payouts"
            );
        } else {
            info!(
                goal_id = %result.goal_id,
                escrow_id = %result.escrow_id,
                status = %result.status,
                transactions = result.transaction_refs.len(),
                "Distribution finished"
            );
        }
    }
}

/// Notifier that keeps every outcome in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<Mutex<Vec<DistributionResult>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<DistributionResult> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn distribution_completed(&self, result: &DistributionResult) {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(result.clone());
    }
}

/// Deliver on a detached task so the caller never waits on the notifier.
pub fn notify_detached(notifier: Arc<dyn Notifier>, result: DistributionResult) {
    tokio::spawn(async move {
        notifier.distribution_completed(&result).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EscrowId, GoalId};

    #[tokio::test]
    async fn test_detached_delivery_reaches_notifier() {
        let recorder = RecordingNotifier::new();
        let result = DistributionResult::pending(GoalId::new("g1"), EscrowId::new("e1"), 1);

        notify_detached(Arc::new(recorder.clone()), result.clone());
        for _ in 0..50 {
            if !recorder.received().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(recorder.received(), vec![result]);
    }

    #[tokio::test]
    async fn test_log_notifier_does_not_panic() {
        let result = DistributionResult::pending(GoalId::new("g1"), EscrowId::new("e1"), 1);
        LogNotifier.distribution_completed(&result).await;
    }
}
