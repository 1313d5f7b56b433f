use crate::db::repo::AccrualUpdate;
use crate::db::Repository;
use crate::domain::{Decimal, StakeId, StakeStatus, TimeMs, UserId};
use crate::engine::AccrualCalculator;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Stake not found: {0}")]
    StakeNotFound(StakeId),
    #[error("Stake {stake_id} cannot be liquidated from status {status}")]
    NotLiquidatable {
        stake_id: StakeId,
        status: StakeStatus,
    },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Summary of one refresh pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualRefreshResult {
    pub stakes_updated: usize,
    pub stakes_liquidated: usize,
    /// Interest newly accrued by this pass.
    pub total_accrued: Decimal,
    /// Per-stake problems; the rest of the batch still runs.
    pub errors: Vec<String>,
    pub timestamp: TimeMs,
}

/// Recomputes accrued interest for every accrual-eligible stake.
#[derive(Clone)]
pub struct AccrualRefreshJob {
    repo: Arc<Repository>,
    stake_max_value: Option<Decimal>,
}

impl AccrualRefreshJob {
    pub fn new(repo: Arc<Repository>, stake_max_value: Option<Decimal>) -> Self {
        Self {
            repo,
            stake_max_value,
        }
    }

    pub async fn refresh_accruals(
        &self,
        user_id: Option<&UserId>,
    ) -> Result<AccrualRefreshResult, RefreshError> {
        self.refresh_accruals_at(user_id, TimeMs::now()).await
    }

    /// Refresh as of `now`. Accrued amounts never decrease; a stake past its
    /// deadline, at the value cap, or flagged for liquidation is liquidated.
    pub async fn refresh_accruals_at(
        &self,
        user_id: Option<&UserId>,
        now: TimeMs,
    ) -> Result<AccrualRefreshResult, RefreshError> {
        let (stakes, failures) = self.repo.list_accruing_stakes(user_id).await?;

        let mut errors: Vec<String> = failures
            .into_iter()
            .map(|f| format!("stake {}: {}", f.stake_id, f.message))
            .collect();
        let mut updates = Vec::with_capacity(stakes.len());
        let mut total_accrued = Decimal::zero();

        for stake in stakes {
            if let Err(e) = stake.validate() {
                warn!(stake_id = %stake.id, error = %e, "Skipping invalid stake");
                errors.push(format!("stake {}: {}", stake.id, e));
                continue;
            }

            let mut accrued = AccrualCalculator::calculate_accrued_amount(&stake, now);
            let mut liquidate =
                now > stake.deadline || stake.status == StakeStatus::PendingLiquidation;

            if let Some(cap) = self.stake_max_value {
                if stake.principal + accrued >= cap {
                    liquidate = true;
                    accrued = accrued.min((cap - stake.principal).non_negative());
                }
            }
            // A lowered cap or an earlier clock never shrinks a stored accrual.
            accrued = accrued.max(stake.accrued_amount);

            total_accrued += (accrued - stake.accrued_amount).non_negative();
            updates.push(AccrualUpdate {
                stake_id: stake.id.clone(),
                goal_id: stake.goal_id.clone(),
                accrued_amount: accrued,
                status: if liquidate {
                    StakeStatus::Liquidated
                } else {
                    stake.status
                },
            });
        }

        let stakes_liquidated = updates
            .iter()
            .filter(|u| u.status == StakeStatus::Liquidated)
            .count();
        let stakes_updated = self.repo.apply_accrual_updates(&updates, now).await?;

        info!(
            stakes_updated,
            stakes_liquidated,
            total_accrued = %total_accrued,
            errors = errors.len(),
            "Accrual refresh finished"
        );

        Ok(AccrualRefreshResult {
            stakes_updated,
            stakes_liquidated,
            total_accrued,
            errors,
            timestamp: now,
        })
    }

    /// Flag an active stake for liquidation on the next refresh. Flagging an
    /// already flagged stake is a no-op.
    pub async fn request_liquidation(&self, stake_id: &StakeId) -> Result<(), RefreshError> {
        if self
            .repo
            .transition_stake_status(
                stake_id,
                &[StakeStatus::Active],
                StakeStatus::PendingLiquidation,
            )
            .await?
        {
            info!(stake_id = %stake_id, "Liquidation requested");
            return Ok(());
        }

        match self.repo.get_stake(stake_id).await? {
            None => Err(RefreshError::StakeNotFound(stake_id.clone())),
            Some(stake) if stake.status == StakeStatus::PendingLiquidation => Ok(()),
            Some(stake) => Err(RefreshError::NotLiquidatable {
                stake_id: stake_id.clone(),
                status: stake.status,
            }),
        }
    }

    /// Refresh every `interval` until the task is dropped. Failed passes are
    /// logged and retried on the next tick.
    pub async fn run_periodic(self, interval: Duration) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.refresh_accruals(None).await {
                error!(error = %e, "Accrual refresh failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{dec, make_stake, setup_test_db};
    use crate::domain::{OwnershipClass, MS_PER_DAY};

    async fn hold(repo: &Repository, stake: &crate::domain::Stake) {
        repo.hold_stake_atomic(stake, OwnershipClass::Individual, TimeMs::new(0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_accrues_half_year() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        hold(&repo, &make_stake("s1", "g1", "u1", "1000")).await;

        let job = AccrualRefreshJob::new(repo.clone(), None);
        let result = job
            .refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 365 / 2))
            .await
            .unwrap();

        assert_eq!(result.stakes_updated, 1);
        assert_eq!(result.stakes_liquidated, 0);
        assert_eq!(result.total_accrued, dec("60"));
        assert!(result.errors.is_empty());

        let stake = repo.get_stake(&StakeId::new("s1")).await.unwrap().unwrap();
        assert_eq!(stake.accrued_amount, dec("60"));
        let escrow = repo
            .find_escrow_for_goal(&stake.goal_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(escrow.accrued_amount, dec("60"));
    }

    #[tokio::test]
    async fn test_refresh_is_monotonic() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        hold(&repo, &make_stake("s1", "g1", "u1", "1000")).await;
        let job = AccrualRefreshJob::new(repo.clone(), None);

        job.refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 100))
            .await
            .unwrap();
        let before = repo.get_stake(&StakeId::new("s1")).await.unwrap().unwrap();

        // An earlier clock must not shrink what was already accrued.
        let result = job
            .refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 10))
            .await
            .unwrap();
        let after = repo.get_stake(&StakeId::new("s1")).await.unwrap().unwrap();

        assert_eq!(after.accrued_amount, before.accrued_amount);
        assert_eq!(result.total_accrued, Decimal::zero());
    }

    #[tokio::test]
    async fn test_refresh_liquidates_past_deadline() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        hold(&repo, &make_stake("s1", "g1", "u1", "1000")).await;
        let job = AccrualRefreshJob::new(repo.clone(), None);

        let result = job
            .refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 400))
            .await
            .unwrap();

        assert_eq!(result.stakes_liquidated, 1);
        let stake = repo.get_stake(&StakeId::new("s1")).await.unwrap().unwrap();
        assert_eq!(stake.status, StakeStatus::Liquidated);
        // Accrual stops at the deadline.
        assert_eq!(stake.accrued_amount, dec("120"));
    }

    #[tokio::test]
    async fn test_refresh_clamps_at_max_value() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        hold(&repo, &make_stake("s1", "g1", "u1", "1000")).await;
        let job = AccrualRefreshJob::new(repo.clone(), Some(dec("1050")));

        let result = job
            .refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 365 / 2))
            .await
            .unwrap();

        assert_eq!(result.stakes_liquidated, 1);
        assert_eq!(result.total_accrued, dec("50"));
        let stake = repo.get_stake(&StakeId::new("s1")).await.unwrap().unwrap();
        assert_eq!(stake.status, StakeStatus::Liquidated);
        assert_eq!(stake.current_value(), dec("1050"));
    }

    #[tokio::test]
    async fn test_lowered_cap_keeps_stored_accrual() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        hold(&repo, &make_stake("s1", "g1", "u1", "1000")).await;

        AccrualRefreshJob::new(repo.clone(), None)
            .refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 365 / 2))
            .await
            .unwrap();

        let result = AccrualRefreshJob::new(repo.clone(), Some(dec("1030")))
            .refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 200))
            .await
            .unwrap();

        assert_eq!(result.stakes_liquidated, 1);
        assert_eq!(result.total_accrued, Decimal::zero());
        let stake = repo.get_stake(&StakeId::new("s1")).await.unwrap().unwrap();
        assert_eq!(stake.status, StakeStatus::Liquidated);
        assert_eq!(stake.accrued_amount, dec("60"));
    }

    #[tokio::test]
    async fn test_refresh_filters_by_user() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        hold(&repo, &make_stake("s1", "g1", "u1", "1000")).await;
        hold(&repo, &make_stake("s2", "g2", "u2", "1000")).await;
        let job = AccrualRefreshJob::new(repo.clone(), None);

        let result = job
            .refresh_accruals_at(Some(&UserId::new("u2")), TimeMs::new(MS_PER_DAY * 10))
            .await
            .unwrap();

        assert_eq!(result.stakes_updated, 1);
        let untouched = repo.get_stake(&StakeId::new("s1")).await.unwrap().unwrap();
        assert_eq!(untouched.accrued_amount, Decimal::zero());
    }

    #[tokio::test]
    async fn test_invalid_stake_is_reported_and_skipped() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        let mut bad = make_stake("bad", "g1", "u1", "1000");
        bad.fee_rate_on_withdrawal = dec("2");
        hold(&repo, &bad).await;
        hold(&repo, &make_stake("good", "g2", "u2", "1000")).await;
        let job = AccrualRefreshJob::new(repo.clone(), None);

        let result = job
            .refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 10))
            .await
            .unwrap();

        assert_eq!(result.stakes_updated, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("bad"));
    }

    #[tokio::test]
    async fn test_request_liquidation() {
        let (repo, _temp) = setup_test_db().await;
        let repo = Arc::new(repo);
        hold(&repo, &make_stake("s1", "g1", "u1", "1000")).await;
        let job = AccrualRefreshJob::new(repo.clone(), None);

        job.request_liquidation(&StakeId::new("s1")).await.unwrap();
        job.request_liquidation(&StakeId::new("s1")).await.unwrap();
        assert!(matches!(
            job.request_liquidation(&StakeId::new("missing")).await,
            Err(RefreshError::StakeNotFound(_))
        ));

        let result = job
            .refresh_accruals_at(None, TimeMs::new(MS_PER_DAY * 10))
            .await
            .unwrap();
        assert_eq!(result.stakes_liquidated, 1);

        assert!(matches!(
            job.request_liquidation(&StakeId::new("s1")).await,
            Err(RefreshError::NotLiquidatable {
                status: StakeStatus::Liquidated,
                ..
            })
        ));
    }
}
