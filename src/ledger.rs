use crate::access::AccessControl;
use crate::api::*;
use crate::clock::Clock;
use crate::db::DB;
use crate::error::LedgerError;
use crate::funding_source::FundingSource;
use crate::payout::{calculate_odds, Payout, PayoutSchedule};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, error};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub deadline: DateTime<Utc>,
}

pub struct Ledger {
    db: Arc<dyn DB + Send + Sync>,
    funding: Arc<dyn FundingSource + Send + Sync>,
    access: Arc<dyn AccessControl + Send + Sync>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl Ledger {
    pub fn new(
        db: Arc<dyn DB + Send + Sync>,
        funding: Arc<dyn FundingSource + Send + Sync>,
        access: Arc<dyn AccessControl + Send + Sync>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            db,
            funding,
            access,
            clock,
        }
    }
    pub async fn create_prediction(
        &self,
        caller: &UserPubKey,
        title: String,
        description: String,
        options: Vec<String>,
        deadline: DateTime<Utc>,
    ) -> Result<PredictionId, LedgerError> {
        if !self.access.is_authorized(caller) {
            return Err(LedgerError::Unauthorized);
        }
        let now = self.clock.now();
        if options.len() < 2 {
            return Err(LedgerError::InvalidParameters(format!(
                "There were {} options but there need to be at least 2",
                options.len()
            )));
        }
        if options.iter().any(|option| option.trim().is_empty()) {
            return Err(LedgerError::InvalidParameters(
                "Options can't be empty".to_string(),
            ));
        }
        if options.iter().collect::<HashSet<_>>().len() != options.len() {
            return Err(LedgerError::InvalidParameters(
                "Options have to be distinct".to_string(),
            ));
        }
        // stored with second precision
        let deadline = Utc
            .timestamp_opt(deadline.timestamp(), 0)
            .single()
            .ok_or_else(|| LedgerError::InvalidParameters("Invalid deadline".to_string()))?;
        if deadline <= now {
            return Err(LedgerError::InvalidParameters(format!(
                "Deadline was at {} but needs to be after {}",
                deadline, now
            )));
        }
        let id = self
            .db
            .add_prediction(NewPrediction {
                title,
                description,
                options,
                deadline,
            })
            .await?;
        debug!("Created prediction {} closing at {}", id, deadline);
        Ok(id)
    }
    pub async fn place_bet(
        &self,
        caller: &UserPubKey,
        prediction: PredictionId,
        option: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let now = self.clock.now();
        let record = self.get_prediction(prediction).await?;
        if !record.is_active() || now >= record.deadline {
            return Err(LedgerError::StakingClosed);
        }
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if !record.has_option(option) {
            return Err(LedgerError::InvalidOption(option.to_string()));
        }
        // every pool and stake stays within the pool total, which has to fit storage
        let total = self.db.get_stakes_total(prediction).await?;
        if total
            .checked_add(amount)
            .map_or(true, |total| total > i64::MAX as Amount)
        {
            return Err(LedgerError::InvalidAmount);
        }
        self.funding.transfer_in(caller, amount).await?;
        if let Err(e) = self.db.add_stake(prediction, option, caller, amount).await {
            error!(
                "Couldn't record stake of {} by {} on prediction {}, returning funds: {:#}",
                amount, caller, prediction, e
            );
            if let Err(refund) = self.funding.transfer_out(caller, amount).await {
                error!("Returning {} to {} failed: {}", amount, caller, refund);
            }
            return Err(e.into());
        }
        debug!(
            "{} staked {} on '{}' of prediction {}",
            caller, amount, option, prediction
        );
        Ok(())
    }
    pub async fn end_prediction(
        &self,
        caller: &UserPubKey,
        prediction: PredictionId,
        winning_option: &str,
    ) -> Result<Settlement, LedgerError> {
        if !self.access.is_authorized(caller) {
            return Err(LedgerError::Unauthorized);
        }
        let now = self.clock.now();
        let record = self.get_prediction(prediction).await?;
        if let Some(winner) = record.winning_option() {
            debug!("Prediction {} was already resolved with '{}'", prediction, winner);
            return Err(LedgerError::AlreadyResolved);
        }
        if now < record.deadline {
            return Err(LedgerError::TooEarly);
        }
        if !record.has_option(winning_option) {
            return Err(LedgerError::InvalidOption(winning_option.to_string()));
        }
        let pools = self.db.get_pools(prediction).await?;
        let total_pool: Amount = pools.values().sum();
        let winning_pool = pools.get(winning_option).copied().unwrap_or_default();
        let stakes = self.db.get_option_stakes(prediction, winning_option).await?;
        let payouts: Vec<Payout> = PayoutSchedule::new(stakes, winning_pool, total_pool).collect();

        if !self
            .db
            .resolve_prediction(prediction, winning_option, &payouts)
            .await?
        {
            return Err(LedgerError::AlreadyResolved);
        }
        debug!(
            "Resolved prediction {} with '{}': {} of {} staked on the winner",
            prediction, winning_option, winning_pool, total_pool
        );

        // resolution is committed, from here on one payout's problems never stop the others
        let mut receipts = Vec::with_capacity(payouts.len());
        for payout in payouts {
            let outcome = match self.settle_payout(prediction, &payout).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        "Couldn't start paying {} to {} for prediction {}, it stays pending: {:#}",
                        payout.amount, payout.participant, prediction, e
                    );
                    TransferOutcome::Pending
                }
            };
            receipts.push(PayoutReceipt {
                participant: payout.participant,
                amount: payout.amount,
                outcome,
            });
        }
        let distributed: Amount = receipts.iter().map(|receipt| receipt.amount).sum();
        let (dust, undistributed) = if winning_pool == 0 {
            (0, total_pool)
        } else {
            (total_pool - distributed, 0)
        };
        if undistributed > 0 {
            debug!(
                "Nobody backed '{}' on prediction {}, {} stays undistributed",
                winning_option, prediction, undistributed
            );
        }
        Ok(Settlement {
            prediction,
            winning_option: winning_option.to_string(),
            total_pool,
            winning_pool,
            payouts: receipts,
            dust,
            undistributed,
        })
    }
    /// Attempts a pending or failed payout again. Receipts that are transferred or
    /// whose transfer was started but never recorded are never touched.
    pub async fn retry_payout(
        &self,
        caller: &UserPubKey,
        prediction: PredictionId,
        participant: &UserPubKey,
    ) -> Result<PayoutReceipt, LedgerError> {
        if !self.access.is_authorized(caller) {
            return Err(LedgerError::Unauthorized);
        }
        self.get_prediction(prediction).await?;
        let receipt = match self.db.get_payout(prediction, participant).await? {
            Some(receipt) if receipt.outcome.is_retryable() => receipt,
            Some(receipt) if receipt.outcome == TransferOutcome::Transferring => {
                return Err(LedgerError::PayoutInDoubt {
                    prediction,
                    participant: *participant,
                })
            }
            _ => {
                return Err(LedgerError::NothingToRetry {
                    prediction,
                    participant: *participant,
                })
            }
        };
        let payout = Payout {
            participant: receipt.participant,
            amount: receipt.amount,
        };
        let outcome = self.settle_payout(prediction, &payout).await?;
        Ok(PayoutReceipt { outcome, ..receipt })
    }
    /// Claims the receipt as `Transferring`, transfers and records the outcome.
    /// Fails only if the claim couldn't be stored, in which case no funds moved.
    async fn settle_payout(
        &self,
        prediction: PredictionId,
        payout: &Payout,
    ) -> anyhow::Result<TransferOutcome> {
        self.db
            .set_payout_outcome(
                prediction,
                &payout.participant,
                &TransferOutcome::Transferring,
            )
            .await?;
        let outcome = self.transfer_payout(prediction, payout).await;
        if let Err(e) = self
            .db
            .set_payout_outcome(prediction, &payout.participant, &outcome)
            .await
        {
            error!(
                "Couldn't record outcome {} of paying {} to {} for prediction {}, the receipt stays Transferring: {:#}",
                outcome, payout.amount, payout.participant, prediction, e
            );
        }
        Ok(outcome)
    }
    async fn transfer_payout(&self, prediction: PredictionId, payout: &Payout) -> TransferOutcome {
        match self
            .funding
            .transfer_out(&payout.participant, payout.amount)
            .await
        {
            Ok(()) => {
                debug!(
                    "Paid out {} to {} for prediction {}",
                    payout.amount, payout.participant, prediction
                );
                TransferOutcome::Transferred
            }
            Err(e) => {
                error!(
                    "Paying out {} to {} for prediction {} failed: {}",
                    payout.amount, payout.participant, prediction, e
                );
                TransferOutcome::Failed(e.to_string())
            }
        }
    }
    pub async fn get_prediction(&self, prediction: PredictionId) -> Result<Prediction, LedgerError> {
        self.db
            .get_prediction(prediction)
            .await?
            .ok_or(LedgerError::UnknownPrediction(prediction))
    }
    pub async fn get_predictions(&self) -> Result<Vec<Prediction>, LedgerError> {
        Ok(self.db.get_predictions().await?)
    }
    pub async fn get_options(&self, prediction: PredictionId) -> Result<Vec<String>, LedgerError> {
        Ok(self.get_prediction(prediction).await?.options)
    }
    pub async fn get_total_stake(
        &self,
        prediction: PredictionId,
        option: &str,
    ) -> Result<Amount, LedgerError> {
        self.check_option(prediction, option).await?;
        Ok(self.db.get_total_stake(prediction, option).await?)
    }
    pub async fn get_participant_stake(
        &self,
        prediction: PredictionId,
        option: &str,
        participant: &UserPubKey,
    ) -> Result<Amount, LedgerError> {
        self.check_option(prediction, option).await?;
        Ok(self
            .db
            .get_participant_stake(prediction, option, participant)
            .await?)
    }
    pub async fn get_pools(&self, prediction: PredictionId) -> Result<Vec<OptionPool>, LedgerError> {
        let record = self.get_prediction(prediction).await?;
        self.pools_of(&record).await
    }
    pub async fn get_overview(
        &self,
        prediction: PredictionId,
    ) -> Result<PredictionOverviewResponse, LedgerError> {
        let record = self.get_prediction(prediction).await?;
        let pools = self.pools_of(&record).await?;
        Ok(PredictionOverviewResponse {
            prediction: record,
            total: pools.iter().map(|pool| pool.total).sum(),
            pools,
        })
    }
    /// Pools in declared option order, including options nobody backed yet.
    async fn pools_of(&self, record: &Prediction) -> Result<Vec<OptionPool>, LedgerError> {
        let pools = self.db.get_pools(record.id).await?;
        let total: Amount = pools.values().sum();
        Ok(record
            .options
            .iter()
            .map(|option| {
                let pool = pools.get(option).copied().unwrap_or_default();
                OptionPool {
                    option: option.clone(),
                    total: pool,
                    odds: calculate_odds(pool, total),
                }
            })
            .collect())
    }
    pub async fn get_payouts(
        &self,
        prediction: PredictionId,
    ) -> Result<Vec<PayoutReceipt>, LedgerError> {
        self.get_prediction(prediction).await?;
        Ok(self.db.get_payouts(prediction).await?)
    }
    /// Rejects a signed request whose nonce isn't above the caller's last accepted one.
    pub async fn use_nonce(&self, access: &AccessRequest) -> Result<(), LedgerError> {
        if !self.db.accept_nonce(&access.user, access.nonce).await? {
            return Err(LedgerError::Replayed {
                user: access.user,
                nonce: access.nonce,
            });
        }
        Ok(())
    }
    async fn check_option(&self, prediction: PredictionId, option: &str) -> Result<(), LedgerError> {
        if !self.get_prediction(prediction).await?.has_option(option) {
            return Err(LedgerError::InvalidOption(option.to_string()));
        }
        Ok(())
    }
}
