use serde::{Deserialize, Serialize};

use super::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Recorded at resolution. No funds have moved yet.
    Pending,
    /// Claimed right before the transfer. If it is never replaced the transfer may or
    /// may not have gone through and has to be checked against the funding source.
    Transferring,
    Transferred,
    Failed(String),
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayoutReceipt {
    pub participant: UserPubKey,
    pub amount: Amount,
    pub outcome: TransferOutcome,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settlement {
    pub prediction: PredictionId,
    pub winning_option: String,
    pub total_pool: Amount,
    pub winning_pool: Amount,
    pub payouts: Vec<PayoutReceipt>,
    /// Rounding remainder that no winner receives.
    pub dust: Amount,
    /// Whole pool kept back because nobody backed the winning option.
    pub undistributed: Amount,
}
impl Settlement {
    pub fn paid_out(&self) -> Amount {
        self.payouts
            .iter()
            .filter(|receipt| receipt.outcome == TransferOutcome::Transferred)
            .map(|receipt| receipt.amount)
            .sum()
    }
    /// Receipts that can go through `retry_payout`.
    pub fn unpaid(&self) -> Vec<&PayoutReceipt> {
        self.payouts
            .iter()
            .filter(|receipt| receipt.outcome.is_retryable())
            .collect()
    }
}
