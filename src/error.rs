use crate::api::{PredictionId, UserPubKey};
use crate::funding_source::TransferError;
use axum::http::StatusCode;
use log::debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Access Denied: caller lacks the required privilege")]
    Unauthorized,
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("'{0}' is not an option of this prediction")]
    InvalidOption(String),
    #[error("Stake amount must be positive and within the ledger's range")]
    InvalidAmount,
    #[error("Staking is closed for this prediction")]
    StakingClosed,
    #[error("Prediction has not ended yet")]
    TooEarly,
    #[error("Prediction is already resolved")]
    AlreadyResolved,
    #[error("Prediction {0} doesn't exist")]
    UnknownPrediction(PredictionId),
    #[error("There is no unpaid payout for {participant} on prediction {prediction}")]
    NothingToRetry {
        prediction: PredictionId,
        participant: UserPubKey,
    },
    #[error("Payout to {participant} on prediction {prediction} was started but never recorded")]
    PayoutInDoubt {
        prediction: PredictionId,
        participant: UserPubKey,
    },
    #[error("Nonce {nonce} of {user} was already used or is too low")]
    Replayed { user: UserPubKey, nonce: u64 },
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
impl LedgerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::Replayed { .. } => StatusCode::UNAUTHORIZED,
            Self::InvalidParameters(_) | Self::InvalidOption(_) | Self::InvalidAmount => {
                StatusCode::BAD_REQUEST
            }
            Self::StakingClosed
            | Self::TooEarly
            | Self::AlreadyResolved
            | Self::PayoutInDoubt { .. } => StatusCode::CONFLICT,
            Self::UnknownPrediction(_) | Self::NothingToRetry { .. } => StatusCode::NOT_FOUND,
            Self::Transfer(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// helper functions
pub fn map_ledger_err(e: LedgerError) -> (StatusCode, String) {
    debug!("Error: {:#}", e);
    (e.status_code(), e.to_string())
}
