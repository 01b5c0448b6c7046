use chrono::{DateTime, Utc};
use secp256k1::ecdsa::Signature;
use serde::{Deserialize, Serialize};

use super::*;

// Requests
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AccessRequest {
    pub user: UserPubKey,
    /// Has to be greater than any nonce the server accepted from `user` before.
    pub nonce: u64,
    /// Signature by `user` over the JSON encoding of `(nonce, data)`.
    pub sig: Signature,
}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PostRequest<T> {
    pub access: AccessRequest,
    pub data: T,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AdminRequest {
    pub admin: UserPubKey,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NewPredictionRequest {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub deadline: DateTime<Utc>,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlaceBetRequest {
    pub prediction: PredictionId,
    pub option: String,
    pub amount: Amount,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EndPredictionRequest {
    pub prediction: PredictionId,
    pub winning_option: String,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetryPayoutRequest {
    pub prediction: PredictionId,
    pub participant: UserPubKey,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionRequest {
    pub prediction: PredictionId,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TotalStakeRequest {
    pub prediction: PredictionId,
    pub option: String,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParticipantStakeRequest {
    pub prediction: PredictionId,
    pub option: String,
    pub participant: UserPubKey,
}
