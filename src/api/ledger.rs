use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currency in its smallest indivisible unit.
pub type Amount = u64;
pub type UserPubKey = secp256k1::PublicKey;
pub type PredictionId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prediction {
    pub id: PredictionId,
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub deadline: DateTime<Utc>,
    pub state: PredictionState,
}
impl Prediction {
    pub fn is_active(&self) -> bool {
        self.state == PredictionState::Open
    }
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|label| label == option)
    }
    pub fn winning_option(&self) -> Option<&str> {
        match &self.state {
            PredictionState::Open => None,
            PredictionState::Resolved(option) => Some(option.as_str()),
        }
    }
}
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub enum PredictionState {
    Open,
    Resolved(String),
}
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OptionPool {
    pub option: String,
    pub total: Amount,
    /// Payout multiplier for this option if it won right now, `None` while nobody backs it.
    pub odds: Option<Decimal>,
}
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Participant,
    Admin,
    Owner,
}
