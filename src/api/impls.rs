use std::fmt::{Display, Formatter};

use anyhow::bail;

use super::*;

impl Display for PredictionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Open => "Open".into(),
            Self::Resolved(option) => format!("Resolved({})", option),
        };
        write!(f, "{}", output)
    }
}
impl Display for TransferOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Pending => "Pending".into(),
            Self::Transferring => "Transferring".into(),
            Self::Transferred => "Transferred".into(),
            Self::Failed(reason) => format!("Failed({})", reason),
        };
        write!(f, "{}", output)
    }
}
impl TransferOutcome {
    /// Name of the outcome without its failure reason, as kept in storage.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Transferring => "Transferring",
            Self::Transferred => "Transferred",
            Self::Failed(_) => "Failed",
        }
    }
    /// Nothing was transferred, so attempting it again can't pay twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed(_))
    }
    pub fn from_parts(kind: &str, reason: Option<String>) -> anyhow::Result<Self> {
        match kind {
            "Pending" => Ok(Self::Pending),
            "Transferring" => Ok(Self::Transferring),
            "Transferred" => Ok(Self::Transferred),
            "Failed" => Ok(Self::Failed(reason.unwrap_or_default())),
            e => bail!("Couldn't deserialize to TransferOutcome: {}", e),
        }
    }
}
impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Participant => "Participant",
            Self::Admin => "Admin",
            Self::Owner => "Owner",
        };
        write!(f, "{}", output)
    }
}
