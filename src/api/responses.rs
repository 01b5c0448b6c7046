use serde::{Deserialize, Serialize};

use super::*;

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct PredictionOverviewResponse {
    pub prediction: Prediction,
    pub pools: Vec<OptionPool>,
    pub total: Amount,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct RoleResponse {
    pub user: UserPubKey,
    pub role: Role,
}
