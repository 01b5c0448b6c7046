use crate::api::{Amount, UserPubKey};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{0} rejected the transfer")]
    Rejected(UserPubKey),
    #[error("Funding source unavailable: {0}")]
    Unavailable(String),
}

/// Moves currency between participants and the ledger's escrow.
#[async_trait]
pub trait FundingSource {
    async fn transfer_in(&self, from: &UserPubKey, amount: Amount) -> Result<(), TransferError>;
    async fn transfer_out(&self, to: &UserPubKey, amount: Amount) -> Result<(), TransferError>;
}

/// Settles every transfer instantly and tracks the net flow per account.
/// Clones share their state, so a test can keep a handle after handing one to the ledger.
#[derive(Debug, Default, Clone)]
pub struct TestFundingSource {
    balances: Arc<Mutex<HashMap<UserPubKey, i128>>>,
    rejecting: Arc<Mutex<HashSet<UserPubKey>>>,
    escrow: Arc<Mutex<i128>>,
}
impl TestFundingSource {
    /// Net amount `account` received from (positive) or paid into (negative) the ledger.
    pub fn balance(&self, account: &UserPubKey) -> i128 {
        self.balances
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .unwrap_or_default()
    }
    /// Currency currently held by the ledger.
    pub fn escrow(&self) -> i128 {
        *self.escrow.lock().unwrap()
    }
    /// Makes every transfer from or to `account` fail until called again with `false`.
    pub fn set_rejecting(&self, account: UserPubKey, rejecting: bool) {
        let mut accounts = self.rejecting.lock().unwrap();
        if rejecting {
            accounts.insert(account);
        } else {
            accounts.remove(&account);
        }
    }
    fn check(&self, account: &UserPubKey) -> Result<(), TransferError> {
        if self.rejecting.lock().unwrap().contains(account) {
            return Err(TransferError::Rejected(*account));
        }
        Ok(())
    }
    fn book(&self, account: &UserPubKey, delta: i128) {
        *self.balances.lock().unwrap().entry(*account).or_default() += delta;
        *self.escrow.lock().unwrap() -= delta;
    }
}
#[async_trait]
impl FundingSource for TestFundingSource {
    async fn transfer_in(&self, from: &UserPubKey, amount: Amount) -> Result<(), TransferError> {
        self.check(from)?;
        self.book(from, -i128::from(amount));
        Ok(())
    }
    async fn transfer_out(&self, to: &UserPubKey, amount: Amount) -> Result<(), TransferError> {
        self.check(to)?;
        if self.escrow() < i128::from(amount) {
            return Err(TransferError::Unavailable(format!(
                "escrow holds {} but {} was requested",
                self.escrow(),
                amount
            )));
        }
        self.book(to, i128::from(amount));
        Ok(())
    }
}
