use crate::api::{Role, UserPubKey};
use crate::error::LedgerError;
use log::debug;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Privilege checks the ledger relies on. The ledger never changes who holds a role.
pub trait AccessControl {
    fn is_authorized(&self, identity: &UserPubKey) -> bool;
    fn is_owner(&self, identity: &UserPubKey) -> bool;
}

/// One immutable owner plus a set of admins only the owner can change.
/// The owner counts as authorized as well.
#[derive(Debug)]
pub struct AdminList {
    owner: UserPubKey,
    admins: RwLock<HashSet<UserPubKey>>,
}
impl AdminList {
    pub fn new(owner: UserPubKey, admins: impl IntoIterator<Item = UserPubKey>) -> Self {
        Self {
            owner,
            admins: RwLock::new(admins.into_iter().collect()),
        }
    }
    pub fn add_admin(&self, caller: &UserPubKey, admin: UserPubKey) -> Result<(), LedgerError> {
        if !self.is_owner(caller) {
            return Err(LedgerError::Unauthorized);
        }
        if self
            .admins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(admin)
        {
            debug!("Added admin {}", admin);
        }
        Ok(())
    }
    pub fn remove_admin(&self, caller: &UserPubKey, admin: &UserPubKey) -> Result<(), LedgerError> {
        if !self.is_owner(caller) {
            return Err(LedgerError::Unauthorized);
        }
        if self
            .admins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(admin)
        {
            debug!("Removed admin {}", admin);
        }
        Ok(())
    }
    fn is_admin(&self, identity: &UserPubKey) -> bool {
        self.admins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identity)
    }
    pub fn role(&self, identity: &UserPubKey) -> Role {
        if self.is_owner(identity) {
            Role::Owner
        } else if self.is_admin(identity) {
            Role::Admin
        } else {
            Role::Participant
        }
    }
}
impl AccessControl for AdminList {
    fn is_authorized(&self, identity: &UserPubKey) -> bool {
        self.is_owner(identity) || self.is_admin(identity)
    }
    fn is_owner(&self, identity: &UserPubKey) -> bool {
        self.owner == *identity
    }
}
