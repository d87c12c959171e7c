use thiserror::Error;

use stockroom_core::UserId;

use crate::account::Account;

/// The authenticated caller of an operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub is_admin: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("access denied. Admin privileges required.")]
    AdminRequired,

    #[error("not authorized to access this resource")]
    NotOwner,
}

impl Principal {
    pub fn from_account(account: &Account) -> Self {
        Self {
            user_id: account.id,
            is_admin: account.is_admin,
        }
    }

    pub fn require_admin(&self) -> Result<(), AuthzError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AuthzError::AdminRequired)
        }
    }

    /// Owners may read their own records; administrators may read anything.
    pub fn require_owner_or_admin(&self, owner: UserId) -> Result<(), AuthzError> {
        if self.is_admin || self.user_id == owner {
            Ok(())
        } else {
            Err(AuthzError::NotOwner)
        }
    }
}
