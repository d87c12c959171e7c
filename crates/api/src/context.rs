use stockroom_auth::{Account, Principal};
use stockroom_core::UserId;

/// Authenticated caller of a request, resolved from the bearer token and
/// the account store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
    email: String,
}

impl PrincipalContext {
    pub fn new(account: &Account) -> Self {
        Self {
            principal: Principal::from_account(account),
            email: account.email.clone(),
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.principal.is_admin
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}
