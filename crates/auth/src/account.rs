use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::UserId;

/// A customer or administrator account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn customer(
        id: UserId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            is_admin: false,
            created_at: Utc::now(),
        }
    }

    pub fn admin(id: UserId, email: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::customer(id, "Store", "Admin", email)
        }
    }
}
