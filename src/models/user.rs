use serde::{Deserialize, Serialize};

use crate::core::UserId;

/// Mirror of an identity-provider user, as returned by relationship listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    /// None when the user never registered a mirror row
    pub username: Option<String>,
}
