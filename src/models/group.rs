use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{GroupId, GroupPostId, UserId};
use crate::error::{AppError, AppResult};

/// Stored and reported, not enforced: any user may join any group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPrivacy {
    #[default]
    Public,
    Private,
}

impl GroupPrivacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupPrivacy::Public => "public",
            GroupPrivacy::Private => "private",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "public" => Ok(GroupPrivacy::Public),
            "private" => Ok(GroupPrivacy::Private),
            other => Err(AppError::Internal(format!("Unknown group privacy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Admin,
    Member,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Admin => "admin",
            GroupRole::Member => "member",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "admin" => Ok(GroupRole::Admin),
            "member" => Ok(GroupRole::Member),
            other => Err(AppError::Internal(format!("Unknown group role '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub privacy: GroupPrivacy,
    pub creator: UserId,
    pub created_at: DateTime<Utc>,
}

/// Membership edge; the creator holds the only admin row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: GroupId,
    pub user: UserId,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPost {
    pub id: GroupPostId,
    pub group_id: GroupId,
    pub author: UserId,
    pub caption: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_names_parse_back() {
        for privacy in [GroupPrivacy::Public, GroupPrivacy::Private] {
            assert_eq!(GroupPrivacy::parse(privacy.as_str()).unwrap(), privacy);
        }
        for role in [GroupRole::Admin, GroupRole::Member] {
            assert_eq!(GroupRole::parse(role.as_str()).unwrap(), role);
        }
        assert!(GroupRole::parse("owner").is_err());
        assert_eq!(GroupPrivacy::default(), GroupPrivacy::Public);
    }
}
