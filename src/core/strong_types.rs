// Strong Types - newtype identifiers for every record the engine touches
// Keeps user keys, post ids and conversation ids from being mixed up at call sites

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity key issued by the external identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random key, for fixtures and sample data
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Declares an i64-backed record id with the usual conversions
macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

record_id!(PostId);
record_id!(CommentId);
record_id!(
    /// Identifier of a directed friend request row
    FriendRequestId
);
record_id!(NotificationId);
record_id!(ConversationId);
record_id!(MessageId);
record_id!(GroupId);
record_id!(GroupPostId);

/// Offset/limit window over an ordered listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(offset: u32, limit: u32) -> Self {
        Self { offset, limit }
    }

    pub fn first(limit: u32) -> Self {
        Self { offset: 0, limit }
    }

    /// Clamp the limit to the configured maximum page size
    pub fn clamped(self, max_limit: u32) -> Self {
        Self {
            offset: self.offset,
            limit: self.limit.min(max_limit),
        }
    }

    /// The window that follows this one
    pub fn next(self) -> Self {
        Self {
            offset: self.offset.saturating_add(self.limit),
            limit: self.limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { offset: 0, limit: 50 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_conversions() {
        let id = PostId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    }

    #[test]
    fn test_user_id_is_opaque() {
        let id = UserId::from("auth0|abc");
        assert_eq!(id.as_str(), "auth0|abc");
        assert_ne!(UserId::generate(), UserId::generate());
    }

    #[test]
    fn test_page_clamp_and_next() {
        let page = Page::new(10, 500).clamped(100);
        assert_eq!(page, Page::new(10, 100));
        assert_eq!(page.next(), Page::new(110, 100));
    }
}
