use crate::core::UserId;

/// The already-authenticated user on whose behalf an operation runs.
/// Resolved by the identity collaborator before the engine is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerContext {
    pub user_id: UserId,
}

impl ViewerContext {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        ViewerContext {
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}
