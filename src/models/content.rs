use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: UserId,
    pub caption: Option<String>,
    /// Reference to media held by the upload collaborator
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn has_content(&self) -> bool {
        self.caption.is_some() || self.image.is_some()
    }
}

/// Partial update of a post. Only fields that are present are touched;
/// a present but blank value clears the field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl PostPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.caption.is_none() && self.image.is_none()
    }

    /// Apply the present fields to `post`, rejecting a result with no content
    pub fn apply_to(&self, post: &Post) -> AppResult<Post> {
        let mut updated = post.clone();
        if let Some(caption) = &self.caption {
            updated.caption = normalize(caption);
        }
        if let Some(image) = &self.image {
            updated.image = normalize(image);
        }
        if !updated.has_content() {
            return Err(AppError::Validation(format!(
                "Post {} would have neither caption nor image",
                post.id
            )));
        }
        Ok(updated)
    }
}

/// Normalize the fields of a new post; one of them must carry content
pub fn new_post_fields(
    caption: Option<&str>,
    image: Option<&str>,
) -> AppResult<(Option<String>, Option<String>)> {
    let caption = caption.and_then(normalize);
    let image = image.and_then(normalize);
    if caption.is_none() && image.is_none() {
        return Err(AppError::Validation(
            "A post needs a caption or an image".to_string(),
        ));
    }
    Ok((caption, image))
}

/// A post as seen by a particular viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPost {
    #[serde(flatten)]
    pub post: Post,
    pub likes_count: u64,
    pub is_liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeOutcome {
    Liked,
    Unliked,
}

/// Result of a like toggle: the state that resulted and the new set size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeToggle {
    pub outcome: LikeOutcome,
    pub likes_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        Post {
            id: PostId::new(7),
            author: UserId::from("alice"),
            caption: Some("hello".to_string()),
            image: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let post = sample_post();
        let updated = PostPatch::new().image("cdn/1.png").apply_to(&post).unwrap();
        assert_eq!(updated.caption.as_deref(), Some("hello"));
        assert_eq!(updated.image.as_deref(), Some("cdn/1.png"));
        assert_eq!(updated.id, post.id);
        assert_eq!(updated.created_at, post.created_at);
    }

    #[test]
    fn test_patch_cannot_empty_a_post() {
        let post = sample_post();
        let err = PostPatch::new().caption("   ").apply_to(&post).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_new_post_requires_content() {
        assert!(new_post_fields(Some(" "), None).is_err());
        let (caption, image) = new_post_fields(Some(" hi "), None).unwrap();
        assert_eq!(caption.as_deref(), Some("hi"));
        assert!(image.is_none());
    }
}
