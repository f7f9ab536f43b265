// Ownership predicates shared by every caller that mutates user content

use crate::core::UserId;
use crate::models::{Comment, Post};

/// A comment may be removed by whoever wrote it or by the author of the post
/// it sits under. `post_author` is None when the post no longer exists.
pub fn can_delete_comment(actor: &UserId, comment: &Comment, post_author: Option<&UserId>) -> bool {
    &comment.author == actor || post_author == Some(actor)
}

/// Posts are edited and deleted by their author only
pub fn can_modify_post(actor: &UserId, post: &Post) -> bool {
    &post.author == actor
}
