use std::collections::HashSet;

use async_trait::async_trait;

use crate::{Comment, CommentId, GigId, NewCommentRecord, UserId};

/// Storage of flat comment rows, plus the little the comment code needs to know about gigs
#[async_trait]
pub trait Db: Send {
    /// Owner of `gig`, or None if there is no such gig
    async fn gig_owner(&mut self, gig: GigId) -> anyhow::Result<Option<UserId>>;

    /// Same as `gig_owner`, but also keeps other writers off `gig` until the current
    /// transaction ends
    async fn lock_gig(&mut self, gig: GigId) -> anyhow::Result<Option<UserId>> {
        self.gig_owner(gig).await
    }

    /// All comments of `gig`, oldest first, comments posted at the same instant ordered by id
    async fn list_comments(&mut self, gig: GigId) -> anyhow::Result<Vec<Comment>>;

    async fn get_comment(&mut self, comment: CommentId) -> anyhow::Result<Option<Comment>>;

    async fn children_of(&mut self, comment: CommentId) -> anyhow::Result<Vec<CommentId>>;

    async fn insert_comment(&mut self, comment: NewCommentRecord) -> anyhow::Result<Comment>;

    async fn update_comment_text(
        &mut self,
        comment: CommentId,
        text: String,
    ) -> anyhow::Result<Comment>;

    /// Removes all of `comments` at once
    async fn delete_comments(&mut self, comments: &HashSet<CommentId>) -> anyhow::Result<()>;
}
