use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::{
    Comment, CommentId, Db, Gig, GigId, NewCommentRecord, NewGig, Time, User, UserId,
};

/// In-memory store, for the mock server and for tests
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemDb {
    users: HashMap<UserId, User>,
    gigs: HashMap<GigId, Gig>,

    /// In insertion order
    comments: Vec<Comment>,
}

impl MemDb {
    pub fn new() -> MemDb {
        MemDb::default()
    }

    /// Store holding `comments`, and knowing their authors
    pub fn from_comments(comments: Vec<Comment>) -> MemDb {
        MemDb {
            users: comments
                .iter()
                .map(|c| (c.author.id, c.author.clone()))
                .collect(),
            gigs: HashMap::new(),
            comments,
        }
    }

    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn user(&self, user: UserId) -> Option<&User> {
        self.users.get(&user)
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn gig(&self, gig: GigId) -> Option<&Gig> {
        self.gigs.get(&gig)
    }

    /// All gigs, most recent first
    pub fn gigs(&self) -> Vec<Gig> {
        let mut res = self.gigs.values().cloned().collect::<Vec<_>>();
        res.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        res
    }

    pub fn insert_gig(&mut self, gig: Gig) {
        self.gigs.insert(gig.id, gig);
    }

    pub fn update_gig(&mut self, gig: GigId, data: NewGig, now: Time) -> Option<Gig> {
        let g = self.gigs.get_mut(&gig)?;
        g.title = data.title;
        g.text = data.text;
        g.category = data.category;
        g.updated_at = now;
        Some(g.clone())
    }

    /// Removes `gig` along with all its comments
    pub fn remove_gig(&mut self, gig: GigId) -> Option<Gig> {
        let res = self.gigs.remove(&gig)?;
        self.comments.retain(|c| c.gig_id != gig);
        Some(res)
    }
}

#[async_trait]
impl Db for MemDb {
    async fn gig_owner(&mut self, gig: GigId) -> anyhow::Result<Option<UserId>> {
        Ok(self.gigs.get(&gig).map(|g| g.owner.id))
    }

    async fn list_comments(&mut self, gig: GigId) -> anyhow::Result<Vec<Comment>> {
        let mut res = self
            .comments
            .iter()
            .filter(|c| c.gig_id == gig)
            .cloned()
            .collect::<Vec<_>>();
        res.sort_by_key(|c| (c.created_at, c.id));
        Ok(res)
    }

    async fn get_comment(&mut self, comment: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(self.comments.iter().find(|c| c.id == comment).cloned())
    }

    async fn children_of(&mut self, comment: CommentId) -> anyhow::Result<Vec<CommentId>> {
        Ok(self
            .comments
            .iter()
            .filter(|c| c.parent_id == Some(comment))
            .map(|c| c.id)
            .collect())
    }

    async fn insert_comment(&mut self, c: NewCommentRecord) -> anyhow::Result<Comment> {
        anyhow::ensure!(
            self.comments.iter().all(|o| o.id != c.id),
            "comment id {:?} is already taken",
            c.id
        );
        let author = self
            .users
            .get(&c.author_id)
            .ok_or_else(|| {
                anyhow!("author {:?} of comment {:?} does not exist", c.author_id, c.id)
            })?
            .clone();
        let res = Comment {
            id: c.id,
            gig_id: c.gig_id,
            author,
            parent_id: c.parent_id,
            text: c.text,
            created_at: c.created_at,
        };
        self.comments.push(res.clone());
        Ok(res)
    }

    async fn update_comment_text(
        &mut self,
        comment: CommentId,
        text: String,
    ) -> anyhow::Result<Comment> {
        let c = self
            .comments
            .iter_mut()
            .find(|c| c.id == comment)
            .ok_or_else(|| anyhow!("updating text of missing comment {:?}", comment))?;
        c.text = text;
        Ok(c.clone())
    }

    async fn delete_comments(&mut self, comments: &HashSet<CommentId>) -> anyhow::Result<()> {
        self.comments.retain(|c| !comments.contains(&c.id));
        Ok(())
    }
}
