//! Who may write where.
//!
//! A thread is a conversation between the gig owner and whoever opened the thread: they
//! are the only ones allowed to reply in it, at any depth. Editing or deleting a comment
//! is reserved to its author, gig ownership grants nothing there.

use std::collections::{HashMap, HashSet};

use anyhow::anyhow;

use crate::{Comment, CommentId, UserId};

/// Walks up the parents of `from` until reaching the root of its thread
pub fn thread_root(
    comments: &HashMap<CommentId, Comment>,
    from: CommentId,
) -> anyhow::Result<&Comment> {
    let mut seen = HashSet::new();
    let mut current = comments
        .get(&from)
        .ok_or_else(|| anyhow!("comment {:?} is not in the comment set", from))?;
    while let Some(parent) = current.parent_id {
        if !seen.insert(current.id) {
            return Err(anyhow!("comment {:?} is part of a parent cycle", current.id));
        }
        current = comments.get(&parent).ok_or_else(|| {
            anyhow!(
                "comment {:?} has parent {:?} that is not in the comment set",
                current.id,
                parent
            )
        })?;
    }
    Ok(current)
}

pub fn may_reply(actor: UserId, gig_owner: UserId, thread_root: &Comment) -> bool {
    actor == gig_owner || actor == thread_root.author.id
}

pub fn may_modify(actor: UserId, comment: &Comment) -> bool {
    actor == comment.author.id
}
