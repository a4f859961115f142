//! Comment operations, as exposed to users.
//!
//! Each operation returns a nested result: the outer one for store failures, the inner
//! one for requests that must be refused. Callers are expected to run each operation in
//! its own store transaction; mutations take the gig lock before reading anything.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use uuid::Uuid;

use crate::{
    cascade, thread, tree, visibility, Comment, CommentId, CommentNode, Db, EditComment, Error,
    GigId, NewComment, NewCommentRecord, UserId,
};

macro_rules! refuse {
    ($e:expr) => {
        return Ok(Err($e))
    };
}

macro_rules! try_refuse {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(e) => refuse!(e),
        }
    };
}

/// Threads of `gig` that `viewer` can see
pub async fn list<D: Db>(
    db: &mut D,
    viewer: UserId,
    gig: GigId,
) -> anyhow::Result<Result<Vec<CommentNode>, Error>> {
    let owner = match db
        .gig_owner(gig)
        .await
        .with_context(|| format!("fetching owner of gig {:?}", gig))?
    {
        Some(owner) => owner,
        None => refuse!(Error::GigNotFound(gig)),
    };
    let comments = db
        .list_comments(gig)
        .await
        .with_context(|| format!("listing comments of gig {:?}", gig))?;
    Ok(Ok(visibility::visible_threads(
        tree::build_forest(comments),
        viewer,
        owner,
    )))
}

/// Comment `comment` of gig `gig`
pub async fn get<D: Db>(
    db: &mut D,
    gig: GigId,
    comment: CommentId,
) -> anyhow::Result<Result<Comment, Error>> {
    match db
        .get_comment(comment)
        .await
        .with_context(|| format!("fetching comment {:?}", comment))?
    {
        Some(c) if c.gig_id == gig => Ok(Ok(c)),
        _ => Ok(Err(Error::CommentNotFound(comment))),
    }
}

/// Posts a new thread, or a reply if `data.parent` is set
pub async fn post<D: Db>(
    db: &mut D,
    author: UserId,
    gig: GigId,
    data: NewComment,
) -> anyhow::Result<Result<Comment, Error>> {
    try_refuse!(data.validate());
    let owner = match db
        .lock_gig(gig)
        .await
        .with_context(|| format!("locking gig {:?}", gig))?
    {
        Some(owner) => owner,
        None => refuse!(Error::GigNotFound(gig)),
    };

    if let Some(parent) = data.parent {
        let comments = db
            .list_comments(gig)
            .await
            .with_context(|| format!("listing comments of gig {:?}", gig))?
            .into_iter()
            .map(|c| (c.id, c))
            .collect::<HashMap<_, _>>();
        if !comments.contains_key(&parent) {
            refuse!(Error::InvalidParent(parent));
        }
        let root = thread::thread_root(&comments, parent)
            .with_context(|| format!("resolving thread root of comment {:?}", parent))?;
        if !thread::may_reply(author, owner, root) {
            refuse!(Error::CannotReplyInThread(parent));
        }
    }

    let id = CommentId(Uuid::new_v4());
    let res = db
        .insert_comment(NewCommentRecord {
            id,
            gig_id: gig,
            author_id: author,
            parent_id: data.parent,
            text: data.text,
            created_at: crate::now(),
        })
        .await
        .with_context(|| format!("inserting comment {:?}", id))?;
    Ok(Ok(res))
}

pub async fn edit<D: Db>(
    db: &mut D,
    actor: UserId,
    gig: GigId,
    comment: CommentId,
    data: EditComment,
) -> anyhow::Result<Result<Comment, Error>> {
    let c = try_refuse!(fetch_for_modification(db, actor, gig, comment).await?);
    try_refuse!(data.validate());
    let res = db
        .update_comment_text(c.id, data.text)
        .await
        .with_context(|| format!("updating text of comment {:?}", c.id))?;
    Ok(Ok(res))
}

/// Deletes `comment` along with all its replies, returning the ids of everything removed
pub async fn delete<D: Db>(
    db: &mut D,
    actor: UserId,
    gig: GigId,
    comment: CommentId,
) -> anyhow::Result<Result<HashSet<CommentId>, Error>> {
    let c = try_refuse!(fetch_for_modification(db, actor, gig, comment).await?);
    let ids = cascade::subtree(db, c.id)
        .await
        .with_context(|| format!("listing the subtree of comment {:?}", c.id))?;
    db.delete_comments(&ids)
        .await
        .with_context(|| format!("deleting the subtree of comment {:?}", c.id))?;
    Ok(Ok(ids))
}

async fn fetch_for_modification<D: Db>(
    db: &mut D,
    actor: UserId,
    gig: GigId,
    comment: CommentId,
) -> anyhow::Result<Result<Comment, Error>> {
    if db
        .lock_gig(gig)
        .await
        .with_context(|| format!("locking gig {:?}", gig))?
        .is_none()
    {
        refuse!(Error::GigNotFound(gig));
    }
    let c = try_refuse!(get(db, gig, comment).await?);
    if !thread::may_modify(actor, &c) {
        refuse!(Error::PermissionDenied);
    }
    Ok(Ok(c))
}
