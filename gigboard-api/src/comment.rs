use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CommentId, Error, GigId, Time, User, UserId};

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub gig_id: GigId,
    pub author: User,

    /// None for thread roots
    pub parent_id: Option<CommentId>,

    pub text: String,
    pub created_at: Time,
}

/// A comment along with all its replies, in creation order
///
/// Threads have no depth limit, so nothing here may recurse on the native stack: dropping
/// and comparing walk the tree with explicit stacks, and (de)serialization grows the
/// stack on demand.
pub struct CommentNode {
    pub comment: Comment,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    /// Whether `user` wrote this comment or any of its transitive replies
    pub fn authored_by(&self, user: UserId) -> bool {
        let mut todo = vec![self];
        while let Some(n) = todo.pop() {
            if n.comment.author.id == user {
                return true;
            }
            todo.extend(n.children.iter());
        }
        false
    }

    /// Pre-order listing of this subtree, along with the depth of each comment
    /// (this node being at depth 0)
    pub fn flatten(&self) -> Vec<(usize, &Comment)> {
        let mut res = Vec::new();
        let mut todo = vec![(0, self)];
        while let Some((depth, n)) = todo.pop() {
            res.push((depth, &n.comment));
            todo.extend(n.children.iter().rev().map(|c| (depth + 1, c)));
        }
        res
    }
}

impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut todo = std::mem::take(&mut self.children);
        while let Some(mut n) = todo.pop() {
            todo.append(&mut n.children);
        }
    }
}

// The pre-order listing with depths determines the shape of the tree
impl PartialEq for CommentNode {
    fn eq(&self, other: &CommentNode) -> bool {
        self.flatten() == other.flatten()
    }
}

impl Eq for CommentNode {}

impl fmt::Debug for CommentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.flatten()).finish()
    }
}

/// Space left on the stack under which (de)serializing a node switches to a new segment
const STACK_RED_ZONE: usize = 64 * 1024;

/// Size of the stack segments allocated for (de)serializing deep threads
const STACK_SEGMENT_SIZE: usize = 2 * 1024 * 1024;

/// Json rendering of a node: the comment's fields, plus its replies
#[derive(serde::Serialize)]
struct NodeRef<'a> {
    id: CommentId,
    gig_id: GigId,
    author: &'a User,
    parent_id: Option<CommentId>,
    text: &'a str,
    created_at: Time,
    children: &'a [CommentNode],
}

// Fields are spelled out instead of flattening `Comment`, as serde buffers flattened
// structs whole before deserializing them, which would recurse through the subtree
#[derive(serde::Deserialize)]
struct NodeData {
    id: CommentId,
    gig_id: GigId,
    author: User,
    parent_id: Option<CommentId>,
    text: String,
    created_at: Time,
    children: Vec<CommentNode>,
}

impl serde::Serialize for CommentNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT_SIZE, || {
            let c = &self.comment;
            NodeRef {
                id: c.id,
                gig_id: c.gig_id,
                author: &c.author,
                parent_id: c.parent_id,
                text: &c.text,
                created_at: c.created_at,
                children: &self.children,
            }
            .serialize(serializer)
        })
    }
}

impl<'de> serde::Deserialize<'de> for CommentNode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT_SIZE, || {
            let n = NodeData::deserialize(deserializer)?;
            Ok(CommentNode {
                comment: Comment {
                    id: n.id,
                    gig_id: n.gig_id,
                    author: n.author,
                    parent_id: n.parent_id,
                    text: n.text,
                    created_at: n.created_at,
                },
                children: n.children,
            })
        })
    }
}

pub fn validate_comment_text(text: &str) -> Result<(), Error> {
    crate::validate_string(text)?;
    if text.trim().is_empty() {
        return Err(Error::EmptyCommentText);
    }
    Ok(())
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub text: String,

    #[serde(default)]
    pub parent: Option<CommentId>,
}

impl NewComment {
    pub fn validate(&self) -> Result<(), Error> {
        validate_comment_text(&self.text)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EditComment {
    pub text: String,
}

impl EditComment {
    pub fn validate(&self) -> Result<(), Error> {
        validate_comment_text(&self.text)
    }
}

/// Row handed to the store for insertion; the store fills in the author's name
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCommentRecord {
    pub id: CommentId,
    pub gig_id: GigId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub text: String,
    pub created_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentDeleted {
    pub message: String,
}

impl CommentDeleted {
    pub fn new() -> CommentDeleted {
        CommentDeleted {
            message: String::from("Comment deleted"),
        }
    }
}
