//! Rebuilding comment threads from the flat rows the store holds.
//!
//! Comments only know their parent. Building the forest is done in memory from the whole
//! set of a gig's comments, so that reading a gig costs a single store round-trip however
//! deep its threads go.

use std::collections::HashMap;

use crate::{Comment, CommentId, CommentNode};

/// Links `comments` into a forest of threads.
///
/// Roots and siblings at every depth are ordered by creation date, then by id for equal
/// dates. Comments whose parent is not part of `comments` cannot be reached from
/// any root, and are left out.
pub fn build_forest(mut comments: Vec<Comment>) -> Vec<CommentNode> {
    comments.sort_by_key(|c| (c.created_at, c.id));

    let index = comments
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id, i))
        .collect::<HashMap<CommentId, usize>>();
    let mut children = vec![Vec::new(); comments.len()];
    let mut roots = Vec::new();
    for (i, c) in comments.iter().enumerate() {
        match c.parent_id {
            None => roots.push(i),
            Some(parent) => {
                if let Some(&p) = index.get(&parent) {
                    children[p].push(i);
                }
            }
        }
    }

    // Post-order, so that a node's children are all built by the time it is
    let mut order = Vec::with_capacity(comments.len());
    let mut stack = roots.iter().rev().map(|&i| (i, false)).collect::<Vec<_>>();
    while let Some((i, expanded)) = stack.pop() {
        if expanded {
            order.push(i);
        } else {
            stack.push((i, true));
            stack.extend(children[i].iter().map(|&c| (c, false)));
        }
    }

    let mut pending = comments.into_iter().map(Some).collect::<Vec<_>>();
    let mut built = (0..pending.len()).map(|_| None).collect::<Vec<_>>();
    for i in order {
        let kids = children[i]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        if let Some(comment) = pending[i].take() {
            built[i] = Some(CommentNode {
                comment,
                children: kids,
            });
        }
    }
    roots.into_iter().filter_map(|i| built[i].take()).collect()
}
