use std::collections::{HashSet, VecDeque};

use anyhow::Context;

use crate::{CommentId, Db};

/// `root` and all its transitive replies
pub async fn subtree<D: Db>(db: &mut D, root: CommentId) -> anyhow::Result<HashSet<CommentId>> {
    let mut res = HashSet::from([root]);
    let mut todo = VecDeque::from([root]);
    while let Some(c) = todo.pop_front() {
        let children = db
            .children_of(c)
            .await
            .with_context(|| format!("listing replies to comment {:?}", c))?;
        for child in children {
            // a corrupted parent chain could loop back
            if res.insert(child) {
                todo.push_back(child);
            }
        }
    }
    Ok(res)
}
