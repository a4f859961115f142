use crate::{CommentNode, UserId};

/// Threads of a gig's forest that `viewer` may read.
///
/// The gig owner reads everything. Anyone else only reads the threads they took part in,
/// but then reads them whole, replies of other participants included.
pub fn visible_threads(
    forest: Vec<CommentNode>,
    viewer: UserId,
    gig_owner: UserId,
) -> Vec<CommentNode> {
    if viewer == gig_owner {
        return forest;
    }
    forest
        .into_iter()
        .filter(|thread| thread.authored_by(viewer))
        .collect()
}
