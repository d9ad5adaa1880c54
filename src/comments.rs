//! Nesting of the two flat comment collections served for a post.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::CommentView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: CommentView,
    pub children: Vec<CommentNode>,
}

/// Nest `replies` under `top_level`, newest first at every level.
///
/// Each level partitions the remaining replies into direct children and the rest; the
/// children recurse against the rest only. O(depth * replies).
pub fn build(top_level: Vec<CommentView>, replies: Vec<CommentView>) -> Vec<CommentNode> {
    build_level(top_level, replies).0
}

/// Builds one level and hands back the replies nobody at or below it claimed.
fn build_level(mut level: Vec<CommentView>, mut remaining: Vec<CommentView>) -> (Vec<CommentNode>, Vec<CommentView>) {
    if level.is_empty() {
        return (Vec::new(), remaining);
    }
    newest_first(&mut level);
    let mut nodes = Vec::with_capacity(level.len());
    for comment in level {
        let (direct, rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|r| r.comment.parent_comment_id == Some(comment.comment.id));
        let (children, unused) = build_level(direct, rest);
        remaining = unused;
        nodes.push(CommentNode { comment, children });
    }
    (nodes, remaining)
}

fn newest_first(level: &mut [CommentView]) {
    level.sort_by(|a, b| {
        b.comment
            .created_at
            .cmp(&a.comment.created_at)
            .then_with(|| b.comment.id.cmp(&a.comment.id))
    });
}
