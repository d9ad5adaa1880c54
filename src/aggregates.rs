//! Derived per-post and per-comment fields.
//!
//! Vote and comment tallies are recomputed from the relation and comment rows on every read;
//! nothing here is cached or written back.

use crate::models::*;

/// Upvotes minus downvotes across every user's relation on `post_id`.
pub fn vote_count<'a, I>(relations: I, post_id: Id) -> i64
where
    I: IntoIterator<Item = &'a PostRelation>,
{
    relations
        .into_iter()
        .filter(|r| r.post_id == post_id)
        .map(|r| r.vote_status.weight())
        .sum()
}

/// Comments on `post_id` at every depth.
pub fn comment_count<'a, I>(comments: I, post_id: Id) -> i64
where
    I: IntoIterator<Item = &'a Comment>,
{
    comments.into_iter().filter(|c| c.post_id == post_id).count() as i64
}

/// Attach the derived fields to `post`. `relations` may hold rows for any post and user;
/// only the ones matching the post (and, for the viewer slice, the viewer) are consulted.
pub fn project_post(post: &Post, relations: &[PostRelation], comment_count: i64, viewer: Option<Id>) -> PostView {
    let viewer_relation = viewer.and_then(|v| {
        relations
            .iter()
            .find(|r| r.post_id == post.id && r.user_id == v)
            .map(ViewerRelation::from)
    });
    PostView {
        post: post.clone(),
        vote_count: vote_count(relations, post.id),
        comment_count,
        viewer: viewer_relation,
    }
}

pub fn project_comment(comment: &Comment, relations: &[CommentRelation], viewer: Option<Id>) -> CommentView {
    let mut vote_count = 0;
    let mut vote_status = VoteStatus::None;
    for r in relations.iter().filter(|r| r.comment_id == comment.id) {
        vote_count += r.vote_status.weight();
        if Some(r.user_id) == viewer {
            vote_status = r.vote_status;
        }
    }
    CommentView { comment: comment.clone(), vote_count, vote_status }
}

#[cfg(feature = "postgres-store")]
pub(crate) mod sql {
    use sqlx::{Postgres, QueryBuilder};

    use crate::models::*;

    /// Opens `SELECT * FROM (<projected posts>) pv`. Callers append `WHERE`/`ORDER BY` clauses
    /// that reference `pv.*`.
    pub fn push_post_view_select(qb: &mut QueryBuilder<'_, Postgres>, viewer: Option<Id>) {
        qb.push(
            r#"SELECT * FROM (
                SELECT p.id, p.created_at, p.updated_at, p.title, p.body, p.nsfw, p.spoiler,
                       p.author_id, p.community_id,
                       ((SELECT COUNT(*) FROM post_relations r WHERE r.post_id = p.id AND r.vote_status = 'upvoted')
                      - (SELECT COUNT(*) FROM post_relations r WHERE r.post_id = p.id AND r.vote_status = 'downvoted')) AS vote_count,
                       (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
                       vr.vote_status AS viewer_vote_status,
                       vr.saved AS viewer_saved,
                       vr.hidden AS viewer_hidden,
                       vr.updated_at AS viewer_updated_at
                FROM posts p
                LEFT JOIN post_relations vr ON vr.post_id = p.id AND vr.user_id = "#,
        );
        qb.push_bind(viewer);
        qb.push(") pv");
    }

    /// Flat row shape produced by [`push_post_view_select`].
    #[derive(sqlx::FromRow)]
    pub struct PostViewRow {
        pub id: Id,
        pub created_at: chrono::DateTime<chrono::Utc>,
        pub updated_at: chrono::DateTime<chrono::Utc>,
        pub title: String,
        pub body: Option<String>,
        pub nsfw: bool,
        pub spoiler: bool,
        pub author_id: Id,
        pub community_id: Id,
        pub vote_count: i64,
        pub comment_count: i64,
        pub viewer_vote_status: Option<VoteStatus>,
        pub viewer_saved: Option<bool>,
        pub viewer_hidden: Option<bool>,
        pub viewer_updated_at: Option<chrono::DateTime<chrono::Utc>>,
    }

    impl From<PostViewRow> for PostView {
        fn from(row: PostViewRow) -> Self {
            // viewer_updated_at is NOT NULL in the table, so it marks whether the join matched.
            let viewer = row.viewer_updated_at.map(|updated_at| ViewerRelation {
                vote_status: row.viewer_vote_status.unwrap_or_default(),
                saved: row.viewer_saved.unwrap_or(false),
                hidden: row.viewer_hidden.unwrap_or(false),
                updated_at,
            });
            PostView {
                post: Post {
                    id: row.id,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                    title: row.title,
                    body: row.body,
                    nsfw: row.nsfw,
                    spoiler: row.spoiler,
                    author_id: row.author_id,
                    community_id: row.community_id,
                },
                vote_count: row.vote_count,
                comment_count: row.comment_count,
                viewer,
            }
        }
    }

    pub const COMMENT_VIEW_SELECT: &str = r#"
        SELECT c.id, c.created_at, c.updated_at, c.text, c.author_id, c.post_id, c.parent_comment_id,
               COALESCE((SELECT SUM(CASE r.vote_status WHEN 'upvoted' THEN 1 WHEN 'downvoted' THEN -1 ELSE 0 END)
                         FROM comment_relations r WHERE r.comment_id = c.id), 0)::BIGINT AS vote_count,
               vr.vote_status AS viewer_vote_status
        FROM comments c
        LEFT JOIN comment_relations vr ON vr.comment_id = c.id AND vr.user_id = $2
        WHERE c.post_id = $1
        ORDER BY c.created_at DESC, c.id DESC
    "#;

    #[derive(sqlx::FromRow)]
    pub struct CommentViewRow {
        pub id: Id,
        pub created_at: chrono::DateTime<chrono::Utc>,
        pub updated_at: chrono::DateTime<chrono::Utc>,
        pub text: String,
        pub author_id: Id,
        pub post_id: Id,
        pub parent_comment_id: Option<Id>,
        pub vote_count: i64,
        pub viewer_vote_status: Option<VoteStatus>,
    }

    impl From<CommentViewRow> for CommentView {
        fn from(row: CommentViewRow) -> Self {
            CommentView {
                comment: Comment {
                    id: row.id,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                    text: row.text,
                    author_id: row.author_id,
                    post_id: row.post_id,
                    parent_comment_id: row.parent_comment_id,
                },
                vote_count: row.vote_count,
                vote_status: row.viewer_vote_status.unwrap_or_default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(id: Id) -> Post {
        let now = Utc::now();
        Post { id, created_at: now, updated_at: now, title: format!("p{id}"), body: None, nsfw: false, spoiler: false, author_id: 1, community_id: 1 }
    }

    fn rel(user_id: Id, post_id: Id, vote_status: VoteStatus) -> PostRelation {
        PostRelation { user_id, post_id, vote_status, saved: false, hidden: false, updated_at: Utc::now() }
    }

    #[test]
    fn vote_count_is_upvotes_minus_downvotes_for_that_post_only() {
        let rels = vec![
            rel(1, 10, VoteStatus::Upvoted),
            rel(2, 10, VoteStatus::Upvoted),
            rel(3, 10, VoteStatus::Downvoted),
            rel(4, 10, VoteStatus::None),
            rel(1, 11, VoteStatus::Downvoted),
        ];
        assert_eq!(vote_count(&rels, 10), 1);
        assert_eq!(vote_count(&rels, 11), -1);
        assert_eq!(vote_count(&rels, 12), 0);
    }

    #[test]
    fn viewer_slice_defaults_when_absent_or_anonymous() {
        let mut saved = rel(2, 10, VoteStatus::Downvoted);
        saved.saved = true;
        let rels = vec![rel(1, 10, VoteStatus::Upvoted), saved];

        let anon = project_post(&post(10), &rels, 3, None);
        assert_eq!(anon.vote_count, 0);
        assert_eq!(anon.comment_count, 3);
        assert!(anon.viewer.is_none());
        assert_eq!(anon.vote_status(), VoteStatus::None);
        assert!(!anon.saved() && !anon.hidden());

        let stranger = project_post(&post(10), &rels, 3, Some(99));
        assert!(stranger.viewer.is_none());

        let mine = project_post(&post(10), &rels, 3, Some(2));
        assert_eq!(mine.vote_status(), VoteStatus::Downvoted);
        assert!(mine.saved());
    }

    #[test]
    fn comment_projection_counts_all_users_and_reports_viewer_vote() {
        let now = Utc::now();
        let c = Comment { id: 5, created_at: now, updated_at: now, text: "hi".into(), author_id: 1, post_id: 10, parent_comment_id: None };
        let rels = vec![
            CommentRelation { user_id: 1, comment_id: 5, vote_status: VoteStatus::Upvoted, updated_at: now },
            CommentRelation { user_id: 2, comment_id: 5, vote_status: VoteStatus::Upvoted, updated_at: now },
            CommentRelation { user_id: 2, comment_id: 6, vote_status: VoteStatus::Downvoted, updated_at: now },
        ];
        let v = project_comment(&c, &rels, Some(2));
        assert_eq!(v.vote_count, 2);
        assert_eq!(v.vote_status, VoteStatus::Upvoted);
        assert_eq!(project_comment(&c, &rels, None).vote_status, VoteStatus::None);
    }
}
