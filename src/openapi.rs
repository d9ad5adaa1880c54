use crate::comments::CommentNode;
use crate::models::{
    Comment, CommentRelation, CommentView, DeletedPost, HideRequest, Membership, MembershipUpdate, NewComment,
    NewPost, NsfwFlag, Post, PostComments, PostRelation, PostView, SaveRequest, SpoilerFlag, UpdatePost,
    ViewerRelation, VoteRequest, VoteStatus,
};
use crate::ranking::{Page, SortKey};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::feed_all,
        crate::routes::feed_home,
        crate::routes::community_feed,
        crate::routes::user_feed,
        crate::routes::set_membership,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::vote_post,
        crate::routes::save_post,
        crate::routes::hide_post,
        crate::routes::set_spoiler,
        crate::routes::set_nsfw,
        crate::routes::get_comments,
        crate::routes::create_comment,
        crate::routes::vote_comment,
    ),
    components(schemas(
        Post, NewPost, UpdatePost, PostView, ViewerRelation, PostRelation, VoteStatus,
        Page, SortKey, Membership, MembershipUpdate,
        Comment, NewComment, CommentView, CommentRelation, PostComments, CommentNode,
        VoteRequest, SaveRequest, HideRequest, SpoilerFlag, NsfwFlag, DeletedPost
    )),
    tags(
        (name = "feeds", description = "Ranked, paginated post feeds"),
        (name = "posts", description = "Post mutations and per-viewer relations"),
        (name = "comments", description = "Comment listing and voting"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_feed_and_mutation_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/api/v1/feed", "/api/v1/u/{username}/{tab}", "/api/v1/posts/{id}/hide", "/api/v1/comments"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemas = doc.components.expect("components").schemas;
        assert!(schemas.contains_key("Page"));
        assert!(schemas.contains_key("CommentNode"));
    }
}
