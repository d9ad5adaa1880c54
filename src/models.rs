use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// A viewer's vote on a post or comment. `None` is also what a missing relation row means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "vote_status", rename_all = "lowercase")]
pub enum VoteStatus {
    Upvoted,
    Downvoted,
    #[default]
    None,
}

impl VoteStatus {
    /// Contribution of one relation row to the vote tally.
    pub fn weight(self) -> i64 {
        match self {
            VoteStatus::Upvoted => 1,
            VoteStatus::Downvoted => -1,
            VoteStatus::None => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Community {
    pub id: Id,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCommunity {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Membership {
    pub user_id: Id,
    pub community_id: Id,
    pub joined: bool,
    pub muted: bool,
    pub favorited: bool,
    pub updated_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MembershipUpdate {
    pub joined: Option<bool>,
    pub muted: Option<bool>,
    pub favorited: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub body: Option<String>,
    pub nsfw: bool,
    pub spoiler: bool,
    pub author_id: Id,
    pub community_id: Id,
}
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub community_id: Id,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub spoiler: bool,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// Stored (user, post) relation. At most one row exists per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostRelation {
    pub user_id: Id,
    pub post_id: Id,
    pub vote_status: VoteStatus,
    pub saved: bool,
    pub hidden: bool,
    pub updated_at: DateTime<Utc>,
}

/// The requesting viewer's slice of a [`PostRelation`], attached to a [`PostView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ViewerRelation {
    pub vote_status: VoteStatus,
    pub saved: bool,
    pub hidden: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&PostRelation> for ViewerRelation {
    fn from(r: &PostRelation) -> Self {
        Self { vote_status: r.vote_status, saved: r.saved, hidden: r.hidden, updated_at: r.updated_at }
    }
}

/// A post plus the fields derived at query time. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub vote_count: i64,
    pub comment_count: i64,
    pub viewer: Option<ViewerRelation>,
}

impl PostView {
    pub fn id(&self) -> Id { self.post.id }
    pub fn vote_status(&self) -> VoteStatus { self.viewer.as_ref().map(|r| r.vote_status).unwrap_or_default() }
    pub fn saved(&self) -> bool { self.viewer.as_ref().map(|r| r.saved).unwrap_or(false) }
    pub fn hidden(&self) -> bool { self.viewer.as_ref().map(|r| r.hidden).unwrap_or(false) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub text: String,
    pub author_id: Id,
    pub post_id: Id,
    pub parent_comment_id: Option<Id>, // None => top-level
}
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub post_id: Id,
    pub parent_comment_id: Option<Id>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CommentRelation {
    pub user_id: Id,
    pub comment_id: Id,
    pub vote_status: VoteStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub vote_count: i64,
    pub vote_status: VoteStatus,
}

/// Both flat comment collections for one post, as served by `get_comments`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostComments {
    pub top_level: Vec<CommentView>,
    pub replies: Vec<CommentView>,
}

// Request / response bodies shared by the HTTP routes and the client.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoteRequest {
    pub vote_status: VoteStatus,
}
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SaveRequest {
    pub saved: bool,
}
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HideRequest {
    pub hidden: bool,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SpoilerFlag {
    pub spoiler: bool,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NsfwFlag {
    pub nsfw: bool,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeletedPost {
    pub id: Id,
}
