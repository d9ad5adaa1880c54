use async_trait::async_trait;

use crate::models::*;
use crate::ranking::{FeedQuery, Page};

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("invalid: {0}")] Invalid(String),
    #[error("viewer required")] ViewerRequired,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user_by_name(&self, username: &str) -> RepoResult<User>;
}

#[async_trait]
pub trait CommunityRepo: Send + Sync {
    async fn create_community(&self, new: NewCommunity) -> RepoResult<Community>;
    async fn get_community_by_name(&self, name: &str) -> RepoResult<Community>;
    /// Upserts the (user, community) membership; absent fields keep their value (or `false`).
    async fn set_membership(&self, user_id: Id, community_id: Id, upd: MembershipUpdate) -> RepoResult<Membership>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, author_id: Id, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Removes the post together with its relations and comments.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    async fn set_spoiler(&self, id: Id, spoiler: bool) -> RepoResult<Post>;
    async fn set_nsfw(&self, id: Id, nsfw: bool) -> RepoResult<Post>;
    /// Scope filter, aggregate projection, ordering and pagination in one read.
    async fn fetch_page(&self, query: &FeedQuery) -> RepoResult<Page>;
}

/// Per-(user, post) relation upserts. Each call overrides only the field it owns.
#[async_trait]
pub trait RelationRepo: Send + Sync {
    async fn set_vote(&self, user_id: Id, post_id: Id, vote_status: VoteStatus) -> RepoResult<PostRelation>;
    async fn set_saved(&self, user_id: Id, post_id: Id, saved: bool) -> RepoResult<PostRelation>;
    async fn set_hidden(&self, user_id: Id, post_id: Id, hidden: bool) -> RepoResult<PostRelation>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn create_comment(&self, author_id: Id, new: NewComment) -> RepoResult<Comment>;
    async fn list_comments(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<PostComments>;
    async fn set_comment_vote(&self, user_id: Id, comment_id: Id, vote_status: VoteStatus) -> RepoResult<CommentRelation>;
}

pub trait Repo: UserRepo + CommunityRepo + PostRepo + RelationRepo + CommentRepo {}

impl<T> Repo for T where T: UserRepo + CommunityRepo + PostRepo + RelationRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use crate::aggregates::{comment_count, project_comment, project_post};
    use crate::ranking::{paginate, rank};
    use crate::scope::{ScopeFilter, ScopeTarget};
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use tracing::{debug, warn};

    const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        communities: HashMap<Id, Community>,
        memberships: Vec<Membership>,
        posts: HashMap<Id, Post>,
        relations: Vec<PostRelation>,
        comments: HashMap<Id, Comment>,
        comment_relations: Vec<CommentRelation>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn membership(&self, user_id: Id, community_id: Id) -> Option<&Membership> {
            self.memberships.iter().find(|m| m.user_id == user_id && m.community_id == community_id)
        }

        fn relation(&self, user_id: Id, post_id: Id) -> Option<&PostRelation> {
            self.relations.iter().find(|r| r.user_id == user_id && r.post_id == post_id)
        }

        fn view(&self, post: &Post, viewer: Option<Id>) -> PostView {
            project_post(post, &self.relations, comment_count(self.comments.values(), post.id), viewer)
        }

        /// Lazily creates the relation row, then lets `apply` set the field it owns.
        fn upsert_relation(&mut self, user_id: Id, post_id: Id, apply: impl FnOnce(&mut PostRelation)) -> RepoResult<PostRelation> {
            if !self.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            let idx = match self.relations.iter().position(|r| r.user_id == user_id && r.post_id == post_id) {
                Some(i) => i,
                None => {
                    self.relations.push(PostRelation {
                        user_id,
                        post_id,
                        vote_status: VoteStatus::None,
                        saved: false,
                        hidden: false,
                        updated_at: Utc::now(),
                    });
                    self.relations.len() - 1
                }
            };
            let rel = &mut self.relations[idx];
            apply(&mut *rel);
            rel.updated_at = Utc::now();
            Ok(rel.clone())
        }

        fn resolve_target(&self, target: ScopeTarget<'_>) -> RepoResult<Option<Id>> {
            Ok(match target {
                ScopeTarget::None => None,
                ScopeTarget::Community(name) => Some(
                    self.communities.values().find(|c| c.name == name).map(|c| c.id).ok_or(RepoError::NotFound)?,
                ),
                ScopeTarget::User(name) => Some(
                    self.users.values().find(|u| u.username == name).map(|u| u.id).ok_or(RepoError::NotFound)?,
                ),
            })
        }
    }

    /// Process-local repository. Optionally mirrors its state to a JSON snapshot after each write.
    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Snapshot-backed when `FEED_DATA_DIR` is set, ephemeral otherwise.
        pub fn new() -> Self {
            let dir = std::env::var("FEED_DATA_DIR").ok().map(PathBuf::from);
            Self::in_dir(dir.as_deref())
        }

        pub fn in_dir(data_dir: Option<&Path>) -> Self {
            match data_dir {
                Some(dir) => Self::with_snapshot(dir.join(SNAPSHOT_FILE)),
                None => Self::ephemeral(),
            }
        }

        pub fn ephemeral() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        pub fn with_snapshot(path: PathBuf) -> Self {
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        debug!(path = %path.display(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "unreadable snapshot, starting empty");
                        State::default()
                    }
                },
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "no snapshot, starting empty");
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            let bytes = match self.read() {
                Ok(s) => serde_json::to_vec_pretty(&*s),
                Err(_) => return,
            };
            match bytes {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        if let Err(e) = std::fs::create_dir_all(dir) {
                            warn!(dir = %dir.display(), error = %e, "failed to create snapshot dir");
                        }
                    }
                    if let Err(e) = std::fs::write(path.as_path(), bytes) {
                        warn!(path = %path.display(), error = %e, "failed to write snapshot");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode snapshot"),
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        /// Runs `f` under the write lock and snapshots afterwards if it succeeded.
        fn mutate<T>(&self, f: impl FnOnce(&mut State) -> RepoResult<T>) -> RepoResult<T> {
            let out = {
                let mut s = self.write()?;
                f(&mut *s)?
            };
            self.persist();
            Ok(out)
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            self.mutate(|s| {
                if s.users.values().any(|u| u.username == new.username) {
                    return Err(RepoError::Conflict);
                }
                let id = s.next_id();
                let user = User { id, username: new.username, created_at: Utc::now() };
                s.users.insert(id, user.clone());
                Ok(user)
            })
        }
        async fn get_user_by_name(&self, username: &str) -> RepoResult<User> {
            let s = self.read()?;
            s.users.values().find(|u| u.username == username).cloned().ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl CommunityRepo for InMemRepo {
        async fn create_community(&self, new: NewCommunity) -> RepoResult<Community> {
            self.mutate(|s| {
                if s.communities.values().any(|c| c.name == new.name) {
                    return Err(RepoError::Conflict);
                }
                let id = s.next_id();
                let community = Community { id, name: new.name, created_at: Utc::now() };
                s.communities.insert(id, community.clone());
                Ok(community)
            })
        }
        async fn get_community_by_name(&self, name: &str) -> RepoResult<Community> {
            let s = self.read()?;
            s.communities.values().find(|c| c.name == name).cloned().ok_or(RepoError::NotFound)
        }
        async fn set_membership(&self, user_id: Id, community_id: Id, upd: MembershipUpdate) -> RepoResult<Membership> {
            self.mutate(|s| {
                if !s.communities.contains_key(&community_id) || !s.users.contains_key(&user_id) {
                    return Err(RepoError::NotFound);
                }
                let idx = match s.memberships.iter().position(|m| m.user_id == user_id && m.community_id == community_id) {
                    Some(i) => i,
                    None => {
                        s.memberships.push(Membership {
                            user_id,
                            community_id,
                            joined: false,
                            muted: false,
                            favorited: false,
                            updated_at: Utc::now(),
                        });
                        s.memberships.len() - 1
                    }
                };
                let m = &mut s.memberships[idx];
                if let Some(joined) = upd.joined { m.joined = joined; }
                if let Some(muted) = upd.muted { m.muted = muted; }
                if let Some(favorited) = upd.favorited { m.favorited = favorited; }
                m.updated_at = Utc::now();
                Ok(m.clone())
            })
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, author_id: Id, new: NewPost) -> RepoResult<Post> {
            self.mutate(|s| {
                if !s.communities.contains_key(&new.community_id) {
                    return Err(RepoError::NotFound);
                }
                if !s.membership(author_id, new.community_id).map(|m| m.joined).unwrap_or(false) {
                    return Err(RepoError::Invalid("author is not a member of the community".into()));
                }
                let now = Utc::now();
                let id = s.next_id();
                let post = Post {
                    id,
                    created_at: now,
                    updated_at: now,
                    title: new.title,
                    body: new.body,
                    nsfw: new.nsfw,
                    spoiler: new.spoiler,
                    author_id,
                    community_id: new.community_id,
                };
                s.posts.insert(id, post.clone());
                Ok(post)
            })
        }
        async fn get_post(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView> {
            let s = self.read()?;
            let post = s.posts.get(&id).ok_or(RepoError::NotFound)?;
            Ok(s.view(post, viewer))
        }
        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            self.mutate(|s| {
                let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
                if let Some(title) = upd.title { post.title = title; }
                if let Some(body) = upd.body { post.body = Some(body); }
                post.updated_at = Utc::now();
                Ok(post.clone())
            })
        }
        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            self.mutate(|s| {
                s.posts.remove(&id).ok_or(RepoError::NotFound)?;
                s.relations.retain(|r| r.post_id != id);
                let removed: Vec<Id> = s.comments.values().filter(|c| c.post_id == id).map(|c| c.id).collect();
                s.comments.retain(|_, c| c.post_id != id);
                s.comment_relations.retain(|r| !removed.contains(&r.comment_id));
                Ok(())
            })
        }
        async fn set_spoiler(&self, id: Id, spoiler: bool) -> RepoResult<Post> {
            self.mutate(|s| {
                let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
                post.spoiler = spoiler;
                post.updated_at = Utc::now();
                Ok(post.clone())
            })
        }
        async fn set_nsfw(&self, id: Id, nsfw: bool) -> RepoResult<Post> {
            self.mutate(|s| {
                let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
                post.nsfw = nsfw;
                post.updated_at = Utc::now();
                Ok(post.clone())
            })
        }
        async fn fetch_page(&self, query: &FeedQuery) -> RepoResult<Page> {
            let s = self.read()?;
            let target = s.resolve_target(query.scope.target())?;
            let filter = ScopeFilter::resolve(&query.scope, query.viewer, target)?;
            let viewer = query.viewer;
            let eligible: Vec<PostView> = s
                .posts
                .values()
                .filter(|p| {
                    let membership = viewer.and_then(|v| s.membership(v, p.community_id));
                    let relation = viewer.and_then(|v| s.relation(v, p.id)).map(ViewerRelation::from);
                    filter.admits(p, membership, relation.as_ref())
                })
                .map(|p| s.view(p, viewer))
                .collect();
            Ok(paginate(rank(eligible, query.sort, query.now), query.cursor))
        }
    }

    #[async_trait]
    impl RelationRepo for InMemRepo {
        async fn set_vote(&self, user_id: Id, post_id: Id, vote_status: VoteStatus) -> RepoResult<PostRelation> {
            self.mutate(|s| s.upsert_relation(user_id, post_id, |r| r.vote_status = vote_status))
        }
        async fn set_saved(&self, user_id: Id, post_id: Id, saved: bool) -> RepoResult<PostRelation> {
            self.mutate(|s| s.upsert_relation(user_id, post_id, |r| r.saved = saved))
        }
        async fn set_hidden(&self, user_id: Id, post_id: Id, hidden: bool) -> RepoResult<PostRelation> {
            self.mutate(|s| s.upsert_relation(user_id, post_id, |r| r.hidden = hidden))
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn create_comment(&self, author_id: Id, new: NewComment) -> RepoResult<Comment> {
            self.mutate(|s| {
                if !s.posts.contains_key(&new.post_id) {
                    return Err(RepoError::NotFound);
                }
                if let Some(parent_id) = new.parent_comment_id {
                    match s.comments.get(&parent_id) {
                        Some(parent) if parent.post_id == new.post_id => {}
                        Some(_) => return Err(RepoError::Invalid("parent comment belongs to another post".into())),
                        None => return Err(RepoError::Invalid("parent comment does not exist".into())),
                    }
                }
                let now = Utc::now();
                let id = s.next_id();
                let comment = Comment {
                    id,
                    created_at: now,
                    updated_at: now,
                    text: new.text,
                    author_id,
                    post_id: new.post_id,
                    parent_comment_id: new.parent_comment_id,
                };
                s.comments.insert(id, comment.clone());
                Ok(comment)
            })
        }
        async fn list_comments(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<PostComments> {
            let s = self.read()?;
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            let mut out = PostComments::default();
            let mut on_post: Vec<&Comment> = s.comments.values().filter(|c| c.post_id == post_id).collect();
            on_post.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
            for c in on_post {
                let view = project_comment(c, &s.comment_relations, viewer);
                if c.parent_comment_id.is_none() {
                    out.top_level.push(view);
                } else {
                    out.replies.push(view);
                }
            }
            Ok(out)
        }
        async fn set_comment_vote(&self, user_id: Id, comment_id: Id, vote_status: VoteStatus) -> RepoResult<CommentRelation> {
            self.mutate(|s| {
                if !s.comments.contains_key(&comment_id) {
                    return Err(RepoError::NotFound);
                }
                let now = Utc::now();
                match s.comment_relations.iter_mut().find(|r| r.user_id == user_id && r.comment_id == comment_id) {
                    Some(r) => {
                        r.vote_status = vote_status;
                        r.updated_at = now;
                        Ok(r.clone())
                    }
                    None => {
                        let r = CommentRelation { user_id, comment_id, vote_status, updated_at: now };
                        s.comment_relations.push(r.clone());
                        Ok(r)
                    }
                }
            })
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::aggregates::sql::{push_post_view_select, CommentViewRow, PostViewRow, COMMENT_VIEW_SELECT};
    use crate::ranking::PAGE_SIZE;
    use crate::scope::{ScopeFilter, ScopeTarget};
    use sqlx::{Pool, Postgres, QueryBuilder};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
            sqlx::migrate!("./migrations").run(&self.pool).await
        }

        async fn resolve_target(&self, target: ScopeTarget<'_>) -> RepoResult<Option<Id>> {
            let id = match target {
                ScopeTarget::None => return Ok(None),
                ScopeTarget::Community(name) => sqlx::query_scalar::<_, Id>("SELECT id FROM communities WHERE name = $1")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?,
                ScopeTarget::User(name) => sqlx::query_scalar::<_, Id>("SELECT id FROM users WHERE username = $1")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(internal)?,
            };
            id.map(Some).ok_or(RepoError::NotFound)
        }
    }

    const POST_COLUMNS: &str = "id, created_at, updated_at, title, body, nsfw, spoiler, author_id, community_id";
    const RELATION_COLUMNS: &str = "user_id, post_id, vote_status, saved, hidden, updated_at";

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    /// Row-less results and foreign-key violations both mean the referenced row is missing.
    fn not_found_or_internal(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::NotFound,
            _ => internal(e),
        }
    }

    fn conflict_or_internal(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            _ => internal(e),
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>("INSERT INTO users (username) VALUES ($1) RETURNING id, username, created_at")
                .bind(&new.username)
                .fetch_one(&self.pool).await.map_err(conflict_or_internal)
        }
        async fn get_user_by_name(&self, username: &str) -> RepoResult<User> {
            sqlx::query_as::<_, User>("SELECT id, username, created_at FROM users WHERE username = $1")
                .bind(username)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
    }

    #[async_trait]
    impl CommunityRepo for PgRepo {
        async fn create_community(&self, new: NewCommunity) -> RepoResult<Community> {
            sqlx::query_as::<_, Community>("INSERT INTO communities (name) VALUES ($1) RETURNING id, name, created_at")
                .bind(&new.name)
                .fetch_one(&self.pool).await.map_err(conflict_or_internal)
        }
        async fn get_community_by_name(&self, name: &str) -> RepoResult<Community> {
            sqlx::query_as::<_, Community>("SELECT id, name, created_at FROM communities WHERE name = $1")
                .bind(name)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
        async fn set_membership(&self, user_id: Id, community_id: Id, upd: MembershipUpdate) -> RepoResult<Membership> {
            sqlx::query_as::<_, Membership>(r#"
                INSERT INTO memberships (user_id, community_id, joined, muted, favorited)
                VALUES ($1, $2, COALESCE($3, FALSE), COALESCE($4, FALSE), COALESCE($5, FALSE))
                ON CONFLICT (user_id, community_id) DO UPDATE SET
                    joined = COALESCE($3, memberships.joined),
                    muted = COALESCE($4, memberships.muted),
                    favorited = COALESCE($5, memberships.favorited),
                    updated_at = now()
                RETURNING user_id, community_id, joined, muted, favorited, updated_at
            "#)
                .bind(user_id)
                .bind(community_id)
                .bind(upd.joined)
                .bind(upd.muted)
                .bind(upd.favorited)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, author_id: Id, new: NewPost) -> RepoResult<Post> {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM communities WHERE id = $1)")
                .bind(new.community_id)
                .fetch_one(&self.pool).await.map_err(internal)?;
            if !exists {
                return Err(RepoError::NotFound);
            }
            let member = sqlx::query_scalar::<_, bool>("SELECT joined FROM memberships WHERE user_id = $1 AND community_id = $2")
                .bind(author_id)
                .bind(new.community_id)
                .fetch_optional(&self.pool).await.map_err(internal)?
                .unwrap_or(false);
            if !member {
                return Err(RepoError::Invalid("author is not a member of the community".into()));
            }
            sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (title, body, nsfw, spoiler, author_id, community_id) VALUES ($1,$2,$3,$4,$5,$6) RETURNING {POST_COLUMNS}"
            ))
                .bind(&new.title)
                .bind(&new.body)
                .bind(new.nsfw)
                .bind(new.spoiler)
                .bind(author_id)
                .bind(new.community_id)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
        async fn get_post(&self, id: Id, viewer: Option<Id>) -> RepoResult<PostView> {
            let mut qb = QueryBuilder::<Postgres>::new("");
            push_post_view_select(&mut qb, viewer);
            qb.push(" WHERE pv.id = ");
            qb.push_bind(id);
            let row = qb.build_query_as::<PostViewRow>()
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)?;
            Ok(row.into())
        }
        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET title = COALESCE($2, title), body = COALESCE($3, body), updated_at = now() WHERE id = $1 RETURNING {POST_COLUMNS}"
            ))
                .bind(id)
                .bind(upd.title.as_ref())
                .bind(upd.body.as_ref())
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            // relations and comments go with it via ON DELETE CASCADE
            let res = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(internal)?;
            if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
        async fn set_spoiler(&self, id: Id, spoiler: bool) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("UPDATE posts SET spoiler = $2, updated_at = now() WHERE id = $1 RETURNING {POST_COLUMNS}"))
                .bind(id)
                .bind(spoiler)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
        async fn set_nsfw(&self, id: Id, nsfw: bool) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("UPDATE posts SET nsfw = $2, updated_at = now() WHERE id = $1 RETURNING {POST_COLUMNS}"))
                .bind(id)
                .bind(nsfw)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
        async fn fetch_page(&self, query: &FeedQuery) -> RepoResult<Page> {
            let target = self.resolve_target(query.scope.target()).await?;
            let filter = ScopeFilter::resolve(&query.scope, query.viewer, target)?;

            let mut qb = QueryBuilder::<Postgres>::new("");
            push_post_view_select(&mut qb, query.viewer);
            qb.push(" WHERE TRUE");
            filter.push_sql(&mut qb);
            if let Some(start) = query.sort.window_start(query.now) {
                qb.push(" AND pv.created_at >= ");
                qb.push_bind(start);
            }
            qb.push(query.sort.order_by_sql());
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(query.cursor).unwrap_or(i64::MAX));
            qb.push(" LIMIT ");
            qb.push_bind(PAGE_SIZE as i64);

            let rows = qb.build_query_as::<PostViewRow>()
                .fetch_all(&self.pool).await.map_err(internal)?;
            Ok(Page::from_rows(rows.into_iter().map(PostView::from).collect(), query.cursor))
        }
    }

    #[async_trait]
    impl RelationRepo for PgRepo {
        async fn set_vote(&self, user_id: Id, post_id: Id, vote_status: VoteStatus) -> RepoResult<PostRelation> {
            sqlx::query_as::<_, PostRelation>(&format!(
                "INSERT INTO post_relations (user_id, post_id, vote_status) VALUES ($1,$2,$3)
                 ON CONFLICT (user_id, post_id) DO UPDATE SET vote_status = EXCLUDED.vote_status, updated_at = now()
                 RETURNING {RELATION_COLUMNS}"
            ))
                .bind(user_id)
                .bind(post_id)
                .bind(vote_status)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
        async fn set_saved(&self, user_id: Id, post_id: Id, saved: bool) -> RepoResult<PostRelation> {
            sqlx::query_as::<_, PostRelation>(&format!(
                "INSERT INTO post_relations (user_id, post_id, saved) VALUES ($1,$2,$3)
                 ON CONFLICT (user_id, post_id) DO UPDATE SET saved = EXCLUDED.saved, updated_at = now()
                 RETURNING {RELATION_COLUMNS}"
            ))
                .bind(user_id)
                .bind(post_id)
                .bind(saved)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
        async fn set_hidden(&self, user_id: Id, post_id: Id, hidden: bool) -> RepoResult<PostRelation> {
            sqlx::query_as::<_, PostRelation>(&format!(
                "INSERT INTO post_relations (user_id, post_id, hidden) VALUES ($1,$2,$3)
                 ON CONFLICT (user_id, post_id) DO UPDATE SET hidden = EXCLUDED.hidden, updated_at = now()
                 RETURNING {RELATION_COLUMNS}"
            ))
                .bind(user_id)
                .bind(post_id)
                .bind(hidden)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn create_comment(&self, author_id: Id, new: NewComment) -> RepoResult<Comment> {
            if let Some(parent_id) = new.parent_comment_id {
                let parent_post = sqlx::query_scalar::<_, Id>("SELECT post_id FROM comments WHERE id = $1")
                    .bind(parent_id)
                    .fetch_optional(&self.pool).await.map_err(internal)?;
                match parent_post {
                    Some(p) if p == new.post_id => {}
                    Some(_) => return Err(RepoError::Invalid("parent comment belongs to another post".into())),
                    None => return Err(RepoError::Invalid("parent comment does not exist".into())),
                }
            }
            sqlx::query_as::<_, Comment>(r#"
                INSERT INTO comments (text, author_id, post_id, parent_comment_id) VALUES ($1,$2,$3,$4)
                RETURNING id, created_at, updated_at, text, author_id, post_id, parent_comment_id
            "#)
                .bind(&new.text)
                .bind(author_id)
                .bind(new.post_id)
                .bind(new.parent_comment_id)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
        async fn list_comments(&self, post_id: Id, viewer: Option<Id>) -> RepoResult<PostComments> {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1)")
                .bind(post_id)
                .fetch_one(&self.pool).await.map_err(internal)?;
            if !exists { return Err(RepoError::NotFound); }
            let rows = sqlx::query_as::<_, CommentViewRow>(COMMENT_VIEW_SELECT)
                .bind(post_id)
                .bind(viewer)
                .fetch_all(&self.pool).await.map_err(internal)?;
            let (top_level, replies): (Vec<CommentView>, Vec<CommentView>) = rows
                .into_iter()
                .map(CommentView::from)
                .partition(|c| c.comment.parent_comment_id.is_none());
            Ok(PostComments { top_level, replies })
        }
        async fn set_comment_vote(&self, user_id: Id, comment_id: Id, vote_status: VoteStatus) -> RepoResult<CommentRelation> {
            sqlx::query_as::<_, CommentRelation>(r#"
                INSERT INTO comment_relations (user_id, comment_id, vote_status) VALUES ($1,$2,$3)
                ON CONFLICT (user_id, comment_id) DO UPDATE SET vote_status = EXCLUDED.vote_status, updated_at = now()
                RETURNING user_id, comment_id, vote_status, updated_at
            "#)
                .bind(user_id)
                .bind(comment_id)
                .bind(vote_status)
                .fetch_one(&self.pool).await.map_err(not_found_or_internal)
        }
    }
}
