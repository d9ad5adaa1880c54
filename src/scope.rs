//! Feed scopes and the eligibility predicates they produce.

use serde::{Deserialize, Serialize};

use crate::models::{Id, Membership, Post, ViewerRelation};
use crate::repo::{RepoError, RepoResult};

/// What a client asks for: the scope tag plus its parameter, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Scope {
    All,
    Home,
    Community(String),
    /// A user's profile overview: posts they authored.
    User(String),
    Saved(String),
    Hidden(String),
    Upvoted(String),
    Downvoted(String),
}

/// Named entity a scope refers to, which the repository must resolve to an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTarget<'a> {
    None,
    Community(&'a str),
    User(&'a str),
}

impl Scope {
    /// Profile sub-feed by its path segment (`saved`, `hidden`, `upvoted`, `downvoted`).
    pub fn user_filter(username: &str, filter: &str) -> Option<Scope> {
        let name = username.to_string();
        match filter {
            "saved" => Some(Scope::Saved(name)),
            "hidden" => Some(Scope::Hidden(name)),
            "upvoted" => Some(Scope::Upvoted(name)),
            "downvoted" => Some(Scope::Downvoted(name)),
            _ => None,
        }
    }

    pub fn target(&self) -> ScopeTarget<'_> {
        match self {
            Scope::All | Scope::Home => ScopeTarget::None,
            Scope::Community(name) => ScopeTarget::Community(name),
            Scope::User(name) | Scope::Saved(name) | Scope::Hidden(name) | Scope::Upvoted(name) | Scope::Downvoted(name) => {
                ScopeTarget::User(name)
            }
        }
    }

    /// Scopes whose predicate is relative to the viewer and so cannot be served anonymously.
    pub fn requires_viewer(&self) -> bool {
        matches!(self, Scope::Home | Scope::Saved(_) | Scope::Hidden(_) | Scope::Upvoted(_) | Scope::Downvoted(_))
    }

    /// Profile owner for the relation scopes; only that user may request them.
    pub fn owner(&self) -> Option<&str> {
        match self {
            Scope::Saved(name) | Scope::Hidden(name) | Scope::Upvoted(name) | Scope::Downvoted(name) => Some(name),
            _ => None,
        }
    }

    /// Lists the user curates through their own relations. Hiding a post while viewing one of
    /// these keeps it on screen.
    pub fn is_curated(&self) -> bool {
        self.owner().is_some()
    }

    /// HTTP path serving this scope, relative to the API root.
    pub fn path(&self) -> String {
        match self {
            Scope::All => "/api/v1/feed".to_string(),
            Scope::Home => "/api/v1/feed/home".to_string(),
            Scope::Community(name) => format!("/api/v1/c/{name}/posts"),
            Scope::User(name) => format!("/api/v1/u/{name}/posts"),
            Scope::Saved(name) => format!("/api/v1/u/{name}/saved"),
            Scope::Hidden(name) => format!("/api/v1/u/{name}/hidden"),
            Scope::Upvoted(name) => format!("/api/v1/u/{name}/upvoted"),
            Scope::Downvoted(name) => format!("/api/v1/u/{name}/downvoted"),
        }
    }
}

/// A resolved scope: ids instead of names, with the viewer bound where the predicate needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeFilter {
    All,
    Home { viewer: Id },
    Community(Id),
    Author(Id),
    Saved { viewer: Id },
    Hidden { viewer: Id },
    Upvoted { viewer: Id },
    Downvoted { viewer: Id },
}

impl ScopeFilter {
    /// `target` is the id the repository resolved for [`Scope::target`]; it must be present for
    /// community and user scopes.
    pub fn resolve(scope: &Scope, viewer: Option<Id>, target: Option<Id>) -> RepoResult<Self> {
        let need_viewer = || viewer.ok_or(RepoError::ViewerRequired);
        let need_target = || target.ok_or(RepoError::NotFound);
        Ok(match scope {
            Scope::All => ScopeFilter::All,
            Scope::Home => ScopeFilter::Home { viewer: need_viewer()? },
            Scope::Community(_) => ScopeFilter::Community(need_target()?),
            Scope::User(_) => ScopeFilter::Author(need_target()?),
            Scope::Saved(_) => {
                need_target()?;
                ScopeFilter::Saved { viewer: need_viewer()? }
            }
            Scope::Hidden(_) => {
                need_target()?;
                ScopeFilter::Hidden { viewer: need_viewer()? }
            }
            Scope::Upvoted(_) => {
                need_target()?;
                ScopeFilter::Upvoted { viewer: need_viewer()? }
            }
            Scope::Downvoted(_) => {
                need_target()?;
                ScopeFilter::Downvoted { viewer: need_viewer()? }
            }
        })
    }

    /// Eligibility of `post`. `membership` and `relation` are the viewer's rows for the post's
    /// community and for the post itself.
    pub fn admits(&self, post: &Post, membership: Option<&Membership>, relation: Option<&ViewerRelation>) -> bool {
        use crate::models::VoteStatus;
        match *self {
            ScopeFilter::All => true,
            ScopeFilter::Home { .. } => {
                let member = membership.map(|m| m.community_id == post.community_id && m.joined && !m.muted).unwrap_or(false);
                member && !relation.map(|r| r.hidden).unwrap_or(false)
            }
            ScopeFilter::Community(id) => post.community_id == id,
            ScopeFilter::Author(id) => post.author_id == id,
            ScopeFilter::Saved { .. } => relation.map(|r| r.saved).unwrap_or(false),
            ScopeFilter::Hidden { .. } => relation.map(|r| r.hidden).unwrap_or(false),
            ScopeFilter::Upvoted { .. } => relation.map(|r| r.vote_status == VoteStatus::Upvoted).unwrap_or(false),
            ScopeFilter::Downvoted { .. } => relation.map(|r| r.vote_status == VoteStatus::Downvoted).unwrap_or(false),
        }
    }

    /// Appends ` AND <predicate>` over the `pv` projection. The viewer relation columns in `pv`
    /// are already joined for the viewer, so relation scopes only test them.
    #[cfg(feature = "postgres-store")]
    pub(crate) fn push_sql(&self, qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>) {
        match *self {
            ScopeFilter::All => {}
            ScopeFilter::Home { viewer } => {
                qb.push(" AND EXISTS (SELECT 1 FROM memberships m WHERE m.community_id = pv.community_id AND m.user_id = ");
                qb.push_bind(viewer);
                qb.push(" AND m.joined AND NOT m.muted) AND pv.viewer_hidden IS NOT TRUE");
            }
            ScopeFilter::Community(id) => {
                qb.push(" AND pv.community_id = ");
                qb.push_bind(id);
            }
            ScopeFilter::Author(id) => {
                qb.push(" AND pv.author_id = ");
                qb.push_bind(id);
            }
            ScopeFilter::Saved { .. } => {
                qb.push(" AND pv.viewer_saved IS TRUE");
            }
            ScopeFilter::Hidden { .. } => {
                qb.push(" AND pv.viewer_hidden IS TRUE");
            }
            ScopeFilter::Upvoted { .. } => {
                qb.push(" AND pv.viewer_vote_status = 'upvoted'");
            }
            ScopeFilter::Downvoted { .. } => {
                qb.push(" AND pv.viewer_vote_status = 'downvoted'");
            }
        }
    }
}
