//! Sort orders, the Hot window and offset pagination.
//!
//! Every ordering ends with `created_at ASC, id ASC` so that it is total: equal scores keep a
//! stable order across requests and consecutive pages never share a post.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Id, PostView};
use crate::scope::Scope;

pub const PAGE_SIZE: usize = 10;
/// Hot only considers posts created within this many days of the request.
pub const HOT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Best,
    Hot,
    New,
    /// Ordered by comment volume, not by any measure of vote disagreement.
    Controversial,
}

#[derive(thiserror::Error, Debug)]
#[error("unknown sort key: {0}")]
pub struct UnknownSort(pub String);

impl FromStr for SortKey {
    type Err = UnknownSort;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "best" => Ok(SortKey::Best),
            "hot" => Ok(SortKey::Hot),
            "new" => Ok(SortKey::New),
            "controversial" => Ok(SortKey::Controversial),
            _ => Err(UnknownSort(s.to_string())),
        }
    }
}

impl SortKey {
    /// Missing or unrecognised keys fall back to Best so stale links keep working.
    pub fn parse_lenient(raw: Option<&str>) -> SortKey {
        raw.and_then(|s| s.parse().ok()).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Best => "best",
            SortKey::Hot => "hot",
            SortKey::New => "new",
            SortKey::Controversial => "controversial",
        }
    }

    /// Earliest `created_at` eligible under this sort, if the sort is windowed.
    pub fn window_start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            SortKey::Hot => Some(now - Duration::days(HOT_WINDOW_DAYS)),
            _ => None,
        }
    }

    pub fn compare(self, a: &PostView, b: &PostView) -> Ordering {
        let oldest_first = || {
            a.post.created_at.cmp(&b.post.created_at).then_with(|| a.post.id.cmp(&b.post.id))
        };
        match self {
            SortKey::Best | SortKey::Hot => b.vote_count.cmp(&a.vote_count).then_with(oldest_first),
            SortKey::New => b.post.created_at.cmp(&a.post.created_at).then_with(|| a.post.id.cmp(&b.post.id)),
            SortKey::Controversial => b.comment_count.cmp(&a.comment_count).then_with(oldest_first),
        }
    }

    /// `ORDER BY` clause equivalent to [`SortKey::compare`] over the `pv` projection.
    pub fn order_by_sql(self) -> &'static str {
        match self {
            SortKey::Best | SortKey::Hot => " ORDER BY pv.vote_count DESC, pv.created_at ASC, pv.id ASC",
            SortKey::New => " ORDER BY pv.created_at DESC, pv.id ASC",
            SortKey::Controversial => " ORDER BY pv.comment_count DESC, pv.created_at ASC, pv.id ASC",
        }
    }
}

/// One `fetch_page` request.
#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub scope: Scope,
    pub sort: SortKey,
    pub cursor: u64,
    pub viewer: Option<Id>,
    /// Instant the Hot window is measured from.
    pub now: DateTime<Utc>,
}

impl FeedQuery {
    pub fn new(scope: Scope, sort: SortKey) -> Self {
        Self { scope, sort, cursor: 0, viewer: None, now: Utc::now() }
    }

    pub fn cursor(mut self, cursor: Option<u64>) -> Self {
        self.cursor = cursor.unwrap_or(0);
        self
    }

    pub fn viewer(mut self, viewer: Option<Id>) -> Self {
        self.viewer = viewer;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Page {
    pub posts: Vec<PostView>,
    /// Offset of the following page; `None` once a short page marks the end of the feed.
    pub next_cursor: Option<u64>,
}

impl Page {
    pub fn from_rows(posts: Vec<PostView>, cursor: u64) -> Self {
        let next_cursor = next_cursor(cursor, posts.len());
        Self { posts, next_cursor }
    }
}

/// A full page implies more may follow; anything shorter ends the feed.
pub fn next_cursor(cursor: u64, returned: usize) -> Option<u64> {
    (returned == PAGE_SIZE).then(|| cursor + PAGE_SIZE as u64)
}

/// Drop posts outside the sort's window and order the rest.
pub fn rank(mut posts: Vec<PostView>, sort: SortKey, now: DateTime<Utc>) -> Vec<PostView> {
    if let Some(start) = sort.window_start(now) {
        posts.retain(|p| p.post.created_at >= start);
    }
    posts.sort_by(|a, b| sort.compare(a, b));
    posts
}

/// `OFFSET cursor LIMIT PAGE_SIZE` over an already ranked sequence.
pub fn paginate(ranked: Vec<PostView>, cursor: u64) -> Page {
    let rows: Vec<PostView> = ranked
        .into_iter()
        .skip(usize::try_from(cursor).unwrap_or(usize::MAX))
        .take(PAGE_SIZE)
        .collect();
    Page::from_rows(rows, cursor)
}
