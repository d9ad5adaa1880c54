//! Optimistic feed mutations on top of [`FeedCache`].
//!
//! Each mutation patches the active entry before the request goes out. When the request fails,
//! only the touched post is put back and then reconciled against a fresh copy of its page, so
//! concurrent edits on other posts are never rolled back with it.

use std::future::Future;

use chrono::Utc;
use tracing::{debug, warn};

use crate::cache::{FeedCache, FeedKey, FeedStatus, FetchOutcome, PostSlot};
use crate::client::{ClientError, FeedApi};
use crate::comments::{self, CommentNode};
use crate::models::*;
use crate::ranking::{Page, SortKey, PAGE_SIZE};
use crate::scope::Scope;

pub struct FeedCoordinator<A> {
    cache: FeedCache,
    api: A,
}

impl<A: FeedApi> FeedCoordinator<A> {
    pub fn new(api: A) -> Self {
        Self::with_cache(FeedCache::new(), api)
    }

    pub fn with_cache(cache: FeedCache, api: A) -> Self {
        Self { cache, api }
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Pages of the active entry, in order.
    pub fn pages(&self) -> Vec<Page> {
        self.cache.active().map(|k| self.cache.pages(&k)).unwrap_or_default()
    }

    pub fn status(&self) -> Option<FeedStatus> {
        self.cache.active().and_then(|k| self.cache.status(&k))
    }

    /// Switch to `(scope, sort)`. Cached pages are shown as-is; an entry seen for the first
    /// time loads its first page.
    pub async fn open(&self, scope: Scope, sort: SortKey) -> Result<FeedStatus, ClientError> {
        let key = FeedKey::new(scope, sort);
        self.cache.activate(key.clone());
        if self.cache.pages(&key).is_empty() {
            return self.load_more().await;
        }
        Ok(self.cache.status(&key).unwrap_or(FeedStatus::Loading))
    }

    /// Fetch the next page of the active entry. A response that arrives after the user moved
    /// to another feed is dropped.
    pub async fn load_more(&self) -> Result<FeedStatus, ClientError> {
        let Some(ticket) = self.cache.begin_fetch() else {
            return Ok(self.status().unwrap_or(FeedStatus::Loading));
        };
        let result = self.api.fetch_page(&ticket.key.scope, ticket.key.sort, Some(ticket.cursor)).await;
        if self.cache.complete_fetch(&ticket, &result) == FetchOutcome::Stale {
            debug!(cursor = ticket.cursor, "discarded stale page");
        }
        result?;
        Ok(self.cache.status(&ticket.key).unwrap_or(FeedStatus::Loading))
    }

    pub async fn vote(&self, post_id: Id, vote_status: VoteStatus) -> Result<PostRelation, ClientError> {
        self.optimistic(
            post_id,
            |v| {
                let before = v.vote_status();
                relation_mut(v).vote_status = vote_status;
                v.vote_count += vote_status.weight() - before.weight();
            },
            false,
            || self.api.vote(post_id, vote_status),
        )
        .await
    }

    pub async fn save(&self, post_id: Id, saved: bool) -> Result<PostRelation, ClientError> {
        self.optimistic(post_id, |v| relation_mut(v).saved = saved, false, || self.api.save(post_id, saved))
            .await
    }

    /// Hiding from a general feed takes the post off screen; inside the viewer's own curated
    /// lists it stays where it is.
    pub async fn hide(&self, post_id: Id, hidden: bool) -> Result<PostRelation, ClientError> {
        let remove = hidden && self.cache.active().is_some_and(|k| !k.scope.is_curated());
        self.optimistic(post_id, |v| relation_mut(v).hidden = hidden, remove, || self.api.hide(post_id, hidden))
            .await
    }

    pub async fn set_spoiler(&self, post_id: Id, spoiler: bool) -> Result<SpoilerFlag, ClientError> {
        self.optimistic(post_id, |v| v.post.spoiler = spoiler, false, || self.api.set_spoiler(post_id, spoiler))
            .await
    }

    pub async fn set_nsfw(&self, post_id: Id, nsfw: bool) -> Result<NsfwFlag, ClientError> {
        self.optimistic(post_id, |v| v.post.nsfw = nsfw, false, || self.api.set_nsfw(post_id, nsfw))
            .await
    }

    /// Remove the post everywhere in the active entry. If the server refuses, every page of the
    /// entry is fetched again.
    pub async fn delete(&self, post_id: Id) -> Result<DeletedPost, ClientError> {
        let key = self.cache.active();
        let present = match &key {
            Some(k) => self.cache.remove_post_from_pages(k, post_id) > 0,
            None => false,
        };
        match self.api.delete_post(post_id).await {
            Ok(deleted) => Ok(deleted),
            Err(e) => {
                warn!(post_id, error = %e, "delete failed, refetching feed");
                if let (Some(k), true) = (key, present) {
                    self.refetch_entry(&k).await;
                }
                Err(e)
            }
        }
    }

    /// Fetch both comment collections of a post and nest them.
    pub async fn comment_tree(&self, post_id: Id) -> Result<Vec<CommentNode>, ClientError> {
        load_comment_tree(&self.api, post_id).await
    }

    async fn optimistic<T, Fut>(
        &self,
        post_id: Id,
        patch: impl Fn(&mut PostView),
        remove: bool,
        call: impl FnOnce() -> Fut,
    ) -> Result<T, ClientError>
    where
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let key = self.cache.active();
        let prior = key.as_ref().and_then(|k| self.cache.locate(k, post_id));
        if let Some(k) = &key {
            self.cache.patch_post_in_all_pages(k, post_id, &patch);
            if remove {
                self.cache.remove_post_from_pages(k, post_id);
            }
        }
        match call().await {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!(post_id, error = %e, "optimistic update rejected, rolling back");
                if let (Some(k), Some(slot)) = (key, prior) {
                    self.roll_back(&k, slot).await;
                }
                Err(e)
            }
        }
    }

    async fn roll_back(&self, key: &FeedKey, slot: PostSlot) {
        self.cache.restore_post(key, &slot);
        match self.api.fetch_page(&key.scope, key.sort, Some(slot.page_cursor())).await {
            Ok(fresh) => self.cache.reconcile_post(key, slot.page, &fresh, slot.post.id()),
            Err(e) => warn!(error = %e, "refetch after rollback failed, keeping prior value"),
        }
    }

    async fn refetch_entry(&self, key: &FeedKey) {
        let count = self.cache.pages(key).len();
        let mut fresh = Vec::with_capacity(count);
        for i in 0..count {
            match self.api.fetch_page(&key.scope, key.sort, Some((i * PAGE_SIZE) as u64)).await {
                Ok(page) => {
                    let last = page.next_cursor.is_none();
                    fresh.push(page);
                    if last {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "refetch failed, keeping cached pages");
                    return;
                }
            }
        }
        self.cache.replace_pages(key, fresh);
    }
}

/// The viewer relation on `v`, synthesized with every flag off when absent.
fn relation_mut(v: &mut PostView) -> &mut ViewerRelation {
    v.viewer.get_or_insert_with(|| ViewerRelation {
        vote_status: VoteStatus::None,
        saved: false,
        hidden: false,
        updated_at: Utc::now(),
    })
}

pub async fn load_comment_tree<A: FeedApi + ?Sized>(api: &A, post_id: Id) -> Result<Vec<CommentNode>, ClientError> {
    let PostComments { top_level, replies } = api.get_comments(post_id).await?;
    Ok(comments::build(top_level, replies))
}
