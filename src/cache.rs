//! Client-side store of paginated feed results.
//!
//! Every (scope, sort) pair the user has opened keeps its own ordered pages. Exactly one key is
//! active at a time; switching keys bumps an epoch so that a fetch started for an earlier
//! activation can never land in the entry the user is looking at now.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{Id, PostView};
use crate::ranking::{Page, SortKey, PAGE_SIZE};
use crate::scope::Scope;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub scope: Scope,
    pub sort: SortKey,
}

impl FeedKey {
    pub fn new(scope: Scope, sort: SortKey) -> Self {
        Self { scope, sort }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// First page requested, nothing to show yet.
    Loading,
    /// The first page failed and there is nothing cached.
    Failed,
    /// Loaded, no posts.
    Empty,
    Ready,
}

#[derive(Debug, Clone, Default)]
pub struct FeedEntry {
    pub pages: Vec<Page>,
    loading: bool,
    failed: bool,
}

impl FeedEntry {
    pub fn status(&self) -> FeedStatus {
        if self.pages.is_empty() {
            return if self.failed && !self.loading { FeedStatus::Failed } else { FeedStatus::Loading };
        }
        if self.posts().next().is_none() {
            FeedStatus::Empty
        } else {
            FeedStatus::Ready
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn posts(&self) -> impl Iterator<Item = &PostView> {
        self.pages.iter().flat_map(|p| p.posts.iter())
    }

    /// Offset of the next page to request, `None` once the feed is exhausted.
    pub fn next_cursor(&self) -> Option<u64> {
        match self.pages.last() {
            None => Some(0),
            Some(last) => last.next_cursor,
        }
    }
}

/// Proof that a fetch was started for a specific activation at a specific offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub key: FeedKey,
    pub cursor: u64,
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// The activation moved on, or the page would not land at its offset. Nothing changed.
    Stale,
}

/// Where a post sat before an optimistic mutation touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSlot {
    pub page: usize,
    pub index: usize,
    pub post: PostView,
}

impl PostSlot {
    /// Offset the containing page was fetched with.
    pub fn page_cursor(&self) -> u64 {
        (self.page * PAGE_SIZE) as u64
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<FeedKey, FeedEntry>,
    active: Option<FeedKey>,
    epoch: u64,
}

/// Cheap to clone; all clones share one store.
#[derive(Debug, Clone, Default)]
pub struct FeedCache {
    inner: Arc<RwLock<CacheState>>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations are single in-place edits, so a poisoned lock still guards consistent state.
    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `key` the active entry, creating it when first seen. Pages already cached for it
    /// are kept; any fetch still in flight for an earlier activation becomes stale.
    pub fn activate(&self, key: FeedKey) {
        let mut s = self.write();
        s.epoch += 1;
        let entry = s.entries.entry(key.clone()).or_default();
        entry.loading = false;
        s.active = Some(key);
        tracing::debug!(epoch = s.epoch, "activated feed entry");
    }

    pub fn active(&self) -> Option<FeedKey> {
        self.read().active.clone()
    }

    pub fn entry(&self, key: &FeedKey) -> Option<FeedEntry> {
        self.read().entries.get(key).cloned()
    }

    pub fn pages(&self, key: &FeedKey) -> Vec<Page> {
        self.read().entries.get(key).map(|e| e.pages.clone()).unwrap_or_default()
    }

    pub fn status(&self, key: &FeedKey) -> Option<FeedStatus> {
        self.read().entries.get(key).map(FeedEntry::status)
    }

    /// Reserve the next page of the active entry. `None` when nothing is active, the feed is
    /// exhausted, or a page is already being fetched.
    pub fn begin_fetch(&self) -> Option<FetchTicket> {
        let mut s = self.write();
        let epoch = s.epoch;
        let key = s.active.clone()?;
        let entry = s.entries.get_mut(&key)?;
        if entry.loading {
            return None;
        }
        let cursor = entry.next_cursor()?;
        entry.loading = true;
        entry.failed = false;
        Some(FetchTicket { key, cursor, epoch })
    }

    /// Land a fetched page, or record its failure, if the ticket still matches.
    pub fn complete_fetch<E>(&self, ticket: &FetchTicket, result: &Result<Page, E>) -> FetchOutcome {
        let mut s = self.write();
        if s.epoch != ticket.epoch || s.active.as_ref() != Some(&ticket.key) {
            return FetchOutcome::Stale;
        }
        let Some(entry) = s.entries.get_mut(&ticket.key) else {
            return FetchOutcome::Stale;
        };
        let expected = (entry.pages.len() * PAGE_SIZE) as u64;
        if ticket.cursor != expected {
            entry.loading = false;
            return FetchOutcome::Stale;
        }
        entry.loading = false;
        match result {
            Ok(page) => entry.pages.push(page.clone()),
            Err(_) => entry.failed = true,
        }
        FetchOutcome::Applied
    }

    /// First occurrence of `post_id` in the entry.
    pub fn locate(&self, key: &FeedKey, post_id: Id) -> Option<PostSlot> {
        let s = self.read();
        let entry = s.entries.get(key)?;
        entry.pages.iter().enumerate().find_map(|(page, p)| {
            p.posts
                .iter()
                .position(|v| v.id() == post_id)
                .map(|index| PostSlot { page, index, post: p.posts[index].clone() })
        })
    }

    /// Apply `patch` to every copy of the post across the entry's pages. Returns how many
    /// copies were patched.
    pub fn patch_post_in_all_pages(&self, key: &FeedKey, post_id: Id, mut patch: impl FnMut(&mut PostView)) -> usize {
        let mut s = self.write();
        let Some(entry) = s.entries.get_mut(key) else { return 0 };
        let mut patched = 0;
        for view in entry.pages.iter_mut().flat_map(|p| p.posts.iter_mut()) {
            if view.id() == post_id {
                patch(view);
                patched += 1;
            }
        }
        patched
    }

    pub fn remove_post_from_pages(&self, key: &FeedKey, post_id: Id) -> usize {
        let mut s = self.write();
        let Some(entry) = s.entries.get_mut(key) else { return 0 };
        let mut removed = 0;
        for page in entry.pages.iter_mut() {
            let before = page.posts.len();
            page.posts.retain(|v| v.id() != post_id);
            removed += before - page.posts.len();
        }
        removed
    }

    /// Put a post back to its pre-mutation value: overwrite it where it still is, or
    /// re-insert it at its old slot if an optimistic step removed it.
    pub fn restore_post(&self, key: &FeedKey, slot: &PostSlot) {
        let post_id = slot.post.id();
        if self.patch_post_in_all_pages(key, post_id, |v| *v = slot.post.clone()) > 0 {
            return;
        }
        let mut s = self.write();
        let Some(entry) = s.entries.get_mut(key) else { return };
        if let Some(page) = entry.pages.get_mut(slot.page) {
            let at = slot.index.min(page.posts.len());
            page.posts.insert(at, slot.post.clone());
        }
    }

    /// Bring one post in line with a freshly fetched copy of the page at `page_idx`. Other posts
    /// in the cached page are left alone. A post missing from the fresh page keeps its cached
    /// value, since offsets shift when earlier posts are deleted or hidden.
    pub fn reconcile_post(&self, key: &FeedKey, page_idx: usize, fresh: &Page, post_id: Id) {
        let Some(pos) = fresh.posts.iter().position(|v| v.id() == post_id) else {
            tracing::debug!(post_id, page_idx, "post not on refetched page, keeping restored copy");
            return;
        };
        let server = fresh.posts[pos].clone();
        if self.patch_post_in_all_pages(key, post_id, |v| *v = server.clone()) > 0 {
            return;
        }
        let mut s = self.write();
        let Some(entry) = s.entries.get_mut(key) else { return };
        if let Some(page) = entry.pages.get_mut(page_idx) {
            let at = pos.min(page.posts.len());
            page.posts.insert(at, server);
        }
    }

    pub fn replace_pages(&self, key: &FeedKey, pages: Vec<Page>) {
        let mut s = self.write();
        let entry = s.entries.entry(key.clone()).or_default();
        entry.pages = pages;
        entry.failed = false;
    }
}
