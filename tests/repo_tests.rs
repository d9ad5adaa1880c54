#![cfg(feature = "inmem-store")]

use std::collections::HashSet;

use feedrank::{
    models::*,
    ranking::{FeedQuery, SortKey, PAGE_SIZE},
    repo::{inmem::InMemRepo, RepoError},
    scope::Scope,
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use feedrank::repo::{CommentRepo, CommunityRepo, PostRepo, RelationRepo, UserRepo};

/// Helper that returns a fresh, empty repository for every test run.
fn repo() -> InMemRepo {
    InMemRepo::ephemeral()
}

async fn user(r: &InMemRepo, name: &str) -> User {
    r.create_user(NewUser { username: name.into() }).await.unwrap()
}

async fn community(r: &InMemRepo, name: &str) -> Community {
    r.create_community(NewCommunity { name: name.into() }).await.unwrap()
}

async fn join(r: &InMemRepo, u: &User, c: &Community) {
    r.set_membership(u.id, c.id, MembershipUpdate { joined: Some(true), ..Default::default() })
        .await
        .unwrap();
}

async fn post(r: &InMemRepo, author: &User, c: &Community, title: &str) -> Post {
    r.create_post(
        author.id,
        NewPost { community_id: c.id, title: title.into(), body: None, nsfw: false, spoiler: false },
    )
    .await
    .unwrap()
}

async fn page(r: &InMemRepo, scope: Scope, sort: SortKey, viewer: Option<Id>, cursor: u64) -> Vec<Id> {
    let q = FeedQuery::new(scope, sort).viewer(viewer).cursor(Some(cursor));
    r.fetch_page(&q).await.unwrap().posts.iter().map(|p| p.id()).collect()
}

#[tokio::test]
async fn posting_requires_joined_membership() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let rust = community(&r, "rust").await;

    let err = r
        .create_post(
            alice.id,
            NewPost { community_id: rust.id, title: "hi".into(), body: None, nsfw: false, spoiler: false },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Invalid(_)));

    join(&r, &alice, &rust).await;
    let p = post(&r, &alice, &rust, "hi").await;
    assert_eq!(p.author_id, alice.id);

    // duplicate names → conflict
    let err = r.create_community(NewCommunity { name: "rust".into() }).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict));
}

#[tokio::test]
async fn vote_count_is_sum_of_relation_weights() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let bob = user(&r, "bob").await;
    let carol = user(&r, "carol").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    let p = post(&r, &alice, &c, "counted").await;

    r.set_vote(alice.id, p.id, VoteStatus::Upvoted).await.unwrap();
    r.set_vote(bob.id, p.id, VoteStatus::Upvoted).await.unwrap();
    r.set_vote(carol.id, p.id, VoteStatus::Downvoted).await.unwrap();
    // save-only relation contributes zero
    r.set_saved(alice.id, p.id, true).await.unwrap();

    let v = r.get_post(p.id, Some(carol.id)).await.unwrap();
    assert_eq!(v.vote_count, 1);
    assert_eq!(v.vote_status(), VoteStatus::Downvoted);

    // revoking a vote moves the count back
    r.set_vote(carol.id, p.id, VoteStatus::None).await.unwrap();
    assert_eq!(r.get_post(p.id, None).await.unwrap().vote_count, 2);
}

#[tokio::test]
async fn relation_writes_only_touch_their_own_field() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    let p = post(&r, &alice, &c, "p").await;

    r.set_vote(alice.id, p.id, VoteStatus::Upvoted).await.unwrap();
    r.set_saved(alice.id, p.id, true).await.unwrap();
    let rel = r.set_hidden(alice.id, p.id, true).await.unwrap();
    assert_eq!(rel.vote_status, VoteStatus::Upvoted);
    assert!(rel.saved && rel.hidden);

    // idempotent
    let again = r.set_saved(alice.id, p.id, true).await.unwrap();
    assert!(again.saved);
    assert_eq!(again.vote_status, VoteStatus::Upvoted);

    let err = r.set_vote(alice.id, 9999, VoteStatus::Upvoted).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn best_orders_by_votes_then_age() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let bob = user(&r, "bob").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    let old = post(&r, &alice, &c, "old").await;
    let mid = post(&r, &alice, &c, "mid").await;
    let top = post(&r, &alice, &c, "top").await;
    r.set_vote(alice.id, top.id, VoteStatus::Upvoted).await.unwrap();
    r.set_vote(bob.id, top.id, VoteStatus::Upvoted).await.unwrap();

    let ids = page(&r, Scope::All, SortKey::Best, None, 0).await;
    assert_eq!(ids, vec![top.id, old.id, mid.id]);
}

#[tokio::test]
async fn pages_never_repeat_a_post() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    for i in 0..25 {
        post(&r, &alice, &c, &format!("p{i}")).await;
    }

    let mut seen = HashSet::new();
    let mut cursor = Some(0);
    let mut pages = 0;
    while let Some(at) = cursor {
        let q = FeedQuery::new(Scope::All, SortKey::New).cursor(Some(at));
        let p = r.fetch_page(&q).await.unwrap();
        assert!(p.posts.len() <= PAGE_SIZE);
        for v in &p.posts {
            assert!(seen.insert(v.id()), "post {} served twice", v.id());
        }
        cursor = p.next_cursor;
        pages += 1;
    }
    assert_eq!(seen.len(), 25);
    assert_eq!(pages, 3);
}

#[tokio::test]
async fn exact_multiple_of_page_size_ends_with_empty_page() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    for i in 0..PAGE_SIZE {
        post(&r, &alice, &c, &format!("p{i}")).await;
    }
    let first = r.fetch_page(&FeedQuery::new(Scope::All, SortKey::Best)).await.unwrap();
    assert_eq!(first.next_cursor, Some(PAGE_SIZE as u64));
    let second = r
        .fetch_page(&FeedQuery::new(Scope::All, SortKey::Best).cursor(first.next_cursor))
        .await
        .unwrap();
    assert!(second.posts.is_empty());
    assert_eq!(second.next_cursor, None);
}

#[tokio::test]
async fn home_shows_joined_unmuted_communities_only() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let bob = user(&r, "bob").await;
    let rust = community(&r, "rust").await;
    let go = community(&r, "go").await;
    let zig = community(&r, "zig").await;
    for c in [&rust, &go, &zig] {
        join(&r, &bob, c).await;
    }
    let pr = post(&r, &bob, &rust, "rust post").await;
    let pg = post(&r, &bob, &go, "go post").await;
    post(&r, &bob, &zig, "zig post").await;

    join(&r, &alice, &rust).await;
    join(&r, &alice, &go).await;
    r.set_membership(alice.id, go.id, MembershipUpdate { muted: Some(true), ..Default::default() })
        .await
        .unwrap();

    let ids = page(&r, Scope::Home, SortKey::Best, Some(alice.id), 0).await;
    assert_eq!(ids, vec![pr.id]);
    assert!(!ids.contains(&pg.id));

    let q = FeedQuery::new(Scope::Home, SortKey::Best);
    assert!(matches!(r.fetch_page(&q).await.unwrap_err(), RepoError::ViewerRequired));
}

#[tokio::test]
async fn hidden_posts_leave_home_and_fill_the_hidden_tab() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    let keep = post(&r, &alice, &c, "keep").await;
    let gone = post(&r, &alice, &c, "gone").await;
    r.set_hidden(alice.id, gone.id, true).await.unwrap();

    let home = page(&r, Scope::Home, SortKey::Best, Some(alice.id), 0).await;
    assert_eq!(home, vec![keep.id]);

    // the community listing itself is not viewer-filtered
    let community_ids = page(&r, Scope::Community("rust".into()), SortKey::Best, Some(alice.id), 0).await;
    assert_eq!(community_ids.len(), 2);

    let hidden = page(&r, Scope::Hidden("alice".into()), SortKey::Best, Some(alice.id), 0).await;
    assert_eq!(hidden, vec![gone.id]);

    // unhiding brings it back
    r.set_hidden(alice.id, gone.id, false).await.unwrap();
    assert_eq!(page(&r, Scope::Home, SortKey::Best, Some(alice.id), 0).await.len(), 2);
}

#[tokio::test]
async fn relation_scopes_select_by_viewer_relation() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    let a = post(&r, &alice, &c, "a").await;
    let b = post(&r, &alice, &c, "b").await;
    r.set_vote(alice.id, a.id, VoteStatus::Upvoted).await.unwrap();
    r.set_vote(alice.id, b.id, VoteStatus::Downvoted).await.unwrap();
    r.set_saved(alice.id, b.id, true).await.unwrap();

    let v = Some(alice.id);
    assert_eq!(page(&r, Scope::Upvoted("alice".into()), SortKey::Best, v, 0).await, vec![a.id]);
    assert_eq!(page(&r, Scope::Downvoted("alice".into()), SortKey::Best, v, 0).await, vec![b.id]);
    assert_eq!(page(&r, Scope::Saved("alice".into()), SortKey::Best, v, 0).await, vec![b.id]);
}

#[tokio::test]
async fn unknown_target_is_not_found_but_empty_target_is_empty() {
    let r = repo();
    community(&r, "quiet").await;
    user(&r, "lurker").await;

    let q = FeedQuery::new(Scope::Community("nope".into()), SortKey::Best);
    assert!(matches!(r.fetch_page(&q).await.unwrap_err(), RepoError::NotFound));

    let q = FeedQuery::new(Scope::Community("quiet".into()), SortKey::Best);
    let p = r.fetch_page(&q).await.unwrap();
    assert!(p.posts.is_empty());
    assert_eq!(p.next_cursor, None);

    assert!(page(&r, Scope::User("lurker".into()), SortKey::Best, None, 0).await.is_empty());
}

#[tokio::test]
async fn user_scope_lists_authored_posts() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let bob = user(&r, "bob").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    join(&r, &bob, &c).await;
    let mine = post(&r, &alice, &c, "mine").await;
    post(&r, &bob, &c, "theirs").await;
    assert_eq!(page(&r, Scope::User("alice".into()), SortKey::New, None, 0).await, vec![mine.id]);
}

#[tokio::test]
async fn comment_parent_must_exist_on_same_post() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    let p1 = post(&r, &alice, &c, "one").await;
    let p2 = post(&r, &alice, &c, "two").await;

    let top = r
        .create_comment(alice.id, NewComment { post_id: p1.id, parent_comment_id: None, text: "top".into() })
        .await
        .unwrap();
    let reply = r
        .create_comment(alice.id, NewComment { post_id: p1.id, parent_comment_id: Some(top.id), text: "re".into() })
        .await
        .unwrap();
    assert_eq!(reply.parent_comment_id, Some(top.id));

    let err = r
        .create_comment(alice.id, NewComment { post_id: p2.id, parent_comment_id: Some(top.id), text: "x".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Invalid(_)));
    let err = r
        .create_comment(alice.id, NewComment { post_id: p1.id, parent_comment_id: Some(4242), text: "x".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Invalid(_)));

    let listed = r.list_comments(p1.id, None).await.unwrap();
    assert_eq!(listed.top_level.len(), 1);
    assert_eq!(listed.replies.len(), 1);
    assert_eq!(r.get_post(p1.id, None).await.unwrap().comment_count, 2);
}

#[tokio::test]
async fn comment_votes_project_onto_views() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let bob = user(&r, "bob").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    let p = post(&r, &alice, &c, "p").await;
    let cm = r
        .create_comment(alice.id, NewComment { post_id: p.id, parent_comment_id: None, text: "c".into() })
        .await
        .unwrap();
    r.set_comment_vote(alice.id, cm.id, VoteStatus::Upvoted).await.unwrap();
    r.set_comment_vote(bob.id, cm.id, VoteStatus::Upvoted).await.unwrap();
    r.set_comment_vote(bob.id, cm.id, VoteStatus::Downvoted).await.unwrap();

    let listed = r.list_comments(p.id, Some(bob.id)).await.unwrap();
    assert_eq!(listed.top_level[0].vote_count, 0);
    assert_eq!(listed.top_level[0].vote_status, VoteStatus::Downvoted);
}

#[tokio::test]
async fn delete_cascades_relations_and_comments() {
    let r = repo();
    let alice = user(&r, "alice").await;
    let c = community(&r, "rust").await;
    join(&r, &alice, &c).await;
    let p = post(&r, &alice, &c, "doomed").await;
    r.set_saved(alice.id, p.id, true).await.unwrap();
    r.create_comment(alice.id, NewComment { post_id: p.id, parent_comment_id: None, text: "c".into() })
        .await
        .unwrap();

    r.delete_post(p.id).await.unwrap();
    assert!(matches!(r.get_post(p.id, None).await.unwrap_err(), RepoError::NotFound));
    assert!(page(&r, Scope::Saved("alice".into()), SortKey::Best, Some(alice.id), 0).await.is_empty());
    assert!(matches!(r.delete_post(p.id).await.unwrap_err(), RepoError::NotFound));
}

#[tokio::test]
async fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let r = InMemRepo::in_dir(Some(dir.path()));
        let alice = user(&r, "alice").await;
        let c = community(&r, "rust").await;
        join(&r, &alice, &c).await;
        post(&r, &alice, &c, "persisted").await;
    }
    let r = InMemRepo::in_dir(Some(dir.path()));
    let ids = page(&r, Scope::User("alice".into()), SortKey::Best, None, 0).await;
    assert_eq!(ids.len(), 1);
}
