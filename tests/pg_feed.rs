#![cfg(feature = "postgres-store")]

use feedrank::models::*;
use feedrank::ranking::{FeedQuery, SortKey};
use feedrank::repo::pg::PgRepo;
use feedrank::repo::{CommentRepo, CommunityRepo, PostRepo, RelationRepo, RepoError, UserRepo};
use feedrank::scope::Scope;

async fn pg_repo() -> Option<PgRepo> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await
        .ok()?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.ok()?;
    Some(repo)
}

// Names are suffixed so reruns against the same database don't collide.
fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[tokio::test]
#[serial_test::serial]
async fn pg_feed_scopes_and_aggregates() {
    let Some(r) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };

    let alice = r.create_user(NewUser { username: unique("alice") }).await.unwrap();
    let bob = r.create_user(NewUser { username: unique("bob") }).await.unwrap();
    let c = r.create_community(NewCommunity { name: unique("rust") }).await.unwrap();
    r.set_membership(alice.id, c.id, MembershipUpdate { joined: Some(true), ..Default::default() })
        .await
        .unwrap();

    let a = r
        .create_post(alice.id, NewPost { community_id: c.id, title: "a".into(), body: None, nsfw: false, spoiler: false })
        .await
        .unwrap();
    let b = r
        .create_post(alice.id, NewPost { community_id: c.id, title: "b".into(), body: None, nsfw: false, spoiler: false })
        .await
        .unwrap();

    r.set_vote(alice.id, b.id, VoteStatus::Upvoted).await.unwrap();
    r.set_vote(bob.id, b.id, VoteStatus::Upvoted).await.unwrap();
    r.set_vote(bob.id, a.id, VoteStatus::Downvoted).await.unwrap();
    r.set_saved(bob.id, a.id, true).await.unwrap();
    r.create_comment(bob.id, NewComment { post_id: a.id, parent_comment_id: None, text: "hi".into() })
        .await
        .unwrap();

    let q = FeedQuery::new(Scope::Community(c.name.clone()), SortKey::Best).viewer(Some(bob.id));
    let page = r.fetch_page(&q).await.unwrap();
    let ids: Vec<Id> = page.posts.iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec![b.id, a.id]);
    assert_eq!(page.posts[0].vote_count, 2);
    assert_eq!(page.posts[1].vote_count, -1);
    assert_eq!(page.posts[1].comment_count, 1);
    assert!(page.posts[1].saved());
    assert_eq!(page.posts[1].vote_status(), VoteStatus::Downvoted);

    let q = FeedQuery::new(Scope::Saved(bob.username.clone()), SortKey::New).viewer(Some(bob.id));
    let saved: Vec<Id> = r.fetch_page(&q).await.unwrap().posts.iter().map(|p| p.id()).collect();
    assert_eq!(saved, vec![a.id]);

    // home: alice joined, then hides b
    r.set_hidden(alice.id, b.id, true).await.unwrap();
    let q = FeedQuery::new(Scope::Home, SortKey::Best).viewer(Some(alice.id));
    let home: Vec<Id> = r.fetch_page(&q).await.unwrap().posts.iter().map(|p| p.id()).collect();
    assert!(home.contains(&a.id));
    assert!(!home.contains(&b.id));

    let q = FeedQuery::new(Scope::Community(unique("missing")), SortKey::Best);
    assert!(matches!(r.fetch_page(&q).await.unwrap_err(), RepoError::NotFound));

    r.delete_post(a.id).await.unwrap();
    assert!(matches!(r.get_post(a.id, None).await.unwrap_err(), RepoError::NotFound));
}

#[tokio::test]
#[serial_test::serial]
async fn pg_post_to_missing_community_is_not_found() {
    let Some(r) = pg_repo().await else { eprintln!("skip: no DATABASE_URL"); return; };

    let alice = r.create_user(NewUser { username: unique("alice") }).await.unwrap();
    let err = r
        .create_post(alice.id, NewPost { community_id: i64::MAX, title: "x".into(), body: None, nsfw: false, spoiler: false })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));

    let c = r.create_community(NewCommunity { name: unique("go") }).await.unwrap();
    let err = r
        .create_post(alice.id, NewPost { community_id: c.id, title: "x".into(), body: None, nsfw: false, spoiler: false })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Invalid(_)));
}
