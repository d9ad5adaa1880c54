//! Client side of the feed API: the [`FeedApi`] seam the coordinator talks to, and an HTTP
//! implementation of it.

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::models::*;
use crate::ranking::{Page, SortKey};
use crate::scope::Scope;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("sign in required")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// The one distinction that changes what the UI shows: prompt to sign in vs. a failure notice.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }
}

/// Remote operations of the feed engine, as seen by one signed-in (or anonymous) client.
#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn fetch_page(&self, scope: &Scope, sort: SortKey, cursor: Option<u64>) -> Result<Page, ClientError>;
    async fn vote(&self, post_id: Id, vote_status: VoteStatus) -> Result<PostRelation, ClientError>;
    async fn save(&self, post_id: Id, saved: bool) -> Result<PostRelation, ClientError>;
    async fn hide(&self, post_id: Id, hidden: bool) -> Result<PostRelation, ClientError>;
    async fn delete_post(&self, post_id: Id) -> Result<DeletedPost, ClientError>;
    async fn set_spoiler(&self, post_id: Id, spoiler: bool) -> Result<SpoilerFlag, ClientError>;
    async fn set_nsfw(&self, post_id: Id, nsfw: bool) -> Result<NsfwFlag, ClientError>;
    async fn get_comments(&self, post_id: Id) -> Result<PostComments, ClientError>;
}

pub struct HttpFeedApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpFeedApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let req = match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        };
        let resp = req.send().await?;
        match resp.status() {
            s if s.is_success() => resp.json::<T>().await.map_err(|e| ClientError::Decode(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound),
            s => Err(ClientError::Status(s.as_u16())),
        }
    }
}

#[async_trait]
impl FeedApi for HttpFeedApi {
    async fn fetch_page(&self, scope: &Scope, sort: SortKey, cursor: Option<u64>) -> Result<Page, ClientError> {
        let mut req = self.client.get(self.url(&scope.path())).query(&[("sort", sort.as_str())]);
        if let Some(c) = cursor {
            req = req.query(&[("cursor", c)]);
        }
        self.send(req).await
    }

    async fn vote(&self, post_id: Id, vote_status: VoteStatus) -> Result<PostRelation, ClientError> {
        let req = self.client.put(self.url(&format!("/api/v1/posts/{post_id}/vote"))).json(&VoteRequest { vote_status });
        self.send(req).await
    }

    async fn save(&self, post_id: Id, saved: bool) -> Result<PostRelation, ClientError> {
        let req = self.client.put(self.url(&format!("/api/v1/posts/{post_id}/save"))).json(&SaveRequest { saved });
        self.send(req).await
    }

    async fn hide(&self, post_id: Id, hidden: bool) -> Result<PostRelation, ClientError> {
        let req = self.client.put(self.url(&format!("/api/v1/posts/{post_id}/hide"))).json(&HideRequest { hidden });
        self.send(req).await
    }

    async fn delete_post(&self, post_id: Id) -> Result<DeletedPost, ClientError> {
        let req = self.client.delete(self.url(&format!("/api/v1/posts/{post_id}")));
        self.send(req).await
    }

    async fn set_spoiler(&self, post_id: Id, spoiler: bool) -> Result<SpoilerFlag, ClientError> {
        let req = self.client.put(self.url(&format!("/api/v1/posts/{post_id}/spoiler"))).json(&SpoilerFlag { spoiler });
        self.send(req).await
    }

    async fn set_nsfw(&self, post_id: Id, nsfw: bool) -> Result<NsfwFlag, ClientError> {
        let req = self.client.put(self.url(&format!("/api/v1/posts/{post_id}/nsfw"))).json(&NsfwFlag { nsfw });
        self.send(req).await
    }

    async fn get_comments(&self, post_id: Id) -> Result<PostComments, ClientError> {
        let req = self.client.get(self.url(&format!("/api/v1/posts/{post_id}/comments")));
        self.send(req).await
    }
}
