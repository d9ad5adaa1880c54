use std::sync::Arc;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::{viewer_of, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::ranking::{FeedQuery, SortKey};
use crate::repo::Repo;
use crate::scope::Scope;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/feed").route(web::get().to(feed_all)))
            .service(web::resource("/feed/home").route(web::get().to(feed_home)))
            .service(web::resource("/c/{name}/posts").route(web::get().to(community_feed)))
            .service(web::resource("/c/{name}/membership").route(web::put().to(set_membership)))
            .service(web::resource("/u/{username}/{tab}").route(web::get().to(user_feed)))
            .service(web::resource("/posts").route(web::post().to(create_post)))
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::patch().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/posts/{id}/vote").route(web::put().to(vote_post)))
            .service(web::resource("/posts/{id}/save").route(web::put().to(save_post)))
            .service(web::resource("/posts/{id}/hide").route(web::put().to(hide_post)))
            .service(web::resource("/posts/{id}/spoiler").route(web::put().to(set_spoiler)))
            .service(web::resource("/posts/{id}/nsfw").route(web::put().to(set_nsfw)))
            .service(web::resource("/posts/{id}/comments").route(web::get().to(get_comments)))
            .service(web::resource("/comments").route(web::post().to(create_comment)))
            .service(web::resource("/comments/{id}/vote").route(web::put().to(vote_comment))),
    );
}

#[derive(Clone)]
pub struct AppState { pub repo: Arc<dyn Repo> }

/// `sort` is lenient: anything unrecognised ranks as Best.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedParams {
    pub sort: Option<String>,
    pub cursor: Option<u64>,
}

async fn serve_feed(data: &AppState, auth: &Option<Auth>, scope: Scope, params: FeedParams) -> Result<HttpResponse, ApiError> {
    let viewer = viewer_of(auth);
    if scope.requires_viewer() && viewer.is_none() {
        return Err(ApiError::Unauthorized);
    }
    if let Some(owner) = scope.owner() {
        let profile = data.repo.get_user_by_name(owner).await?;
        if Some(profile.id) != viewer {
            return Err(ApiError::Forbidden);
        }
    }
    let query = FeedQuery::new(scope, SortKey::parse_lenient(params.sort.as_deref()))
        .cursor(params.cursor)
        .viewer(viewer);
    let page = data.repo.fetch_page(&query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/feed",
    params(FeedParams),
    responses((status = 200, description = "Page of all posts", body = Page))
)]
pub async fn feed_all(auth: Option<Auth>, data: web::Data<AppState>, params: web::Query<FeedParams>) -> Result<HttpResponse, ApiError> {
    serve_feed(&data, &auth, Scope::All, params.into_inner()).await
}

#[utoipa::path(
    get,
    path = "/api/v1/feed/home",
    params(FeedParams),
    responses(
        (status = 200, description = "Posts from joined, unmuted communities", body = Page),
        (status = 401, description = "Sign in required")
    )
)]
pub async fn feed_home(auth: Option<Auth>, data: web::Data<AppState>, params: web::Query<FeedParams>) -> Result<HttpResponse, ApiError> {
    serve_feed(&data, &auth, Scope::Home, params.into_inner()).await
}

#[utoipa::path(
    get,
    path = "/api/v1/c/{name}/posts",
    params(("name" = String, Path, description = "Community name"), FeedParams),
    responses(
        (status = 200, description = "Community feed page", body = Page),
        (status = 404, description = "Community not found")
    )
)]
pub async fn community_feed(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<String>, params: web::Query<FeedParams>) -> Result<HttpResponse, ApiError> {
    serve_feed(&data, &auth, Scope::Community(path.into_inner()), params.into_inner()).await
}

#[utoipa::path(
    get,
    path = "/api/v1/u/{username}/{tab}",
    params(
        ("username" = String, Path, description = "Profile owner"),
        ("tab" = String, Path, description = "posts | saved | hidden | upvoted | downvoted"),
        FeedParams
    ),
    responses(
        (status = 200, description = "Profile feed page", body = Page),
        (status = 401, description = "Sign in required"),
        (status = 403, description = "Only the profile owner may list this tab"),
        (status = 404, description = "User or tab not found")
    )
)]
pub async fn user_feed(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<(String, String)>, params: web::Query<FeedParams>) -> Result<HttpResponse, ApiError> {
    let (username, tab) = path.into_inner();
    let scope = match tab.as_str() {
        "posts" => Scope::User(username),
        other => Scope::user_filter(&username, other).ok_or(ApiError::NotFound)?,
    };
    serve_feed(&data, &auth, scope, params.into_inner()).await
}

#[utoipa::path(
    put,
    path = "/api/v1/c/{name}/membership",
    request_body = MembershipUpdate,
    responses(
        (status = 200, description = "Membership updated", body = Membership),
        (status = 404, description = "Community not found")
    )
)]
pub async fn set_membership(auth: Auth, data: web::Data<AppState>, path: web::Path<String>, payload: web::Json<MembershipUpdate>) -> Result<HttpResponse, ApiError> {
    let viewer = auth.viewer_id()?;
    let community = data.repo.get_community_by_name(&path.into_inner()).await?;
    let membership = data.repo.set_membership(viewer, community.id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(membership))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Author is not a member"),
        (status = 404, description = "Community not found")
    )
)]
pub async fn create_post(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewPost>) -> Result<HttpResponse, ApiError> {
    let viewer = auth.viewer_id()?;
    let new = payload.into_inner();
    if new.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }
    let post = data.repo.create_post(viewer, new).await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post with derived fields", body = PostView),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner(), viewer_of(&auth)).await?;
    Ok(HttpResponse::Ok().json(post))
}

/// Loads the post and checks the caller may change it.
async fn owned_post(data: &AppState, auth: &Auth, id: Id, moderators_too: bool) -> Result<PostView, ApiError> {
    let viewer = auth.viewer_id()?;
    let post = data.repo.get_post(id, Some(viewer)).await?;
    if post.post.author_id == viewer || (moderators_too && auth.0.is_moderator()) {
        Ok(post)
    } else {
        Err(ApiError::Forbidden)
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/posts/{id}",
    request_body = UpdatePost,
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<UpdatePost>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    owned_post(&data, &auth, id, false).await?;
    let post = data.repo.update_post(id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    responses(
        (status = 200, description = "Post deleted", body = DeletedPost),
        (status = 403, description = "Not the author or a moderator"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    owned_post(&data, &auth, id, true).await?;
    data.repo.delete_post(id).await?;
    tracing::info!(post_id = id, "post deleted");
    Ok(HttpResponse::Ok().json(DeletedPost { id }))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/vote",
    request_body = VoteRequest,
    responses(
        (status = 200, description = "Viewer relation after the vote", body = PostRelation),
        (status = 401, description = "Sign in required"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn vote_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<VoteRequest>) -> Result<HttpResponse, ApiError> {
    let rel = data.repo.set_vote(auth.viewer_id()?, path.into_inner(), payload.vote_status).await?;
    Ok(HttpResponse::Ok().json(rel))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/save",
    request_body = SaveRequest,
    responses((status = 200, description = "Viewer relation after saving", body = PostRelation))
)]
pub async fn save_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<SaveRequest>) -> Result<HttpResponse, ApiError> {
    let rel = data.repo.set_saved(auth.viewer_id()?, path.into_inner(), payload.saved).await?;
    Ok(HttpResponse::Ok().json(rel))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/hide",
    request_body = HideRequest,
    responses((status = 200, description = "Viewer relation after hiding", body = PostRelation))
)]
pub async fn hide_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<HideRequest>) -> Result<HttpResponse, ApiError> {
    let rel = data.repo.set_hidden(auth.viewer_id()?, path.into_inner(), payload.hidden).await?;
    Ok(HttpResponse::Ok().json(rel))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/spoiler",
    request_body = SpoilerFlag,
    responses(
        (status = 200, description = "Spoiler tag set", body = SpoilerFlag),
        (status = 403, description = "Not the author")
    )
)]
pub async fn set_spoiler(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<SpoilerFlag>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    owned_post(&data, &auth, id, false).await?;
    let post = data.repo.set_spoiler(id, payload.spoiler).await?;
    Ok(HttpResponse::Ok().json(SpoilerFlag { spoiler: post.spoiler }))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}/nsfw",
    request_body = NsfwFlag,
    responses(
        (status = 200, description = "NSFW tag set", body = NsfwFlag),
        (status = 403, description = "Not the author")
    )
)]
pub async fn set_nsfw(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<NsfwFlag>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    owned_post(&data, &auth, id, false).await?;
    let post = data.repo.set_nsfw(id, payload.nsfw).await?;
    Ok(HttpResponse::Ok().json(NsfwFlag { nsfw: post.nsfw }))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}/comments",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Top-level comments and all replies", body = PostComments),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_comments(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let comments = data.repo.list_comments(path.into_inner(), viewer_of(&auth)).await?;
    Ok(HttpResponse::Ok().json(comments))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Parent is missing or on another post"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn create_comment(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewComment>) -> Result<HttpResponse, ApiError> {
    let viewer = auth.viewer_id()?;
    let new = payload.into_inner();
    if new.text.trim().is_empty() {
        return Err(ApiError::BadRequest("comment must not be empty".into()));
    }
    let comment = data.repo.create_comment(viewer, new).await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    put,
    path = "/api/v1/comments/{id}/vote",
    request_body = VoteRequest,
    responses((status = 200, description = "Viewer comment relation", body = CommentRelation))
)]
pub async fn vote_comment(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>, payload: web::Json<VoteRequest>) -> Result<HttpResponse, ApiError> {
    let rel = data.repo.set_comment_vote(auth.viewer_id()?, path.into_inner(), payload.vote_status).await?;
    Ok(HttpResponse::Ok().json(rel))
}
