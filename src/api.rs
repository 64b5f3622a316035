//! HTTP surface: users, feeds, follows and the merged post stream.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::config::AggregatorConfig;
use crate::models::{FeedFollow, Post, Source, User};
use crate::store::{MemoryStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub posts_default_limit: usize,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            posts_default_limit: AggregatorConfig::default().posts_default_limit,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/users", get(get_user).post(create_user))
        .route("/feeds", get(list_feeds).post(create_feed))
        .route("/feed_follows", get(list_follows).post(create_follow))
        .route("/feed_follows/{id}", delete(delete_follow))
        .route("/posts", get(list_posts))
        .route("/readiness", get(readiness))
        .route("/err", get(err_test));

    Router::new()
        .nest("/v1", v1)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { .. } => ApiError::Conflict(e.to_string()),
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StoreError::Backend(_) => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// The user behind an `Authorization: ApiKey <key>` header.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let key = header.strip_prefix("ApiKey ").unwrap_or(header).trim();
        if key.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        state
            .store
            .user_by_api_key(key)
            .map(AuthUser)
            .map_err(|_| ApiError::Unauthorized)
    }
}

#[derive(Deserialize)]
struct CreateUserReq {
    #[serde(default)]
    name: String,
}

async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserReq>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name cannot be empty".to_string()));
    }
    let user = state.store.create_user(name)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

#[derive(Deserialize)]
struct CreateFeedReq {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
}

#[derive(Serialize)]
struct CreateFeedResp {
    feed: Source,
    feed_follow: FeedFollow,
}

/// Registers a feed and follows it on behalf of its creator.
async fn create_feed(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateFeedReq>,
) -> Result<(StatusCode, Json<CreateFeedResp>), ApiError> {
    let name = body.name.trim();
    let url = body.url.trim();
    if name.is_empty() || url.is_empty() {
        return Err(ApiError::BadRequest("Fields cannot be empty".to_string()));
    }
    let feed = state.store.create_source(name, url, user.id)?;
    let feed_follow = state.store.follow(user.id, feed.id)?;
    tracing::info!(source_id = %feed.id, %url, "feed registered");
    Ok((
        StatusCode::CREATED,
        Json(CreateFeedResp { feed, feed_follow }),
    ))
}

async fn list_feeds(State(state): State<AppState>) -> Result<Json<Vec<Source>>, ApiError> {
    Ok(Json(state.store.list_sources()?))
}

#[derive(Deserialize)]
struct CreateFollowReq {
    #[serde(default)]
    feed_id: String,
}

async fn create_follow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateFollowReq>,
) -> Result<(StatusCode, Json<FeedFollow>), ApiError> {
    let feed_id = Uuid::parse_str(body.feed_id.trim())
        .map_err(|_| ApiError::BadRequest("Invalid FeedID".to_string()))?;
    let follow = state.store.follow(user.id, feed_id)?;
    Ok((StatusCode::CREATED, Json(follow)))
}

async fn delete_follow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<&'static str>, ApiError> {
    let follow_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest("Invalid FollowFeedID".to_string()))?;
    state.store.unfollow(follow_id, user.id)?;
    Ok(Json("OK"))
}

async fn list_follows(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<FeedFollow>>, ApiError> {
    Ok(Json(state.store.follows_for_user(user.id)?))
}

async fn list_posts(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Post>>, ApiError> {
    // unparseable or zero limit falls back to the default
    let limit = q
        .get("limit")
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(state.posts_default_limit);
    Ok(Json(state.store.posts_for_user(user.id, limit)?))
}

#[derive(Serialize)]
struct Readiness {
    status: &'static str,
}

async fn readiness() -> Json<Readiness> {
    Json(Readiness { status: "ok" })
}

async fn err_test() -> ApiError {
    ApiError::Internal("error endpoint requested".to_string())
}
