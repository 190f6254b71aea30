use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{EmailQuery, ExampleQuery, NameQuery, Pagination, UserRequest};
use super::query::{Example, ExampleMatcher, Page, PageRequest, Sort, UserField};
use super::User;
use crate::error::{reject, RepoError};
use crate::state::AppState;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/by-email", get(get_user_by_email))
        .route("/users/by-name", get(list_users_by_name))
        .route("/users/search", get(search_users))
        .route("/users/:id", get(get_user))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/users", axum::routing::post(create_user))
        .route(
            "/users/:id",
            axum::routing::put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> HandlerResult<Json<Page<User>>> {
    let sort = match p.sort.as_deref() {
        Some(s) => s.parse::<Sort>().map_err(reject)?,
        None => Sort::unsorted(),
    };
    let request = PageRequest::of(p.page, p.size).map_err(reject)?.with_sort(sort);
    let page = state.users.find_all_paged(&request).await.map_err(reject)?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<Json<User>> {
    state
        .users
        .find_by_id(id)
        .await
        .map_err(reject)?
        .map(Json)
        .ok_or_else(|| reject(RepoError::NotFound { id }))
}

#[instrument(skip(state))]
pub async fn get_user_by_email(
    State(state): State<AppState>,
    Query(q): Query<EmailQuery>,
) -> HandlerResult<Json<User>> {
    match state.users.find_by_email(&q.email).await.map_err(reject)? {
        Some(user) => Ok(Json(user)),
        None => {
            warn!(email = %q.email, "no user with email");
            Err(reject(RepoError::EmailNotFound { email: q.email }))
        }
    }
}

#[instrument(skip(state))]
pub async fn list_users_by_name(
    State(state): State<AppState>,
    Query(q): Query<NameQuery>,
) -> HandlerResult<Json<Vec<User>>> {
    let users = match q.limit {
        Some(1) => state.users.find_first1_by_name(&q.name).await,
        Some(2) => state.users.find_top2_by_name(&q.name).await,
        Some(n) => state.users.find_top_by_name(&q.name, n).await,
        None => state.users.find_by_name(&q.name).await,
    }
    .map_err(reject)?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn search_users(
    State(state): State<AppState>,
    Query(q): Query<ExampleQuery>,
) -> HandlerResult<Json<Vec<User>>> {
    let mut matcher = ExampleMatcher::matching()
        .with_matcher(UserField::Name, q.name_match)
        .with_matcher(UserField::Email, q.email_match);
    if q.name.is_none() {
        matcher = matcher.with_ignore_paths([UserField::Name]);
    }
    if q.email.is_none() {
        matcher = matcher.with_ignore_paths([UserField::Email]);
    }
    if q.ignore_case {
        matcher = matcher.with_ignore_case();
    }

    let template = User::new(q.name.unwrap_or_default(), q.email.unwrap_or_default());
    let users = state
        .users
        .find_all_by_example(&Example::of(template, matcher))
        .await
        .map_err(reject)?;
    Ok(Json(users))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> HandlerResult<(StatusCode, HeaderMap, Json<User>)> {
    let user = state
        .users
        .save(User::new(payload.name.trim(), payload.email.trim()))
        .await
        .map_err(reject)?;

    let mut headers = HeaderMap::new();
    if let Some(id) = user.id {
        if let Ok(location) = HeaderValue::from_str(&format!("/users/{id}")) {
            headers.insert(axum::http::header::LOCATION, location);
        }
    }

    info!(id = ?user.id, "user created");
    Ok((StatusCode::CREATED, headers, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UserRequest>,
) -> HandlerResult<Json<User>> {
    let user = User::new(payload.name.trim(), payload.email.trim()).with_id(id);
    let saved = state.users.save(user).await.map_err(reject)?;
    Ok(Json(saved))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<StatusCode> {
    state.users.delete_by_id(id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}
