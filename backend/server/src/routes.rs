use std::{
    collections::{HashMap, HashSet},
    slice,
    sync::Arc,
};

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use bank::{
    ValidationError,
    models::{
        AccountForm, LoginForm, PasswordForm, PublicUser, RegisterForm, Review, ReviewForm, Store,
        StoreForm, User, normalize_email,
    },
    pagination::{Paging, Window, resolve},
    password::{hash_password, reset_token, verify_password},
    ranking::{RankedStore, TOP_LIMIT, top_stores},
    tags::{TagCount, tag_counts},
};
use chrono::{Duration, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    database::{
        all_reviews, all_stores, clear_reset_token, create_session, delete_session, hearts,
        insert_review, insert_store, insert_user, reviews_for_store, save_user, set_reset_token,
        store_by_id, store_by_slug, store_count, stores_by_ids, stores_page, toggle_heart,
        update_account, update_store, user_by_email, user_by_reset_token, users_by_ids,
    },
    error::AppError,
    mail::password_reset,
    search::{MeiliStore, search_stores, stores_by_tag, stores_near, upsert_stores},
    state::AppState,
    utils::{CurrentUser, confirm_owner, parse_body},
};

type AppResult<T> = Result<T, AppError>;

const RESET_WINDOW_HOURS: i64 = 1;

/// Argon2 blocks for tens of milliseconds, so it runs on the blocking pool.
async fn hash_blocking(password: String) -> AppResult<String> {
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::InternalError(e.into()))??;

    Ok(hashed)
}

async fn verify_blocking(password: String, encoded: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &encoded))
        .await
        .map_err(|e| AppError::InternalError(e.into()))
}

#[derive(Deserialize)]
pub struct PageQuery {
    page: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize)]
pub struct NearQuery {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ForgotForm {
    email: String,
}

#[derive(Serialize)]
pub struct StoreListing {
    pub stores: Vec<Store>,
    #[serde(flatten)]
    pub window: Window,
}

#[derive(Serialize)]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub reviewer: Option<PublicUser>,
}

#[derive(Serialize)]
pub struct StoreDetail {
    pub store: Store,
    pub author: Option<PublicUser>,
    pub reviews: Vec<ReviewView>,
}

#[derive(Serialize)]
pub struct TagPage {
    pub tag: Option<String>,
    pub tags: Vec<TagCount>,
    pub stores: Vec<MeiliStore>,
}

#[derive(Serialize)]
pub struct Session {
    pub token: String,
    pub user: PublicUser,
    pub message: &'static str,
}

async fn store_or_404(conn: &mut ConnectionManager, id: Uuid) -> AppResult<Store> {
    store_by_id(conn, id).await?.ok_or(AppError::NotFound("Store"))
}

async fn start_session(state: &AppState, user: &User, message: &'static str) -> AppResult<Session> {
    let mut conn = state.redis_connection.clone();
    let token = create_session(&mut conn, user.id, state.config.session_ttl_secs).await?;

    Ok(Session {
        token,
        user: user.public(),
        message,
    })
}

pub async fn stores_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    list_page(&state, query.page.unwrap_or(1)).await
}

pub async fn stores_page_handler(
    State(state): State<Arc<AppState>>,
    Path(page): Path<usize>,
) -> AppResult<Response> {
    list_page(&state, page).await
}

async fn list_page(state: &AppState, page: usize) -> AppResult<Response> {
    let mut conn = state.redis_connection.clone();
    let count = store_count(&mut conn).await?;

    match resolve(page, state.config.page_size, count) {
        Paging::Beyond { last } => {
            info!("Page {page} does not exist, redirecting to page {last}");
            Ok(Redirect::to(&format!("/stores/page/{last}")).into_response())
        }
        Paging::Within(window) => {
            let stores = stores_page(&mut conn, window.skip, window.limit).await?;
            Ok(Json(StoreListing { stores, window }).into_response())
        }
    }
}

pub async fn create_store_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let valid = parse_body::<StoreForm>(&body)?.validate()?;

    let mut conn = state.redis_connection.clone();
    let store = insert_store(&mut conn, valid, current.user.id).await?;
    upsert_stores(&state.meili_client, slice::from_ref(&store)).await?;

    info!("Created store {} ({})", store.slug, store.id);

    let message = format!("Successfully Created {}. Care to leave a review?", store.name);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "store": store, "message": message })),
    ))
}

pub async fn edit_store_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Store>> {
    let mut conn = state.redis_connection.clone();
    let store = store_or_404(&mut conn, id).await?;
    confirm_owner(&store, &current.user)?;

    Ok(Json(store))
}

pub async fn update_store_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let valid = parse_body::<StoreForm>(&body)?.validate()?;

    let mut conn = state.redis_connection.clone();
    let store = store_or_404(&mut conn, id).await?;
    confirm_owner(&store, &current.user)?;

    let store = update_store(&mut conn, store, valid).await?;
    upsert_stores(&state.meili_client, slice::from_ref(&store)).await?;

    info!("Updated store {} ({})", store.slug, store.id);

    let message = format!(
        "Successfully updated {}. View store at /store/{}",
        store.name, store.slug
    );
    Ok(Json(json!({ "store": store, "message": message })))
}

pub async fn store_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> AppResult<Json<StoreDetail>> {
    let mut conn = state.redis_connection.clone();
    let store = store_by_slug(&mut conn, &slug)
        .await?
        .ok_or(AppError::NotFound("Store"))?;
    let reviews = reviews_for_store(&mut conn, store.id).await?;

    let author_ids: Vec<Uuid> = reviews
        .iter()
        .map(|review| review.author)
        .chain([store.author])
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let authors: HashMap<Uuid, PublicUser> = users_by_ids(&mut conn, &author_ids)
        .await?
        .into_iter()
        .map(|user| (user.id, user.public()))
        .collect();

    let reviews = reviews
        .into_iter()
        .map(|review| ReviewView {
            reviewer: authors.get(&review.author).cloned(),
            review,
        })
        .collect();

    Ok(Json(StoreDetail {
        author: authors.get(&store.author).cloned(),
        store,
        reviews,
    }))
}

pub async fn tags_handler(State(state): State<Arc<AppState>>) -> AppResult<Json<TagPage>> {
    tag_page(&state, None).await
}

pub async fn tag_handler(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> AppResult<Json<TagPage>> {
    tag_page(&state, Some(tag)).await
}

async fn tag_page(state: &AppState, tag: Option<String>) -> AppResult<Json<TagPage>> {
    let mut conn = state.redis_connection.clone();

    let (all, stores) = tokio::try_join!(all_stores(&mut conn), async {
        stores_by_tag(&state.meili_client, tag.as_deref())
            .await
            .map_err(AppError::from)
    })?;

    Ok(Json(TagPage {
        tags: tag_counts(&all),
        tag,
        stores,
    }))
}

pub async fn top_handler(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<RankedStore>>> {
    let mut stores_conn = state.redis_connection.clone();
    let mut reviews_conn = state.redis_connection.clone();

    let (stores, reviews) = tokio::try_join!(
        all_stores(&mut stores_conn),
        all_reviews(&mut reviews_conn)
    )?;

    Ok(Json(top_stores(&stores, &reviews, TOP_LIMIT)))
}

pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<MeiliStore>>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Ok(Json(Vec::new()));
    }

    Ok(Json(search_stores(&state.meili_client, q).await?))
}

pub async fn near_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearQuery>,
) -> AppResult<Json<Vec<MeiliStore>>> {
    if !(-90.0..=90.0).contains(&query.lat) || !(-180.0..=180.0).contains(&query.lng) {
        return Err(ValidationError::single("Coordinates are out of range").into());
    }

    Ok(Json(stores_near(&state.meili_client, query.lat, query.lng).await?))
}

pub async fn heart_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.redis_connection.clone();
    store_or_404(&mut conn, id).await?;

    let hearted = toggle_heart(&mut conn, current.user.id, id).await?;
    let hearts = hearts(&mut conn, current.user.id).await?;

    Ok(Json(json!({ "hearted": hearted, "hearts": hearts })))
}

pub async fn hearts_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> AppResult<Json<Vec<Store>>> {
    let mut conn = state.redis_connection.clone();
    let ids = hearts(&mut conn, current.user.id).await?;

    Ok(Json(stores_by_ids(&mut conn, &ids).await?))
}

pub async fn review_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let review = parse_body::<ReviewForm>(&body)?.validate(current.user.id, id)?;

    let mut conn = state.redis_connection.clone();
    store_or_404(&mut conn, id).await?;
    insert_review(&mut conn, &review).await?;

    info!("Review {} saved for store {}", review.id, review.store);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "review": review, "message": "Review Saved!" })),
    ))
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let valid = parse_body::<RegisterForm>(&body)?.validate()?;

    let user = User {
        id: Uuid::new_v4(),
        name: valid.name,
        email: valid.email,
        password_hash: hash_blocking(valid.password).await?,
        created: Utc::now(),
        reset_password_token: None,
        reset_password_expires: None,
    };

    let mut conn = state.redis_connection.clone();
    insert_user(&mut conn, &user).await?;

    info!("Registered user {}", user.id);

    let session = start_session(&state, &user, "You are now logged in!").await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<Session>> {
    let form = parse_body::<LoginForm>(&body)?;

    let mut conn = state.redis_connection.clone();
    let Some(user) = user_by_email(&mut conn, &normalize_email(&form.email)).await? else {
        return Err(AppError::InvalidCredentials);
    };

    if !verify_blocking(form.password, user.password_hash.clone()).await? {
        return Err(AppError::InvalidCredentials);
    }

    Ok(Json(
        start_session(&state, &user, "You are now logged in!").await?,
    ))
}

pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.redis_connection.clone();
    delete_session(&mut conn, &current.token).await?;

    Ok(Json(json!({ "message": "You are now logged out!" })))
}

pub async fn account_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.redis_connection.clone();
    let hearts = hearts(&mut conn, current.user.id).await?;

    Ok(Json(json!({ "user": current.user.public(), "hearts": hearts })))
}

pub async fn update_account_handler(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let (name, email) = parse_body::<AccountForm>(&body)?.validate()?;

    let mut conn = state.redis_connection.clone();
    let user = update_account(&mut conn, current.user, name, email).await?;

    Ok(Json(json!({ "user": user.public(), "message": "Updated the profile!" })))
}

/// Answers the same way whether or not the email has an account, and whether
/// or not the mail relay accepted the message.
pub async fn forgot_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let form = parse_body::<ForgotForm>(&body)?;
    let message = json!({ "message": "You have been emailed a password reset link." });

    let mut conn = state.redis_connection.clone();
    let Some(mut user) = user_by_email(&mut conn, &normalize_email(&form.email)).await? else {
        return Ok(Json(message));
    };

    let token = reset_token();
    let expires = Utc::now() + Duration::hours(RESET_WINDOW_HOURS);
    set_reset_token(&mut conn, &mut user, token.clone(), expires).await?;

    let reset_url = format!(
        "{}/account/reset/{token}",
        state.config.public_url.trim_end_matches('/')
    );
    state
        .mailer
        .send_or_log(&password_reset(&user, &reset_url))
        .await;

    Ok(Json(message))
}

async fn reset_user(conn: &mut ConnectionManager, token: &str) -> AppResult<User> {
    user_by_reset_token(conn, token)
        .await?
        .filter(|user| user.reset_valid_at(token, Utc::now()))
        .ok_or(AppError::InvalidResetToken)
}

pub async fn reset_check_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.redis_connection.clone();
    reset_user(&mut conn, &token).await?;

    Ok(Json(json!({ "message": "Reset your Password" })))
}

pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Bytes,
) -> AppResult<Json<Session>> {
    let password = parse_body::<PasswordForm>(&body)?.validate()?;

    let mut conn = state.redis_connection.clone();
    let mut user = reset_user(&mut conn, &token).await?;

    user.password_hash = hash_blocking(password).await?;
    clear_reset_token(&mut conn, &mut user).await?;
    save_user(&mut conn, &user).await?;

    info!("Password reset for user {}", user.id);

    Ok(Json(
        start_session(
            &state,
            &user,
            "Nice! Your password has been reset! You are now logged in!",
        )
        .await?,
    ))
}
