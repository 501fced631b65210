//! # Redis
//!
//! Primary store for every record. Documents are JSON strings inside hashes,
//! relations are sets, ordering is a sorted set.
//!
//! ## Keys
//!
//! - `users`: user id -> User JSON
//! - `emails`: normalised email -> user id (uniqueness via `HSETNX`)
//! - `stores`: store id -> Store JSON
//! - `slugs`: slug -> store id (uniqueness via `HSETNX`)
//! - `stores:created`: sorted set of store ids scored by creation millis
//! - `reviews`: review id -> Review JSON
//! - `store:reviews:{store}`: set of review ids
//! - `hearts:{user}`: set of store ids the user hearted
//! - `resets`: reset token -> user id
//! - `session:{token}`: user id, expires with the session TTL
//!
//! ## Notes
//! - Listing pages read the sorted set and fetch documents with `HMGET`, so a
//!   page costs two round trips regardless of catalog size.
//! - Aggregations (tags, top stores) pull `HVALS` and run in `bank`. Fine for a
//!   catalog in the thousands.
//! - `emails` and `slugs` entries are claimed before the record is written; a
//!   failed write releases its claim again.
use std::time::Duration;

use bank::{
    models::{Review, Store, User, ValidStore},
    password::session_token,
    slug::{reslug, slugify, unique_slug},
};
use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client, RedisResult,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;

pub const USERS: &str = "users";
pub const EMAILS: &str = "emails";
pub const STORES: &str = "stores";
pub const SLUGS: &str = "slugs";
pub const STORES_CREATED: &str = "stores:created";
pub const REVIEWS: &str = "reviews";
pub const RESETS: &str = "resets";

const SLUG_ATTEMPTS: usize = 5;

pub fn store_reviews_key(store: Uuid) -> String {
    format!("store:reviews:{store}")
}

pub fn hearts_key(user: Uuid) -> String {
    format!("hearts:{user}")
}

pub fn session_key(token: &str) -> String {
    format!("session:{token}")
}

pub async fn init_redis(redis_url: &str) -> RedisResult<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;

    client.get_connection_manager_with_config(config).await
}

async fn get_json<T: DeserializeOwned>(
    conn: &mut ConnectionManager,
    key: &str,
    field: &str,
) -> Result<Option<T>, AppError> {
    let raw: Option<String> = conn.hget(key, field).await?;

    Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
}

/// Documents for `fields` in the given order, silently skipping ones that vanished.
async fn get_many_json<T: DeserializeOwned>(
    conn: &mut ConnectionManager,
    key: &str,
    fields: &[String],
) -> Result<Vec<T>, AppError> {
    if fields.is_empty() {
        return Ok(Vec::new());
    }

    let raws: Vec<Option<String>> = redis::cmd("HMGET")
        .arg(key)
        .arg(fields)
        .query_async(conn)
        .await?;

    raws.into_iter()
        .flatten()
        .map(|raw| serde_json::from_str(&raw).map_err(AppError::from))
        .collect()
}

async fn all_json<T: DeserializeOwned>(
    conn: &mut ConnectionManager,
    key: &str,
) -> Result<Vec<T>, AppError> {
    let raws: Vec<String> = conn.hvals(key).await?;

    raws.iter()
        .map(|raw| serde_json::from_str(raw).map_err(AppError::from))
        .collect()
}

async fn put_json<T: Serialize>(
    conn: &mut ConnectionManager,
    key: &str,
    field: Uuid,
    value: &T,
) -> Result<(), AppError> {
    let _: () = conn
        .hset(key, field.to_string(), serde_json::to_string(value)?)
        .await?;

    Ok(())
}

fn parse_ids(raw: Vec<String>) -> Vec<Uuid> {
    raw.into_iter()
        .filter_map(|id| {
            Uuid::parse_str(&id)
                .map_err(|e| warn!("Skipping malformed id {id}: {e}"))
                .ok()
        })
        .collect()
}

fn id_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

async fn release_claim(
    mut conn: ConnectionManager,
    key: &'static str,
    field: String,
) -> RedisResult<()> {
    conn.hdel(key, field).await
}

/// Hands back `written`, running `release` first if the write failed.
///
/// `release` is only polled on failure. Its own error is logged, never returned.
async fn release_on_err<T>(
    written: Result<T, AppError>,
    release: impl Future<Output = RedisResult<()>>,
) -> Result<T, AppError> {
    if let Err(e) = &written {
        warn!("Write failed, releasing claim: {e}");
        if let Err(release_error) = release.await {
            warn!("Failed to release claim: {release_error}");
        }
    }

    written
}

/// Claims a free slug for `base`, retrying when another writer wins the race.
///
/// `current` is the slug the store already owns; it never counts as a collision.
async fn claim_slug(
    conn: &mut ConnectionManager,
    base: &str,
    id: Uuid,
    current: Option<&str>,
) -> Result<String, AppError> {
    for _ in 0..SLUG_ATTEMPTS {
        let existing: Vec<String> = conn.hkeys(SLUGS).await?;

        let candidate = match current {
            Some(current) => reslug(base, current, &existing),
            None => unique_slug(base, &existing),
        };
        if Some(candidate.as_str()) == current {
            return Ok(candidate);
        }

        let claimed: bool = conn.hset_nx(SLUGS, &candidate, id.to_string()).await?;
        if claimed {
            return Ok(candidate);
        }

        warn!("Slug {candidate} was claimed concurrently, retrying");
    }

    Err(AppError::InternalError(
        format!("Could not claim a slug for {base}").into(),
    ))
}

pub async fn insert_store(
    conn: &mut ConnectionManager,
    valid: ValidStore,
    author: Uuid,
) -> Result<Store, AppError> {
    let base = slugify(&valid.name);
    let mut store = Store::new(valid, base.clone(), author);
    store.slug = claim_slug(conn, &base, store.id, None).await?;

    let written = put_new_store(conn, &store).await;
    release_on_err(written, release_claim(conn.clone(), SLUGS, store.slug.clone())).await?;

    Ok(store)
}

async fn put_new_store(conn: &mut ConnectionManager, store: &Store) -> Result<(), AppError> {
    let _: () = redis::pipe()
        .atomic()
        .hset(STORES, store.id.to_string(), serde_json::to_string(store)?)
        .ignore()
        .zadd(
            STORES_CREATED,
            store.id.to_string(),
            store.created.timestamp_millis(),
        )
        .ignore()
        .query_async(conn)
        .await?;

    Ok(())
}

/// Applies `valid` to the stored record, moving its slug if the name changed.
pub async fn update_store(
    conn: &mut ConnectionManager,
    mut store: Store,
    valid: ValidStore,
) -> Result<Store, AppError> {
    let old_slug = store.slug.clone();

    if store.apply(valid) {
        let base = slugify(&store.name);
        store.slug = claim_slug(conn, &base, store.id, Some(&old_slug)).await?;
    }

    let written = put_moved_store(conn, &store, &old_slug).await;
    if store.slug == old_slug {
        written?;
    } else {
        release_on_err(written, release_claim(conn.clone(), SLUGS, store.slug.clone())).await?;
    }

    Ok(store)
}

/// Writes the record and drops `old_slug` from the index if the store moved off it.
async fn put_moved_store(
    conn: &mut ConnectionManager,
    store: &Store,
    old_slug: &str,
) -> Result<(), AppError> {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .hset(STORES, store.id.to_string(), serde_json::to_string(store)?)
        .ignore();
    if store.slug != old_slug {
        pipe.hdel(SLUGS, old_slug).ignore();
    }
    let _: () = pipe.query_async(conn).await?;

    Ok(())
}

pub async fn store_by_id(
    conn: &mut ConnectionManager,
    id: Uuid,
) -> Result<Option<Store>, AppError> {
    get_json(conn, STORES, &id.to_string()).await
}

pub async fn store_by_slug(
    conn: &mut ConnectionManager,
    slug: &str,
) -> Result<Option<Store>, AppError> {
    let id: Option<String> = conn.hget(SLUGS, slug).await?;

    match id {
        Some(id) => get_json(conn, STORES, &id).await,
        None => Ok(None),
    }
}

pub async fn store_count(conn: &mut ConnectionManager) -> Result<usize, AppError> {
    Ok(conn.zcard(STORES_CREATED).await?)
}

/// Newest first.
pub async fn stores_page(
    conn: &mut ConnectionManager,
    skip: usize,
    limit: usize,
) -> Result<Vec<Store>, AppError> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = conn
        .zrevrange(STORES_CREATED, skip as isize, (skip + limit - 1) as isize)
        .await?;

    get_many_json(conn, STORES, &ids).await
}

pub async fn stores_by_ids(
    conn: &mut ConnectionManager,
    ids: &[Uuid],
) -> Result<Vec<Store>, AppError> {
    get_many_json(conn, STORES, &id_strings(ids)).await
}

pub async fn all_stores(conn: &mut ConnectionManager) -> Result<Vec<Store>, AppError> {
    all_json(conn, STORES).await
}

pub async fn insert_review(conn: &mut ConnectionManager, review: &Review) -> Result<(), AppError> {
    let _: () = redis::pipe()
        .atomic()
        .hset(REVIEWS, review.id.to_string(), serde_json::to_string(review)?)
        .ignore()
        .sadd(store_reviews_key(review.store), review.id.to_string())
        .ignore()
        .query_async(conn)
        .await?;

    Ok(())
}

/// Newest first.
pub async fn reviews_for_store(
    conn: &mut ConnectionManager,
    store: Uuid,
) -> Result<Vec<Review>, AppError> {
    let ids: Vec<String> = conn.smembers(store_reviews_key(store)).await?;
    let mut reviews: Vec<Review> = get_many_json(conn, REVIEWS, &ids).await?;

    reviews.sort_by(|a, b| b.created.cmp(&a.created));

    Ok(reviews)
}

pub async fn all_reviews(conn: &mut ConnectionManager) -> Result<Vec<Review>, AppError> {
    all_json(conn, REVIEWS).await
}

/// Fails with [`AppError::EmailTaken`] if the email already has an account.
pub async fn insert_user(conn: &mut ConnectionManager, user: &User) -> Result<(), AppError> {
    let claimed: bool = conn.hset_nx(EMAILS, &user.email, user.id.to_string()).await?;
    if !claimed {
        return Err(AppError::EmailTaken);
    }

    let written = put_json(conn, USERS, user.id, user).await;
    release_on_err(written, release_claim(conn.clone(), EMAILS, user.email.clone())).await
}

pub async fn save_user(conn: &mut ConnectionManager, user: &User) -> Result<(), AppError> {
    put_json(conn, USERS, user.id, user).await
}

pub async fn user_by_id(
    conn: &mut ConnectionManager,
    id: Uuid,
) -> Result<Option<User>, AppError> {
    get_json(conn, USERS, &id.to_string()).await
}

pub async fn user_by_email(
    conn: &mut ConnectionManager,
    email: &str,
) -> Result<Option<User>, AppError> {
    let id: Option<String> = conn.hget(EMAILS, email).await?;

    match id {
        Some(id) => get_json(conn, USERS, &id).await,
        None => Ok(None),
    }
}

pub async fn users_by_ids(
    conn: &mut ConnectionManager,
    ids: &[Uuid],
) -> Result<Vec<User>, AppError> {
    get_many_json(conn, USERS, &id_strings(ids)).await
}

/// Renames the account and moves its email claim when the email changes.
pub async fn update_account(
    conn: &mut ConnectionManager,
    mut user: User,
    name: String,
    email: String,
) -> Result<User, AppError> {
    user.name = name;

    if email == user.email {
        save_user(conn, &user).await?;
        return Ok(user);
    }

    let claimed: bool = conn.hset_nx(EMAILS, &email, user.id.to_string()).await?;
    if !claimed {
        return Err(AppError::EmailTaken);
    }

    let old_email = std::mem::replace(&mut user.email, email);
    let written = save_user(conn, &user).await;
    release_on_err(written, release_claim(conn.clone(), EMAILS, user.email.clone())).await?;

    let _: () = conn.hdel(EMAILS, &old_email).await?;

    Ok(user)
}

/// Adds the store to the user's hearts, or removes it if already there.
///
/// Returns whether the store is now hearted.
pub async fn toggle_heart(
    conn: &mut ConnectionManager,
    user: Uuid,
    store: Uuid,
) -> Result<bool, AppError> {
    let key = hearts_key(user);

    let removed: usize = conn.srem(&key, store.to_string()).await?;
    if removed > 0 {
        return Ok(false);
    }

    let _: () = conn.sadd(&key, store.to_string()).await?;

    Ok(true)
}

pub async fn hearts(conn: &mut ConnectionManager, user: Uuid) -> Result<Vec<Uuid>, AppError> {
    let ids: Vec<String> = conn.smembers(hearts_key(user)).await?;

    Ok(parse_ids(ids))
}

pub async fn create_session(
    conn: &mut ConnectionManager,
    user: Uuid,
    ttl_secs: u64,
) -> Result<String, AppError> {
    let token = session_token();

    let _: () = conn
        .set_ex(session_key(&token), user.to_string(), ttl_secs)
        .await?;

    Ok(token)
}

pub async fn session_user(
    conn: &mut ConnectionManager,
    token: &str,
) -> Result<Option<Uuid>, AppError> {
    let id: Option<String> = conn.get(session_key(token)).await?;

    Ok(id.and_then(|id| Uuid::parse_str(&id).ok()))
}

pub async fn delete_session(conn: &mut ConnectionManager, token: &str) -> Result<(), AppError> {
    let _: () = conn.del(session_key(token)).await?;

    Ok(())
}

pub async fn set_reset_token(
    conn: &mut ConnectionManager,
    user: &mut User,
    token: String,
    expires: DateTime<Utc>,
) -> Result<(), AppError> {
    if let Some(stale) = user.reset_password_token.take() {
        let _: () = conn.hdel(RESETS, stale).await?;
    }

    let _: () = conn.hset(RESETS, &token, user.id.to_string()).await?;

    user.reset_password_token = Some(token);
    user.reset_password_expires = Some(expires);

    save_user(conn, user).await
}

pub async fn user_by_reset_token(
    conn: &mut ConnectionManager,
    token: &str,
) -> Result<Option<User>, AppError> {
    let id: Option<String> = conn.hget(RESETS, token).await?;

    match id {
        Some(id) => get_json(conn, USERS, &id).await,
        None => Ok(None),
    }
}

/// Removes the reset token from the index and the user; the caller saves the user.
pub async fn clear_reset_token(
    conn: &mut ConnectionManager,
    user: &mut User,
) -> Result<(), AppError> {
    if let Some(token) = user.reset_password_token.take() {
        let _: () = conn.hdel(RESETS, token).await?;
    }
    user.reset_password_expires = None;

    Ok(())
}

pub async fn flush_all(conn: &mut ConnectionManager) -> Result<(), AppError> {
    let _: () = redis::cmd("FLUSHDB").query_async(conn).await?;

    Ok(())
}
