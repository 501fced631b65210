//! # Seeding
//!
//! Fills Redis and Meilisearch from a JSON seed file, wipes them, or rebuilds
//! the search index from Redis.
//!
//! ## Seed File
//! - `users`: name, email, password (hashed on the way in)
//! - `stores`: the same body `POST /stores` takes, plus `author` (an email)
//! - `stores` may carry a `key` for reviews to link to; it defaults to the name
//! - `reviews`: `store` (a store key), `author` (an email), text, optional rating
//!
//! Records go through the same validation and slug claiming as the HTTP API,
//! so a seeded catalog is indistinguishable from one built by hand.
//!
//! ## Order
//! 1. Users first, since stores and reviews point at them.
//! 2. Stores next, remembering key -> id for the reviews. Duplicate keys are
//!    rejected before anything is written.
//! 3. Reviews last.
//! 4. Push every store to Meilisearch in one batch.
use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result, anyhow, bail};
use bank::{
    models::{ReviewForm, Store, User, normalize_email},
    password::hash_password,
};
use chrono::Utc;
use meilisearch_sdk::client::Client;
use redis::aio::ConnectionManager;
use server::{
    config::Config,
    database::{all_stores, flush_all, init_redis, insert_review, insert_store, insert_user},
    search::{delete_all, init_meilisearch, upsert_stores},
};
use tracing::info;
use uuid::Uuid;

pub mod models;
pub mod utils;

use models::{SeedFile, SeedStore};
use utils::{progress, read_seed};

pub struct Backends {
    pub redis_connection: ConnectionManager,
    pub meili_client: Arc<Client>,
}

pub async fn connect() -> Result<Backends> {
    let config = Config::load()?;

    let redis_connection = init_redis(&config.redis_url)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;
    let meili_client = init_meilisearch(&config.meili_url, &config.meili_key)
        .await
        .with_context(|| format!("Failed to initialize Meilisearch at {}", config.meili_url))?;

    Ok(Backends {
        redis_connection,
        meili_client,
    })
}

pub async fn load_stores(backends: &mut Backends, source: &str) -> Result<()> {
    let seed = read_seed(source).await?;

    info!(
        "Loaded seed: {} users, {} stores, {} reviews",
        seed.users.len(),
        seed.stores.len(),
        seed.reviews.len()
    );

    let stores = insert_seed(&mut backends.redis_connection, seed).await?;

    upsert_stores(&backends.meili_client, &stores).await?;
    info!("Indexed {} stores", stores.len());

    Ok(())
}

/// Link keys of `stores`, in order. Two stores sharing a key would make reviews
/// ambiguous, so that is an error.
fn store_keys(stores: &[SeedStore]) -> Result<Vec<String>> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (index, store) in stores.iter().enumerate() {
        if let Some(first) = seen.insert(store.link_key().to_string(), index) {
            bail!(
                "Stores {first} and {index} share the key \"{}\", give one a distinct \"key\"",
                store.link_key()
            );
        }
    }

    Ok(stores.iter().map(|store| store.link_key().to_string()).collect())
}

async fn insert_seed(conn: &mut ConnectionManager, seed: SeedFile) -> Result<Vec<Store>> {
    let keys = store_keys(&seed.stores)?;
    let mut users: HashMap<String, Uuid> = HashMap::new();

    let pb = progress(seed.users.len(), "Users");
    for seed_user in seed.users {
        let user = User {
            id: Uuid::new_v4(),
            name: seed_user.name,
            email: normalize_email(&seed_user.email),
            password_hash: hash_password(&seed_user.password)?,
            created: Utc::now(),
            reset_password_token: None,
            reset_password_expires: None,
        };

        insert_user(conn, &user)
            .await
            .with_context(|| format!("Failed to insert user {}", user.email))?;
        users.insert(user.email.clone(), user.id);
        pb.inc(1);
    }
    pb.finish();

    let author = |email: &str| {
        users
            .get(&normalize_email(email))
            .copied()
            .ok_or_else(|| anyhow!("Unknown author {email}"))
    };

    let mut stores: Vec<Store> = Vec::with_capacity(seed.stores.len());

    let pb = progress(seed.stores.len(), "Stores");
    for seed_store in seed.stores {
        let name = seed_store.form.name.clone();
        let valid = seed_store
            .form
            .validate()
            .with_context(|| format!("Invalid store {name}"))?;

        let store = insert_store(conn, valid, author(&seed_store.author)?).await?;
        stores.push(store);
        pb.inc(1);
    }
    pb.finish();

    let store_ids: HashMap<&str, Uuid> = keys
        .iter()
        .map(String::as_str)
        .zip(stores.iter().map(|store| store.id))
        .collect();

    let pb = progress(seed.reviews.len(), "Reviews");
    for seed_review in seed.reviews {
        let store = *store_ids
            .get(seed_review.store.trim())
            .ok_or_else(|| anyhow!("Unknown store {}", seed_review.store))?;

        let form = ReviewForm {
            text: seed_review.text,
            rating: seed_review.rating,
        };
        let review = form
            .validate(author(&seed_review.author)?, store)
            .with_context(|| format!("Invalid review of {}", seed_review.store))?;

        insert_review(conn, &review).await?;
        pb.inc(1);
    }
    pb.finish();

    Ok(stores)
}

pub async fn delete_data(backends: &mut Backends) -> Result<()> {
    flush_all(&mut backends.redis_connection).await?;
    delete_all(&backends.meili_client).await?;

    info!("Data deleted");

    Ok(())
}

/// Rebuilds the search index from what Redis holds.
pub async fn reindex(backends: &mut Backends) -> Result<()> {
    let stores = all_stores(&mut backends.redis_connection).await?;

    delete_all(&backends.meili_client).await?;
    upsert_stores(&backends.meili_client, &stores).await?;

    info!("Reindexed {} stores", stores.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_stores(json: &str) -> Vec<SeedStore> {
        serde_json::from_str::<SeedFile>(json).unwrap().stores
    }

    #[test]
    fn test_store_keys_default_to_name() {
        let stores = seed_stores(
            r#"{"stores": [
                {"author": "a@b.co", "name": "Oyster Bar"},
                {"author": "a@b.co", "name": "Bean There", "key": "beans"}
            ]}"#,
        );

        assert_eq!(store_keys(&stores).unwrap(), vec!["Oyster Bar", "beans"]);
    }

    #[test]
    fn test_duplicate_names_need_keys() {
        let stores = seed_stores(
            r#"{"stores": [
                {"author": "a@b.co", "name": "Oyster Bar"},
                {"author": "a@b.co", "name": "Oyster Bar"}
            ]}"#,
        );

        let err = store_keys(&stores).unwrap_err().to_string();
        assert!(err.contains("Stores 0 and 1"));
        assert!(err.contains("Oyster Bar"));

        let stores = seed_stores(
            r#"{"stores": [
                {"author": "a@b.co", "name": "Oyster Bar"},
                {"author": "a@b.co", "name": "Oyster Bar", "key": "oyster-bar-bloor"}
            ]}"#,
        );

        assert_eq!(
            store_keys(&stores).unwrap(),
            vec!["Oyster Bar", "oyster-bar-bloor"]
        );
    }

    #[test]
    fn test_bundled_sample_links_cleanly() {
        let seed: SeedFile =
            serde_json::from_str(include_str!("../../../data/sample.json")).unwrap();
        let keys = store_keys(&seed.stores).unwrap();

        for review in &seed.reviews {
            assert!(keys.contains(&review.store.trim().to_string()));
        }
    }
}
