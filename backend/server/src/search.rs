//! # Meilisearch
//!
//! Search engine mirroring the store catalog. Redis stays the source of truth;
//! every store write is pushed here right after it lands in Redis.
//!
//!
//!
//! ## Schema
//! - Index for all stores
//! - Searchable: name, description
//! - Filterable: tags, `_geo`
//! - Sortable: created, `_geo`
//!
//!
//!
//! ## Queries
//! - Text search: relevance order, 5 hits, for the search box
//! - Near: `_geoRadius` of 10 km around a point, sorted by distance, 10 hits
//! - Tag browse: `tags = "<tag>"` (or `tags EXISTS`), newest first
//!
//!
//!
//! ## Commands
//!
//! Grab relevant keys.
//! ```sh
//! curl -H "Authorization: Bearer $(cat /run/secrets/MEILI_MASTER_KEY)" http://localhost:7700/keys
//! ```
use std::sync::Arc;

use bank::models::Store;
use meilisearch_sdk::{
    client::Client,
    errors::Error,
    settings::{MinWordSizeForTypos, Settings, TypoToleranceSettings},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const STORE_INDEX: &str = "stores";
pub const STORE_ID: &str = "id";
pub const STORE_NAME: &str = "name";
pub const STORE_DESCRIPTION: &str = "description";
pub const STORE_TAGS: &str = "tags";
pub const STORE_CREATED: &str = "created";
pub const STORE_GEO: &str = "_geo";

pub const SEARCH_LIMIT: usize = 5;
pub const NEAR_LIMIT: usize = 10;
pub const NEAR_RADIUS_METERS: u32 = 10_000;
pub const TAG_LIMIT: usize = 1_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Geo {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeiliStore {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub photo: Option<String>,
    pub address: String,
    /// Millis since epoch, so the engine can sort on it.
    pub created: i64,
    #[serde(rename = "_geo")]
    pub geo: Geo,
    /// Present on geo-sorted hits only.
    #[serde(rename = "_geoDistance", default, skip_serializing)]
    pub distance: Option<u64>,
}

impl From<&Store> for MeiliStore {
    fn from(store: &Store) -> Self {
        Self {
            id: store.id,
            slug: store.slug.clone(),
            name: store.name.clone(),
            description: store.description.clone(),
            tags: store.tags.clone(),
            photo: store.photo.clone(),
            address: store.location.address.clone(),
            created: store.created.timestamp_millis(),
            geo: Geo {
                lat: store.location.lat(),
                lng: store.location.lng(),
            },
            distance: None,
        }
    }
}

pub async fn init_meilisearch(
    meili_url: &str,
    meili_admin_key: &str,
) -> Result<Arc<Client>, Error> {
    let meili_client = Client::new(meili_url, Some(meili_admin_key))?;

    meili_client
        .index(STORE_INDEX)
        .set_settings(&init_settings())
        .await?
        .wait_for_completion(&meili_client, None, None)
        .await?;

    Ok(Arc::new(meili_client))
}

pub async fn upsert_stores(meili_client: &Client, stores: &[Store]) -> Result<(), Error> {
    let meili_stores: Vec<MeiliStore> = stores.iter().map(MeiliStore::from).collect();

    upsert_items(meili_client, STORE_INDEX, &meili_stores, STORE_ID).await
}

async fn upsert_items<T>(
    meili_client: &Client,
    index_name: &str,
    items: &[T],
    id_name: &str,
) -> Result<(), Error>
where
    T: Serialize + Send + Sync,
{
    if items.is_empty() {
        return Ok(());
    }

    let _result = meili_client
        .index(index_name)
        .add_or_update(items, Some(id_name))
        .await?
        .wait_for_completion(meili_client, None, None)
        .await?;

    #[cfg(feature = "verbose")]
    tracing::info!("Meili task result: {:?}", _result);

    Ok(())
}

pub async fn delete_all(meili_client: &Client) -> Result<(), Error> {
    meili_client
        .index(STORE_INDEX)
        .delete_all_documents()
        .await?
        .wait_for_completion(meili_client, None, None)
        .await?;

    Ok(())
}

pub async fn search_stores(meili_client: &Client, query: &str) -> Result<Vec<MeiliStore>, Error> {
    let results = meili_client
        .index(STORE_INDEX)
        .search()
        .with_query(query)
        .with_limit(SEARCH_LIMIT)
        .execute::<MeiliStore>()
        .await?;

    Ok(results.hits.into_iter().map(|hit| hit.result).collect())
}

pub async fn stores_near(
    meili_client: &Client,
    lat: f64,
    lng: f64,
) -> Result<Vec<MeiliStore>, Error> {
    let filter = near_filter(lat, lng);
    let sort = [near_sort(lat, lng)];
    let sort: Vec<&str> = sort.iter().map(String::as_str).collect();

    let results = meili_client
        .index(STORE_INDEX)
        .search()
        .with_filter(&filter)
        .with_sort(&sort)
        .with_limit(NEAR_LIMIT)
        .execute::<MeiliStore>()
        .await?;

    Ok(results.hits.into_iter().map(|hit| hit.result).collect())
}

/// Stores carrying `tag`, or any tag at all when `tag` is `None`.
pub async fn stores_by_tag(
    meili_client: &Client,
    tag: Option<&str>,
) -> Result<Vec<MeiliStore>, Error> {
    let filter = tag_filter(tag);
    let sort = [format!("{STORE_CREATED}:desc")];
    let sort: Vec<&str> = sort.iter().map(String::as_str).collect();

    let results = meili_client
        .index(STORE_INDEX)
        .search()
        .with_filter(&filter)
        .with_sort(&sort)
        .with_limit(TAG_LIMIT)
        .execute::<MeiliStore>()
        .await?;

    Ok(results.hits.into_iter().map(|hit| hit.result).collect())
}

fn near_filter(lat: f64, lng: f64) -> String {
    format!("_geoRadius({lat}, {lng}, {NEAR_RADIUS_METERS})")
}

fn near_sort(lat: f64, lng: f64) -> String {
    format!("_geoPoint({lat}, {lng}):asc")
}

fn tag_filter(tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{STORE_TAGS} = \"{}\"", escape(tag)),
        None => format!("{STORE_TAGS} EXISTS"),
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn init_settings() -> Settings {
    Settings::new()
        .with_ranking_rules([
            "words",
            "typo",
            "proximity",
            "attribute",
            "sort",
            "exactness",
        ])
        .with_searchable_attributes([STORE_NAME, STORE_DESCRIPTION])
        .with_filterable_attributes([STORE_TAGS, STORE_GEO])
        .with_sortable_attributes([STORE_CREATED, STORE_GEO])
        .with_typo_tolerance(TypoToleranceSettings {
            enabled: Some(true),
            disable_on_attributes: None,
            disable_on_words: None,
            min_word_size_for_typos: Some(MinWordSizeForTypos {
                one_typo: Some(5),
                two_typos: Some(9),
            }),
        })
}
