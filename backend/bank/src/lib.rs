//! # Bank
//!
//! Storefront domain: the records we keep and the logic that runs over them
//! without touching Redis or Meilisearch.
//!
//! - [`models`]: stores, reviews, users and their input forms
//! - [`slug`]: URL slugs and collision suffixes
//! - [`tags`]: tag aggregation across stores
//! - [`ranking`]: top stores by mean review rating
//! - [`pagination`]: page windows over the store listing
//! - [`password`]: password hashing and random tokens
pub mod error;
pub mod models;
pub mod pagination;
pub mod password;
pub mod ranking;
pub mod slug;
pub mod tags;

pub use error::ValidationError;
