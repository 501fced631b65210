use std::sync::Arc;

use anyhow::{Context, Result};
use meilisearch_sdk::client::Client;
use redis::aio::ConnectionManager;

use super::{config::Config, database::init_redis, mail::Mailer, search::init_meilisearch};

pub struct AppState {
    pub config: Config,
    pub redis_connection: ConnectionManager,
    pub meili_client: Arc<Client>,
    pub mailer: Mailer,
}

impl AppState {
    pub async fn new() -> Result<Arc<Self>> {
        let config = Config::load()?;

        let redis_connection = init_redis(&config.redis_url)
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;
        let meili_client = init_meilisearch(&config.meili_url, &config.meili_key)
            .await
            .with_context(|| format!("Failed to initialize Meilisearch at {}", config.meili_url))?;
        let mailer = Mailer::new(config.mail_url.clone(), config.mail_from.clone());

        Ok(Arc::new(Self {
            config,
            redis_connection,
            meili_client,
            mailer,
        }))
    }
}
