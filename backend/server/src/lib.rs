//! Documentation of the storefront service: store listings, reviews and hearts.
//!
//!
//!
//! # General Infrastructure
//! - Axum serves a JSON API, one handler per route in [`routes`]
//! - Redis holds every record (see [`database`] for the key layout)
//! - Meilisearch mirrors stores for text, geo and tag queries (see [`search`])
//! - Aggregations that need the whole catalog (tag counts, top stores) run in `bank`
//!
//!
//!
//! # Sessions
//!
//! - `/register`, `/login` and a successful password reset return a session token
//! - Clients send it back as `Authorization: Bearer <token>`
//! - Tokens live in Redis with a TTL (`SESSION_TTL_SECS`, two weeks by default)
//! - `/logout` deletes the token
//!
//!
//!
//! # Notes
//!
//! ## Redis + Meilisearch
//! Redis is the source of truth. Meilisearch only answers search-shaped
//! questions and is written right after Redis on every store change, waiting
//! for the indexing task so a redirect to the new store finds it.
//!
//! If Meilisearch falls behind (e.g. after a crash between the two writes),
//! rerun the seeding tool with `--reindex` to rebuild the index from Redis.
//!
//!
//!
//! # Setup
//!
//! Environment, with defaults:
//! ```sh
//! RUST_PORT=7777
//! REDIS_URL=redis://127.0.0.1:6379
//! MEILI_URL=http://127.0.0.1:7700
//! PAGE_SIZE=6
//! SESSION_TTL_SECS=1209600
//! PUBLIC_URL=http://localhost:7777
//! MAIL_URL=            # optional HTTP mail relay
//! MAIL_FROM="Storefront <noreply@storefront.local>"
//! ```
//!
//! `MEILI_ADMIN_KEY` is read from `/run/secrets/MEILI_ADMIN_KEY`, falling back
//! to the environment.
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod database;
pub mod error;
pub mod mail;
pub mod routes;
pub mod search;
pub mod state;
pub mod utils;

use routes::{
    account_handler, create_store_handler, edit_store_handler, forgot_handler, heart_handler,
    hearts_handler, login_handler, logout_handler, near_handler, register_handler,
    reset_check_handler, reset_handler, review_handler, search_handler, store_handler,
    stores_handler, stores_page_handler, tag_handler, tags_handler, top_handler,
    update_account_handler, update_store_handler,
};
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(stores_handler))
        .route("/stores", get(stores_handler).post(create_store_handler))
        .route("/stores/page/{page}", get(stores_page_handler))
        .route("/stores/{id}", post(update_store_handler))
        .route("/stores/{id}/edit", get(edit_store_handler))
        .route("/store/{slug}", get(store_handler))
        .route("/tags", get(tags_handler))
        .route("/tags/{tag}", get(tag_handler))
        .route("/top", get(top_handler))
        .route("/hearts", get(hearts_handler))
        .route("/reviews/{id}", post(review_handler))
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/account", get(account_handler).post(update_account_handler))
        .route("/account/forgot", post(forgot_handler))
        .route(
            "/account/reset/{token}",
            get(reset_check_handler).post(reset_handler),
        )
        .route("/api/search", get(search_handler))
        .route("/api/stores/near", get(near_handler))
        .route("/api/stores/{id}/heart", post(heart_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub fn init_tracing() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
}

pub async fn start_server() -> Result<()> {
    init_tracing();

    info!("Initializing state...");
    let state = AppState::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
