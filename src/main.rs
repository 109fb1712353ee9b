use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradinta::api::{self, AppState};
use tradinta::auth::ApiKeyGuard;
use tradinta::config::Config;
use tradinta::cursor::CursorSigner;
use tradinta::discovery::{CatalogRanker, DiscoveryService};
use tradinta::dispatch::BackgroundDispatcher;
use tradinta::ledger::Ledger;
use tradinta::lookup::EntityLookup;
use tradinta::redirect::{self, RedirectState};
use tradinta::reviews::RatingAggregator;
use tradinta::storage;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = storage::open(&config).await;

    let dispatcher = Arc::new(BackgroundDispatcher::new(
        Arc::clone(&storage),
        config.dispatch.buffer_size,
    ));
    let ledger = Arc::new(Ledger::new(Arc::clone(&dispatcher)));
    let ratings = Arc::new(RatingAggregator::new(Arc::clone(&storage), Arc::clone(&ledger)));
    let discovery = Arc::new(DiscoveryService::new(Arc::new(CatalogRanker::new(
        Arc::clone(&storage),
    ))));
    let lookup = Arc::new(EntityLookup::new(Arc::clone(&storage), Arc::clone(&discovery)));

    if config.pagination.cursor_hmac_secret.is_none() {
        info!("CURSOR_HMAC_SECRET not set, ledger cursors will not survive restarts");
    }
    let cursor_signer = Arc::new(CursorSigner::new(
        config.pagination.cursor_hmac_secret.as_deref(),
    ));

    let guard = Arc::new(ApiKeyGuard::new(config.admin.api_keys.clone()));
    if guard.is_enabled() {
        info!("🔐 Admin routes require an API key");
    } else {
        info!("🔓 No ADMIN_API_KEYS configured, admin routes are open");
    }

    let api_router = api::create_api_router(
        Arc::new(AppState {
            storage: Arc::clone(&storage),
            ledger,
            ratings,
            discovery,
            lookup,
            cursor_signer,
        }),
        guard,
    );
    let redirect_router = redirect::create_redirect_router(Arc::new(RedirectState {
        storage: Arc::clone(&storage),
        dispatcher: Arc::clone(&dispatcher),
        config: config.redirect.clone(),
    }));

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);

    let redirect_addr = format!(
        "{}:{}",
        config.redirect_server.host, config.redirect_server.port
    );
    let redirect_listener = tokio::net::TcpListener::bind(&redirect_addr).await?;
    info!("🚀 Redirect server listening on http://{}", redirect_addr);

    tokio::try_join!(
        async {
            axum::serve(api_listener, api_router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        },
        async {
            axum::serve(redirect_listener, redirect_router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        },
    )?;

    info!("Draining background tasks");
    dispatcher.shutdown().await;

    Ok(())
}
