use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use cinema_server::auth::TokenIssuer;
use cinema_server::config::{Config, GatewayKind, StoreBackend};
use cinema_server::gateway::mock::DEFAULT_WEBHOOK_SECRET;
use cinema_server::gateway::{MockGateway, PaymentGateway, StripeGateway};
use cinema_server::routes::{create_routes, RouterOptions};
use cinema_server::services::{BookingSettings, PendingSweeper};
use cinema_server::state::AppState;
use cinema_server::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cinema_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    config.validate()?;

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(&config.database_url)
                .await?;
            tracing::info!("Successfully connected to database");

            sqlx::migrate!().run(&pool).await?;
            tracing::info!("Migrations run successfully");

            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match config.payment_gateway {
        GatewayKind::Stripe => Arc::new(StripeGateway::new(
            config.stripe_secret_key.clone().unwrap_or_default(),
            config.stripe_webhook_secret.clone().unwrap_or_default(),
            config.stripe_api_base.clone(),
            config.payment_timeout,
        )?),
        GatewayKind::Mock => {
            tracing::warn!("Using mock payment gateway");
            Arc::new(MockGateway::new(
                config
                    .stripe_webhook_secret
                    .clone()
                    .unwrap_or_else(|| DEFAULT_WEBHOOK_SECRET.to_string()),
            ))
        }
    };

    let settings = BookingSettings {
        currency: config.payment_currency.clone(),
        payment_timeout: config.payment_timeout,
    };
    let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl_hours);
    let state = AppState::new(store.clone(), gateway.clone(), tokens, settings);

    let sweeper = PendingSweeper::new(
        store,
        gateway,
        config.pending_ticket_ttl,
        config.pending_sweep_interval,
    );
    let sweeper = tokio::spawn(sweeper.run());

    let app = create_routes(state, &RouterOptions::from(&config));

    let listener = TcpListener::bind(config.bind_address()).await?;
    tracing::info!("🚀 Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
