use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use application::OrderService;
use cache::{CacheRestorer, LruOrderCache, OrderCache};
use common::config::Config;
use messaging::{ConsumerConfig, OrderConsumer};
use storage::{OrderStore, PgOrderStore, RetryingOrderStore};

use crate::routes;
use crate::state::AppState;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Composition root: owns every long-lived component and the shutdown
/// ordering between them (consumer, HTTP server, cache, store).
pub struct App {
    cfg: Config,
    cache: Arc<dyn OrderCache>,
    store: Arc<dyn OrderStore>,
    service: Arc<OrderService>,
    consumer: OrderConsumer,
}

impl App {
    pub async fn new(cfg: Config) -> Result<Self> {
        info!("connecting to database");
        let pool = connect_database(&cfg).await?;
        info!("database connected");

        run_migrations(&pool, &cfg.migrations.migrations_path).await?;

        let store: Arc<dyn OrderStore> = Arc::new(RetryingOrderStore::new(
            PgOrderStore::new(pool),
            cfg.kafka.retry.clone(),
        ));

        let cache: Arc<dyn OrderCache> = Arc::new(LruOrderCache::new(cfg.cache.capacity));

        let service = Arc::new(OrderService::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            cfg.cache.get_all_limit,
        ));

        let consumer = OrderConsumer::new(consumer_config(&cfg), Arc::clone(&service))
            .context("failed to create Kafka consumer")?;

        Ok(Self {
            cfg,
            cache,
            store,
            service,
            consumer,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        self.consumer.start();
        self.spawn_cache_restoration();

        let state = AppState {
            service: Arc::clone(&self.service),
        };
        let router = routes::create_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.cfg.server.port));
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind HTTP listener")?;
        info!(%addr, "HTTP server listening");

        let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = drain_rx.await;
                })
                .await
        });

        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
        let signals_handle = signals.handle();

        signals.next().await;
        info!("received shutdown signal");

        let shutdown = tokio::time::timeout(SHUTDOWN_DEADLINE, async {
            self.consumer.shutdown().await;

            let _ = drain_tx.send(());
            match server.await {
                Ok(Ok(())) => info!("HTTP server stopped"),
                Ok(Err(e)) => error!(error = %e, "HTTP server error"),
                Err(e) => error!(error = %e, "HTTP server task failed"),
            }

            self.cache.shutdown();
            self.store.shutdown().await;
        })
        .await;

        if shutdown.is_err() {
            warn!("shutdown deadline exceeded");
        }

        signals_handle.close();
        info!("shutdown completed");
        Ok(())
    }

    /// Warm the cache in the background; the service stays available while
    /// restoration runs.
    fn spawn_cache_restoration(&self) {
        let restorer = CacheRestorer::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.store),
            self.cfg.cache.restoration.timeout,
            self.cfg.cache.restoration.batch_size,
        );
        tokio::spawn(async move {
            match restorer.restore().await {
                Ok(restored) => info!(restored, "cache restored from store"),
                Err(e) => error!(error = %e, "failed to restore cache from store"),
            }
        });
    }
}

async fn connect_database(cfg: &Config) -> Result<PgPool> {
    let db = &cfg.database;

    let statement_timeout = db.statement_timeout.as_millis().to_string();
    let idle_in_tx = db.idle_in_tx_session_timeout.as_millis().to_string();

    let options: PgConnectOptions = db.dsn.parse().context("invalid database DSN")?;
    let options = options.options([
        ("statement_timeout", statement_timeout.as_str()),
        ("idle_in_transaction_session_timeout", idle_in_tx.as_str()),
    ]);

    PgPoolOptions::new()
        .max_connections(db.max_open_conns)
        .min_connections(db.max_idle_conns)
        .max_lifetime(db.conn_max_lifetime)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn run_migrations(pool: &PgPool, path: &str) -> Result<()> {
    let migrator = Migrator::new(Path::new(path))
        .await
        .context("failed to load migrations")?;
    migrator.run(pool).await.context("failed to run migrations")?;
    info!(path, "migrations applied");
    Ok(())
}

fn consumer_config(cfg: &Config) -> ConsumerConfig {
    let kafka = &cfg.kafka;
    ConsumerConfig {
        brokers: kafka.brokers.clone(),
        topic: kafka.topic.clone(),
        group_id: kafka.group_id.clone(),
        dlq_topic: kafka.dlq_topic.clone(),
        max_retries: kafka.max_retries,
        processing_time: kafka.processing_time,
        min_bytes: kafka.min_bytes,
        max_bytes: kafka.max_bytes,
        max_wait: kafka.max_wait,
        commit_interval: kafka.commit_interval,
        batch_timeout: kafka.batch_timeout,
        batch_size: kafka.batch_size,
        retry: kafka.retry.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_config_mapping() {
        let cfg = Config::default();
        let mapped = consumer_config(&cfg);
        assert_eq!(mapped.brokers, cfg.kafka.brokers);
        assert_eq!(mapped.topic, cfg.kafka.topic);
        assert_eq!(mapped.dlq_topic, cfg.kafka.dlq_topic);
        assert_eq!(mapped.max_retries, cfg.kafka.max_retries);
        assert_eq!(mapped.retry.multiplier, cfg.kafka.retry.multiplier);
    }
}
