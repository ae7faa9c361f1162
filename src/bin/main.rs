use std::sync::Arc;

use hr_dashboard::{
    core::db::{init_pool, init_redis_pool},
    init_openapi_route,
    realtime::listener::spawn_listener,
    settings::get_config,
    AppState,
};
use poem::listener::TcpListener;
use tracing::Level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config()?;

    let log_level = Level::DEBUG;
    // Logging to File
    let log_dir = config.log_dir.clone().unwrap_or("./logs".to_string());
    let file_appender = tracing_appender::rolling::daily(log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(log_level)
        .init();

    // Logging to Console
    // tracing_subscriber::fmt().with_max_level(log_level).init();

    tracing::info!(
        "run with config: env={} host={} port={} prefix={}",
        config.env,
        config.host,
        config.port,
        config.api_prefix()
    );

    // Init Database Connection
    tracing::info!("Init Postgres connection");
    let pool = init_pool(&config).await?;
    // Init Redis Connection
    tracing::info!("Init Redis connection on {}", config.redis_url);
    let redis_pool = init_redis_pool(&config)?;
    // Init App State
    let app_state = Arc::new(AppState::new(pool, redis_pool));

    // Employee change feed
    spawn_listener(app_state.db.clone(), app_state.changes.clone());

    let app = init_openapi_route(app_state.clone(), &config);
    tracing::info!("run server on {}:{}", config.host, config.port);
    poem::Server::new(TcpListener::bind(format!(
        "{}:{}",
        config.host, config.port
    )))
    .run(app)
    .await?;
    Ok(())
}
