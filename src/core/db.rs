use std::time::Duration;

use sqlx::{pool::PoolOptions, Pool, Postgres};

use crate::settings::Config;

pub async fn init_pool(config: &Config) -> anyhow::Result<Pool<Postgres>> {
    let pool = PoolOptions::new()
        .min_connections(5)
        .max_connections(100)
        .idle_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}

pub fn init_redis_pool(config: &Config) -> anyhow::Result<r2d2::Pool<redis::Client>> {
    let client = redis::Client::open(config.redis_url.clone())?;
    Ok(r2d2::Pool::builder().build(client)?)
}
