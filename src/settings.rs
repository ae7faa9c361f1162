use std::env;

use serde::Deserialize;
use tracing::info;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub env: String, // file / server
    pub host: String,
    pub port: u16,
    pub prefix: Option<String>,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_exp: u16,
    pub jwt_refresh_exp: u16,
    pub redis_url: String,
    pub static_dir: Option<String>,
    pub log_dir: Option<String>,
    pub cookie_secure: Option<bool>,
}

impl Config {
    pub fn api_prefix(&self) -> String {
        self.prefix.clone().unwrap_or("/api".to_string())
    }

    /// Session lifetime in seconds, matching the access token expiry.
    pub fn session_ttl(&self) -> u64 {
        self.jwt_exp as u64 * 60
    }
}

pub fn get_config() -> anyhow::Result<Config> {
    let env_var = env::var("env").unwrap_or("file".to_string());
    if env_var == "file" {
        info!("using .env file as environtment variable");
        let _ = dotenvy::dotenv();
    } else {
        info!("using server environtment as environtment variable");
    }
    Ok(envy::from_env::<Config>()?)
}
