use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub tmdb_access_token: String,
    pub tmdb_base_url: String,
    pub tmdb_rps: u32,
    pub http_timeout: Duration,
    pub database_url: String,
    pub purge_stale_on_refresh: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let tmdb_access_token =
            std::env::var("TMDB_ACCESS_TOKEN").unwrap_or_else(|_| "".to_string());
        let tmdb_base_url = std::env::var("TMDB_BASE_URL")
            .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string());

        let tmdb_rps: u32 =
            std::env::var("TMDB_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(4);

        let http_timeout_secs: u64 =
            std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(30);

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://popcorn.db?mode=rwc".to_string());

        let purge_stale_on_refresh = std::env::var("PURGE_STALE_ON_REFRESH")
            .ok()
            .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            tmdb_access_token,
            tmdb_base_url,
            tmdb_rps,
            http_timeout: Duration::from_secs(http_timeout_secs),
            database_url,
            purge_stale_on_refresh,
        })
    }
}
