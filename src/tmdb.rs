use std::{num::NonZeroU32, sync::Arc};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::{StatusCode, header::ACCEPT};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TmdbError {
    #[error("TMDB request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("TMDB returned {status} for {path}")]
    Status { status: StatusCode, path: String },
    #[error("unexpected TMDB response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read-only view of the remote movie catalogue.
#[async_trait]
pub trait MovieRemote: Send + Sync {
    async fn trending(&self, page: u32) -> Result<MovieListResponse, TmdbError>;

    async fn now_playing(&self, page: u32) -> Result<MovieListResponse, TmdbError>;

    async fn details(&self, movie_id: i32) -> Result<MovieDetailDto, TmdbError>;

    async fn search(&self, query: &str, page: u32) -> Result<MovieListResponse, TmdbError>;
}

pub struct TmdbClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(client: reqwest::Client, access_token: String, base_url: String, rps: u32) -> Self {
        if access_token.trim().is_empty() {
            tracing::warn!("no TMDB_ACCESS_TOKEN provided, remote fetches will be rejected");
        }

        let rps = NonZeroU32::new(rps.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self { client, access_token, base_url, limiter }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TmdbError> {
        self.limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        debug!(path = %path, "requesting TMDB");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TmdbError::Status { status, path: path.to_string() });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl MovieRemote for TmdbClient {
    async fn trending(&self, page: u32) -> Result<MovieListResponse, TmdbError> {
        self.get("trending/movie/week", &[("page", page.to_string())]).await
    }

    async fn now_playing(&self, page: u32) -> Result<MovieListResponse, TmdbError> {
        self.get("movie/now_playing", &[("page", page.to_string())]).await
    }

    async fn details(&self, movie_id: i32) -> Result<MovieDetailDto, TmdbError> {
        self.get(&format!("movie/{movie_id}"), &[]).await
    }

    async fn search(&self, query: &str, page: u32) -> Result<MovieListResponse, TmdbError> {
        self.get("search/movie", &[("query", query.to_string()), ("page", page.to_string())]).await
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MovieListResponse {
    pub page: u32,
    pub results: Vec<MovieDto>,
    pub total_pages: u32,
    pub total_results: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MovieDto {
    pub id: i32,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub vote_count: i32,
    pub popularity: f64,
    #[serde(default)]
    pub adult: bool,
    pub genre_ids: Option<Vec<i32>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MovieDetailDto {
    pub id: i32,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub vote_count: i32,
    pub popularity: f64,
    pub runtime: Option<i32>,
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    pub tagline: Option<String>,
    pub status: Option<String>,
    pub genres: Option<Vec<GenreDto>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GenreDto {
    pub id: i32,
    pub name: String,
}
