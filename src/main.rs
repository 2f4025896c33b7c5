use std::sync::Arc;

use popcorn::{
    config::Config,
    db,
    repository::{MovieRepository, RepositoryOptions},
    routes::{self, AppState},
    store::SqliteMovieStore,
    tmdb::TmdbClient,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,popcorn=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let http = reqwest::Client::builder()
        .user_agent("popcorn/0.1")
        .connect_timeout(config.http_timeout)
        .timeout(config.http_timeout)
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store = SqliteMovieStore::new(db);

    let tmdb = TmdbClient::new(
        http,
        config.tmdb_access_token.clone(),
        config.tmdb_base_url.clone(),
        config.tmdb_rps,
    );

    let repository = MovieRepository::new(
        Arc::new(tmdb),
        Arc::new(store),
        RepositoryOptions { purge_stale_on_refresh: config.purge_stale_on_refresh },
    );

    let state = Arc::new(AppState { repository });

    let app = routes::router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
