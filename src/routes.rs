use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
    },
    routing::get,
};
use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::Movie,
    repository::{LiveStream, MovieRepository, ResourceStream},
};

#[derive(Clone)]
pub struct AppState {
    pub repository: MovieRepository,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/movies/trending", get(trending))
        .route("/movies/now-playing", get(now_playing))
        .route("/movies/{id}", get(movie_details))
        .route("/movies/{id}/live", get(movie_live))
        .route("/movies/{id}/bookmark", get(is_bookmarked).post(toggle_bookmark))
        .route("/search", get(search))
        .route("/bookmarks", get(bookmarks))
        .with_state(state)
}

type EventStream = Sse<KeepAliveStream<BoxStream<'static, Result<Event, axum::Error>>>>;

fn resource_events<T: Serialize + Send + 'static>(states: ResourceStream<T>) -> EventStream {
    let events = states.map(|state| Event::default().event("resource").json_data(&state)).boxed();
    Sse::new(events).keep_alive(KeepAlive::default())
}

fn live_events<T: Serialize + Send + 'static>(values: LiveStream<T>) -> EventStream {
    let events = values
        .map(|value| match value {
            Ok(value) => Event::default().event("update").json_data(&value),
            Err(err) => Ok(Event::default().event("error").data(err.to_string())),
        })
        .boxed();
    Sse::new(events).keep_alive(KeepAlive::default())
}

pub async fn trending(State(state): State<Arc<AppState>>) -> EventStream {
    resource_events(state.repository.trending())
}

pub async fn now_playing(State(state): State<Arc<AppState>>) -> EventStream {
    resource_events(state.repository.now_playing())
}

pub async fn movie_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> EventStream {
    resource_events(state.repository.movie_details(id))
}

pub async fn movie_live(State(state): State<Arc<AppState>>, Path(id): Path<i32>) -> EventStream {
    live_events(state.repository.observe_movie(id))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    query: String,
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> EventStream {
    resource_events(state.repository.search(&q.query))
}

pub async fn bookmarks(State(state): State<Arc<AppState>>) -> EventStream {
    live_events::<Vec<Movie>>(state.repository.bookmarked())
}

#[derive(Debug, Serialize)]
pub struct BookmarkStatus {
    id: i32,
    bookmarked: bool,
}

pub async fn is_bookmarked(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Json<BookmarkStatus>> {
    let bookmarked = state.repository.is_bookmarked(id).await?;
    Ok(Json(BookmarkStatus { id, bookmarked }))
}

pub async fn toggle_bookmark(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    let resp = match state.repository.toggle_bookmark(id).await? {
        Some(bookmarked) => Json(BookmarkStatus { id, bookmarked }).into_response(),
        None => {
            let body = serde_json::json!({ "error": format!("movie {id} is not cached") });
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        },
    };
    Ok(resp)
}
