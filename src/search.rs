//! Search-as-you-type on top of [`MovieRepository::search`].

use std::time::Duration;

use futures::StreamExt;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::debug;

use crate::{
    models::Movie,
    repository::{MovieRepository, ResourceStream},
    resource::Resource,
};

const UPDATE_BUFFER: usize = 16;

#[derive(Clone, Copy, Debug)]
pub struct SearchSettings {
    /// Quiet period after the last keystroke before a query is sent.
    pub debounce: Duration,
    /// Shorter queries are never sent.
    pub min_chars: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(500), min_chars: 2 }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchUpdate {
    pub query: String,
    pub state: Resource<Vec<Movie>>,
}

/// Owns the background task driving a debounced search. Queries are trimmed,
/// debounced and deduplicated; only a query that survives those filters
/// abandons the search in flight.
pub struct SearchPipeline {
    queries: watch::Sender<String>,
    task: JoinHandle<()>,
}

impl SearchPipeline {
    pub fn spawn(
        repo: MovieRepository,
        settings: SearchSettings,
    ) -> (Self, mpsc::Receiver<SearchUpdate>) {
        let (queries, rx) = watch::channel(String::new());
        let (updates, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let task = tokio::spawn(run(repo, settings, rx, updates));
        (Self { queries, task }, updates_rx)
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.queries.send_replace(query.into());
    }
}

impl Drop for SearchPipeline {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    repo: MovieRepository,
    settings: SearchSettings,
    mut queries: watch::Receiver<String>,
    updates: mpsc::Sender<SearchUpdate>,
) {
    let mut last_query: Option<String> = None;
    let mut deadline: Option<Instant> = None;
    let mut active: Option<(String, ResourceStream<Vec<Movie>>)> = None;

    loop {
        tokio::select! {
            changed = queries.changed() => {
                if changed.is_err() {
                    return;
                }
                deadline = Some(Instant::now() + settings.debounce);
            },
            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                let query = queries.borrow_and_update().trim().to_string();

                // The running search keeps going unless a distinct, long
                // enough query replaces it.
                if last_query.as_deref() == Some(query.as_str()) {
                    continue;
                }
                last_query = Some(query.clone());

                if query.chars().count() < settings.min_chars {
                    debug!(query = %query, "query too short, not searching");
                    continue;
                }

                if let Some((previous, _)) = &active {
                    debug!(query = %previous, "search superseded");
                }
                let states = repo.search(&query);
                active = Some((query, states));
            },
            state = next_state(&mut active), if active.is_some() => {
                let Some(state) = state else {
                    active = None;
                    continue;
                };
                let Some((query, _)) = &active else {
                    continue;
                };
                if state.is_terminal() {
                    debug!(query = %query, "search finished");
                }
                let update = SearchUpdate { query: query.clone(), state };
                if updates.send(update).await.is_err() {
                    return;
                }
            },
        }
    }
}

async fn next_state(
    active: &mut Option<(String, ResourceStream<Vec<Movie>>)>,
) -> Option<Resource<Vec<Movie>>> {
    match active {
        Some((_, states)) => states.next().await,
        None => std::future::pending().await,
    }
}
