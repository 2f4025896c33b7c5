use std::{future::Future, sync::Arc};

use async_stream::stream;
use futures::stream::BoxStream;
use tracing::{debug, warn};

use crate::{
    error::AppResult,
    mapper::{detail_to_row, list_item_to_row, rows_to_domain},
    models::{Category, Movie},
    resource::Resource,
    store::MovieStore,
    tmdb::{MovieListResponse, MovieRemote, TmdbError},
};

const FIRST_PAGE: u32 = 1;

pub type ResourceStream<T> = BoxStream<'static, Resource<T>>;
pub type LiveStream<T> = BoxStream<'static, AppResult<T>>;

#[derive(Clone, Copy, Debug, Default)]
pub struct RepositoryOptions {
    /// Drop non-bookmarked rows of a category before writing a fresh page.
    pub purge_stale_on_refresh: bool,
}

#[derive(Clone, Copy, Debug)]
enum Feed {
    Trending,
    NowPlaying,
}

impl Feed {
    fn category(self) -> Category {
        match self {
            Feed::Trending => Category::Trending,
            Feed::NowPlaying => Category::NowPlaying,
        }
    }

    async fn fetch(self, remote: &dyn MovieRemote) -> Result<MovieListResponse, TmdbError> {
        match self {
            Feed::Trending => remote.trending(FIRST_PAGE).await,
            Feed::NowPlaying => remote.now_playing(FIRST_PAGE).await,
        }
    }
}

/// Reconciles the remote catalogue with the local cache.
///
/// Fetch operations return a stream of at most three states: a bare
/// `Loading`, a `Loading` carrying the cache snapshot when one exists, then a
/// terminal `Success` or `Error`. Failures never escape as Rust errors; they
/// become `Error` states carrying whatever cached data was available.
#[derive(Clone)]
pub struct MovieRepository {
    remote: Arc<dyn MovieRemote>,
    store: Arc<dyn MovieStore>,
    options: RepositoryOptions,
}

impl MovieRepository {
    pub fn new(
        remote: Arc<dyn MovieRemote>,
        store: Arc<dyn MovieStore>,
        options: RepositoryOptions,
    ) -> Self {
        Self { remote, store, options }
    }

    pub fn trending(&self) -> ResourceStream<Vec<Movie>> {
        self.feed(Feed::Trending)
    }

    pub fn now_playing(&self) -> ResourceStream<Vec<Movie>> {
        self.feed(Feed::NowPlaying)
    }

    fn feed(&self, feed: Feed) -> ResourceStream<Vec<Movie>> {
        let this = self.clone();
        let category = feed.category();

        Box::pin(stream! {
            yield Resource::loading();

            let cached = match this.store.by_category(category).await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(category = %category, error = %err, "failed to read cached movies");
                    yield Resource::error(err.to_string(), None);
                    return;
                },
            };

            let fallback = (!cached.is_empty()).then(|| rows_to_domain(cached));
            if let Some(snapshot) = &fallback {
                debug!(category = %category, count = snapshot.len(), "serving cached movies");
                yield Resource::cached(snapshot.clone());
            }

            match this.refresh(feed).await {
                Ok(movies) => {
                    yield Resource::success(movies);
                },
                Err(err) => {
                    warn!(category = %category, error = %err, "failed to refresh movies");
                    yield Resource::error(err.to_string(), fallback);
                },
            }
        })
    }

    async fn refresh(&self, feed: Feed) -> AppResult<Vec<Movie>> {
        let category = feed.category();
        let resp = feed.fetch(self.remote.as_ref()).await?;
        debug!(
            category = %category,
            count = resp.results.len(),
            total_results = resp.total_results,
            "fetched movies"
        );

        let now = now_millis();
        let mut rows = Vec::with_capacity(resp.results.len());
        for dto in resp.results {
            let bookmarked = self.store.get(dto.id).await?.is_some_and(|m| m.is_bookmarked);
            rows.push(list_item_to_row(dto, category.as_str(), bookmarked, now));
        }

        if self.options.purge_stale_on_refresh {
            let purged = self.store.delete_stale(category).await?;
            debug!(category = %category, purged, "purged stale movies");
        }

        self.store.upsert_many(&rows).await?;
        Ok(rows_to_domain(rows))
    }

    pub fn movie_details(&self, movie_id: i32) -> ResourceStream<Movie> {
        let this = self.clone();

        Box::pin(stream! {
            yield Resource::loading();

            let cached = match this.store.get(movie_id).await {
                Ok(row) => row,
                Err(err) => {
                    warn!(movie_id, error = %err, "failed to read cached movie");
                    yield Resource::error(err.to_string(), None);
                    return;
                },
            };

            if let Some(row) = &cached {
                yield Resource::cached(Movie::from(row.clone()));
            }

            let result: AppResult<Movie> = async {
                let dto = this.remote.details(movie_id).await?;
                let category = cached
                    .as_ref()
                    .map_or(Category::Detail.as_str(), |row| row.category.as_str());
                let bookmarked = cached.as_ref().is_some_and(|row| row.is_bookmarked);
                let row = detail_to_row(dto, category, bookmarked, now_millis());
                this.store.upsert(&row).await?;
                Ok(Movie::from(row))
            }
            .await;

            match result {
                Ok(movie) => {
                    yield Resource::success(movie);
                },
                Err(err) => {
                    warn!(movie_id, error = %err, "failed to refresh movie details");
                    yield Resource::error(err.to_string(), cached.map(Movie::from));
                },
            }
        })
    }

    /// Searches TMDB, falling back to cached titles when the remote fails.
    /// A blank query succeeds immediately with no results.
    pub fn search(&self, query: &str) -> ResourceStream<Vec<Movie>> {
        let this = self.clone();
        let query = query.trim().to_string();

        Box::pin(stream! {
            if query.is_empty() {
                yield Resource::success(Vec::new());
                return;
            }

            yield Resource::loading();

            match this.remote.search(&query, FIRST_PAGE).await {
                Ok(resp) => {
                    debug!(query = %query, count = resp.results.len(), "search results");
                    yield Resource::success(resp.results.into_iter().map(Movie::from).collect());
                },
                Err(err) => {
                    warn!(query = %query, error = %err, "remote search failed, using cache");
                    let local = match this.store.search_titles(&query).await {
                        Ok(rows) => rows_to_domain(rows),
                        Err(store_err) => {
                            warn!(query = %query, error = %store_err, "local search failed");
                            Vec::new()
                        },
                    };
                    yield Resource::error(err.to_string(), (!local.is_empty()).then_some(local));
                },
            }
        })
    }

    /// Flips the bookmark of a cached movie. Returns the new flag, or `None`
    /// when the movie is not cached.
    pub async fn toggle_bookmark(&self, movie_id: i32) -> AppResult<Option<bool>> {
        let bookmarked = self.store.toggle_bookmark(movie_id).await?;
        debug!(movie_id, bookmarked = ?bookmarked, "toggled bookmark");
        Ok(bookmarked)
    }

    pub async fn is_bookmarked(&self, movie_id: i32) -> AppResult<bool> {
        Ok(self.store.get(movie_id).await?.is_some_and(|m| m.is_bookmarked))
    }

    /// Live list of bookmarked movies, most recently updated first.
    pub fn bookmarked(&self) -> LiveStream<Vec<Movie>> {
        self.observe(|store| async move { store.bookmarked().await.map(rows_to_domain) })
    }

    /// Live view of a single cached movie.
    pub fn observe_movie(&self, movie_id: i32) -> LiveStream<Option<Movie>> {
        self.observe(move |store| async move { Ok(store.get(movie_id).await?.map(Movie::from)) })
    }

    /// Runs `query` now and again after every store write, yielding only
    /// values that differ from the previous one. Ends after the first error.
    fn observe<T, F, Fut>(&self, query: F) -> LiveStream<T>
    where
        T: Clone + PartialEq + Send + 'static,
        F: Fn(Arc<dyn MovieStore>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        let store = self.store.clone();
        let mut changes = store.changes();

        Box::pin(stream! {
            let mut last: Option<T> = None;
            loop {
                changes.borrow_and_update();

                match query(store.clone()).await {
                    Ok(value) => {
                        if last.as_ref() != Some(&value) {
                            last = Some(value.clone());
                            yield Ok(value);
                        }
                    },
                    Err(err) => {
                        warn!(error = %err, "live query failed");
                        yield Err(err);
                        break;
                    },
                }

                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

fn now_millis() -> i64 {
    jiff::Timestamp::now().as_millisecond()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use mockall::{mock, predicate::eq};
    use reqwest::StatusCode;

    use super::*;
    use crate::{
        store::{
            SqliteMovieStore,
            tests::{MockStore, row, store},
        },
        tmdb::{GenreDto, MovieDetailDto, MovieDto},
    };

    mock! {
        pub Remote {}

        #[async_trait::async_trait]
        impl MovieRemote for Remote {
            async fn trending(&self, page: u32) -> Result<MovieListResponse, TmdbError>;
            async fn now_playing(&self, page: u32) -> Result<MovieListResponse, TmdbError>;
            async fn details(&self, movie_id: i32) -> Result<MovieDetailDto, TmdbError>;
            async fn search(&self, query: &str, page: u32) -> Result<MovieListResponse, TmdbError>;
        }
    }

    pub(crate) fn dto(id: i32, title: &str) -> MovieDto {
        MovieDto {
            id,
            title: title.to_string(),
            overview: Some(format!("{title} overview")),
            poster_path: None,
            backdrop_path: None,
            release_date: Some("2025-05-01".to_string()),
            vote_average: 7.5,
            vote_count: 10,
            popularity: 100.0 - id as f64,
            adult: false,
            genre_ids: None,
        }
    }

    pub(crate) fn page(results: Vec<MovieDto>) -> MovieListResponse {
        let total = results.len() as u32;
        MovieListResponse { page: 1, results, total_pages: 1, total_results: total }
    }

    pub(crate) fn unavailable(path: &str) -> TmdbError {
        TmdbError::Status { status: StatusCode::SERVICE_UNAVAILABLE, path: path.to_string() }
    }

    pub(crate) fn repository(remote: MockRemote, store: SqliteMovieStore) -> MovieRepository {
        MovieRepository::new(Arc::new(remote), Arc::new(store), RepositoryOptions::default())
    }

    fn titles(state: &Resource<Vec<Movie>>) -> Vec<(String, bool)> {
        state
            .data()
            .map(|movies| movies.iter().map(|m| (m.title.clone(), m.is_bookmarked)).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn first_fetch_on_empty_cache_skips_cached_loading() {
        let mut remote = MockRemote::new();
        remote
            .expect_trending()
            .with(eq(1))
            .times(1)
            .returning(|_| Ok(page(vec![dto(1, "A"), dto(2, "B")])));
        let store = store().await;
        let repo = repository(remote, store.clone());

        let states: Vec<_> = repo.trending().collect().await;

        assert_eq!(states.len(), 2);
        assert_eq!(states[0], Resource::loading());
        assert!(matches!(states[1], Resource::Success { .. }));
        assert_eq!(titles(&states[1]), vec![("A".to_string(), false), ("B".to_string(), false)]);

        let stored = store.by_category(Category::Trending).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|m| m.category == "trending" && !m.is_bookmarked));
    }

    #[tokio::test]
    async fn refresh_carries_bookmarks_forward() {
        let mut remote = MockRemote::new();
        remote
            .expect_trending()
            .returning(|_| Ok(page(vec![dto(1, "A"), dto(3, "C")])));
        let store = store().await;
        let mut cached = row(1, "A", Category::Trending, 99.0);
        cached.is_bookmarked = true;
        store.upsert(&cached).await.unwrap();
        let repo = repository(remote, store.clone());

        let states: Vec<_> = repo.trending().collect().await;

        assert_eq!(states.len(), 3);
        assert_eq!(states[0], Resource::loading());
        assert!(matches!(states[1], Resource::Loading { data: Some(_) }));
        assert_eq!(titles(&states[1]), vec![("A".to_string(), true)]);
        assert!(matches!(states[2], Resource::Success { .. }));
        assert_eq!(titles(&states[2]), vec![("A".to_string(), true), ("C".to_string(), false)]);

        assert!(store.get(1).await.unwrap().unwrap().is_bookmarked);
        assert!(!store.get(3).await.unwrap().unwrap().is_bookmarked);
    }

    #[tokio::test]
    async fn bookmark_from_another_listing_is_carried_forward() {
        let mut remote = MockRemote::new();
        remote.expect_now_playing().returning(|_| Ok(page(vec![dto(8, "Shared")])));
        let store = store().await;
        let mut cached = row(8, "Shared", Category::Trending, 1.0);
        cached.is_bookmarked = true;
        store.upsert(&cached).await.unwrap();
        let repo = repository(remote, store.clone());

        let states: Vec<_> = repo.now_playing().collect().await;

        // Nothing was cached under now-playing yet.
        assert_eq!(states.len(), 2);
        assert_eq!(titles(&states[1]), vec![("Shared".to_string(), true)]);
        let stored = store.get(8).await.unwrap().unwrap();
        assert!(stored.is_bookmarked);
        assert_eq!(stored.category, "now_playing");
    }

    #[tokio::test]
    async fn failure_with_cache_falls_back_to_snapshot() {
        let mut remote = MockRemote::new();
        remote.expect_now_playing().returning(|_| Err(unavailable("movie/now_playing")));
        let store = store().await;
        store.upsert(&row(4, "Cached", Category::NowPlaying, 5.0)).await.unwrap();
        let repo = repository(remote, store);

        let states: Vec<_> = repo.now_playing().collect().await;

        assert_eq!(states.len(), 3);
        let snapshot = states[1].data().cloned().unwrap();
        match &states[2] {
            Resource::Error { message, data } => {
                assert!(message.contains("503"), "{message}");
                assert_eq!(data.as_ref(), Some(&snapshot));
            },
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_without_cache_has_no_data() {
        let mut remote = MockRemote::new();
        remote.expect_trending().returning(|_| Err(unavailable("trending/movie/week")));
        let repo = repository(remote, store().await);

        let states: Vec<_> = repo.trending().collect().await;

        assert_eq!(states.len(), 2);
        assert_eq!(states[0], Resource::loading());
        assert!(matches!(states[1], Resource::Error { data: None, .. }));
    }

    #[tokio::test]
    async fn store_failure_becomes_an_error_state() {
        let mut store = MockStore::new();
        store
            .expect_by_category()
            .returning(|_| Err(anyhow::anyhow!("database is locked").into()));
        let repo = MovieRepository::new(
            Arc::new(MockRemote::new()),
            Arc::new(store),
            RepositoryOptions::default(),
        );

        let states: Vec<_> = repo.trending().collect().await;

        assert_eq!(
            states,
            vec![Resource::loading(), Resource::error("database is locked", None)]
        );
    }

    #[tokio::test]
    async fn persist_failure_after_fetch_keeps_cached_fallback() {
        let mut remote = MockRemote::new();
        remote.expect_trending().returning(|_| Ok(page(vec![dto(1, "A")])));
        let mut store = MockStore::new();
        store
            .expect_by_category()
            .returning(|c| Ok(vec![row(1, "A", c, 1.0)]));
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_upsert_many()
            .returning(|_| Err(anyhow::anyhow!("disk full").into()));
        let repo =
            MovieRepository::new(Arc::new(remote), Arc::new(store), RepositoryOptions::default());

        let states: Vec<_> = repo.trending().collect().await;

        assert_eq!(states.len(), 3);
        assert_eq!(states[2].message(), Some("disk full"));
        assert_eq!(titles(&states[2]), vec![("A".to_string(), false)]);
    }

    #[tokio::test]
    async fn purge_option_drops_stale_rows_but_keeps_bookmarks() {
        let mut remote = MockRemote::new();
        remote.expect_trending().returning(|_| Ok(page(vec![dto(3, "Fresh")])));
        let store = store().await;
        let mut kept = row(1, "Kept", Category::Trending, 1.0);
        kept.is_bookmarked = true;
        store.upsert_many(&[kept, row(2, "Stale", Category::Trending, 1.0)]).await.unwrap();
        let repo = MovieRepository::new(
            Arc::new(remote),
            Arc::new(store.clone()),
            RepositoryOptions { purge_stale_on_refresh: true },
        );

        let states: Vec<_> = repo.trending().collect().await;

        assert!(matches!(states.last(), Some(Resource::Success { .. })));
        assert!(store.get(1).await.unwrap().is_some());
        assert!(store.get(2).await.unwrap().is_none());
        assert!(store.get(3).await.unwrap().is_some());
    }

    fn detail(id: i32) -> MovieDetailDto {
        MovieDetailDto {
            id,
            title: "Detailed".to_string(),
            overview: None,
            poster_path: None,
            backdrop_path: None,
            release_date: None,
            vote_average: 8.0,
            vote_count: 1,
            popularity: 3.0,
            runtime: Some(95),
            budget: None,
            revenue: None,
            tagline: Some("Tagline".to_string()),
            status: Some("Released".to_string()),
            genres: Some(vec![GenreDto { id: 18, name: "Drama".to_string() }]),
        }
    }

    #[tokio::test]
    async fn details_keep_category_and_bookmark_of_cached_row() {
        let mut remote = MockRemote::new();
        remote.expect_details().with(eq(9)).returning(|id| Ok(detail(id)));
        let store = store().await;
        let mut cached = row(9, "Listed", Category::NowPlaying, 3.0);
        cached.is_bookmarked = true;
        store.upsert(&cached).await.unwrap();
        let repo = repository(remote, store.clone());

        let states: Vec<_> = repo.movie_details(9).collect().await;

        assert_eq!(states.len(), 3);
        assert_eq!(states[1].data().map(|m| m.title.as_str()), Some("Listed"));
        let movie = states[2].data().unwrap();
        assert!(movie.is_bookmarked);
        assert_eq!(movie.genres, vec!["Drama"]);
        assert_eq!(movie.runtime, Some(95));

        let stored = store.get(9).await.unwrap().unwrap();
        assert_eq!(stored.category, "now_playing");
        assert_eq!(stored.tagline.as_deref(), Some("Tagline"));
    }

    #[tokio::test]
    async fn uncached_details_are_stored_under_detail() {
        let mut remote = MockRemote::new();
        remote.expect_details().returning(|id| Ok(detail(id)));
        let store = store().await;
        let repo = repository(remote, store.clone());

        let states: Vec<_> = repo.movie_details(12).collect().await;

        assert_eq!(states.len(), 2);
        assert_eq!(store.get(12).await.unwrap().unwrap().category, "detail");
    }

    #[tokio::test]
    async fn detail_failure_falls_back_to_cached_row() {
        let mut remote = MockRemote::new();
        remote.expect_details().returning(|_| Err(unavailable("movie/9")));
        let store = store().await;
        store.upsert(&row(9, "Listed", Category::Trending, 3.0)).await.unwrap();
        let repo = repository(remote, store);

        let states: Vec<_> = repo.movie_details(9).collect().await;

        assert!(matches!(
            states.last(),
            Some(Resource::Error { data: Some(m), .. }) if m.title == "Listed"
        ));
    }

    #[tokio::test]
    async fn blank_search_never_touches_the_network() {
        let repo = repository(MockRemote::new(), store().await);

        let states: Vec<_> = repo.search("   ").collect().await;

        assert_eq!(states, vec![Resource::success(Vec::new())]);
    }

    #[tokio::test]
    async fn search_maps_remote_results() {
        let mut remote = MockRemote::new();
        remote
            .expect_search()
            .withf(|query, page| query.to_string() == "dune" && *page == 1)
            .returning(|_, _| Ok(page(vec![dto(20, "Dune")])));
        let repo = repository(remote, store().await);

        let states: Vec<_> = repo.search(" dune ").collect().await;

        assert_eq!(states.len(), 2);
        assert_eq!(titles(&states[1]), vec![("Dune".to_string(), false)]);
    }

    #[tokio::test]
    async fn search_failure_degrades_to_cached_titles() {
        let mut remote = MockRemote::new();
        remote.expect_search().returning(|_, _| Err(unavailable("search/movie")));
        let store = store().await;
        store
            .upsert_many(&[
                row(1, "Dune: Part Two", Category::Trending, 10.0),
                row(2, "Arrival", Category::Trending, 9.0),
            ])
            .await
            .unwrap();
        let repo = repository(remote, store);

        let states: Vec<_> = repo.search("DUNE").collect().await;

        assert!(matches!(states.last(), Some(Resource::Error { .. })));
        assert_eq!(titles(states.last().unwrap()), vec![("Dune: Part Two".to_string(), false)]);
    }

    #[tokio::test]
    async fn search_failure_without_local_match_has_no_data() {
        let mut remote = MockRemote::new();
        remote.expect_search().returning(|_, _| Err(unavailable("search/movie")));
        let repo = repository(remote, store().await);

        let states: Vec<_> = repo.search("nothing").collect().await;

        assert_eq!(states.len(), 2);
        assert!(matches!(states.last(), Some(Resource::Error { data: None, .. })));
    }

    #[tokio::test]
    async fn toggling_is_idempotent_in_pairs_and_ignores_unknown_ids() {
        let store = store().await;
        store.upsert(&row(5, "Five", Category::Trending, 1.0)).await.unwrap();
        let repo = repository(MockRemote::new(), store);

        assert_eq!(repo.toggle_bookmark(404).await.unwrap(), None);
        assert!(!repo.is_bookmarked(404).await.unwrap());

        assert_eq!(repo.toggle_bookmark(5).await.unwrap(), Some(true));
        assert!(repo.is_bookmarked(5).await.unwrap());
        assert_eq!(repo.toggle_bookmark(5).await.unwrap(), Some(false));
        assert!(!repo.is_bookmarked(5).await.unwrap());
    }

    #[tokio::test]
    async fn bookmarked_list_follows_store_changes() {
        let store = store().await;
        store
            .upsert_many(&[
                row(1, "One", Category::Trending, 1.0),
                row(2, "Two", Category::Trending, 1.0),
            ])
            .await
            .unwrap();
        let repo = repository(MockRemote::new(), store);
        let mut live = repo.bookmarked();

        let first = live.next().await.unwrap().unwrap();
        assert!(first.is_empty());

        repo.toggle_bookmark(2).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), live.next())
            .await
            .expect("bookmark update")
            .unwrap()
            .unwrap();
        assert_eq!(next.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2]);
    }

    #[tokio::test]
    async fn live_movie_view_reports_refreshes() {
        let mut remote = MockRemote::new();
        remote.expect_details().returning(|id| Ok(detail(id)));
        let store = store().await;
        let repo = repository(remote, store);
        let mut live = repo.observe_movie(30);

        assert_eq!(live.next().await.unwrap().unwrap(), None);

        let _: Vec<_> = repo.movie_details(30).collect().await;
        let updated = tokio::time::timeout(Duration::from_secs(5), live.next())
            .await
            .expect("movie update")
            .unwrap()
            .unwrap();
        assert_eq!(updated.map(|m| m.title), Some("Detailed".to_string()));
    }
}
