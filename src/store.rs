use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
    sea_query::{LikeExpr, OnConflict},
};
use tokio::sync::watch;
use tracing::debug;

use crate::{entities::movie, error::AppResult, models::Category};

const LIKE_ESCAPE: char = '!';

/// Persisted movie table shared by every repository operation.
///
/// Implementations must make single-row writes atomic and bump the
/// [`changes`](MovieStore::changes) counter after every successful write.
#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Rows of a category, most popular first.
    async fn by_category(&self, category: Category) -> AppResult<Vec<movie::Model>>;

    /// Bookmarked rows, most recently updated first.
    async fn bookmarked(&self) -> AppResult<Vec<movie::Model>>;

    async fn get(&self, id: i32) -> AppResult<Option<movie::Model>>;

    /// Case-insensitive title substring match, most popular first.
    async fn search_titles(&self, query: &str) -> AppResult<Vec<movie::Model>>;

    async fn upsert_many(&self, movies: &[movie::Model]) -> AppResult<()>;

    async fn upsert(&self, movie: &movie::Model) -> AppResult<()>;

    /// Flips the bookmark flag and returns the new value, or `None` when no
    /// row has this id.
    async fn toggle_bookmark(&self, id: i32) -> AppResult<Option<bool>>;

    /// Deletes non-bookmarked rows of a category.
    async fn delete_stale(&self, category: Category) -> AppResult<u64>;

    async fn count_by_category(&self, category: Category) -> AppResult<u64>;

    fn changes(&self) -> watch::Receiver<u64>;
}

#[derive(Clone)]
pub struct SqliteMovieStore {
    db: DatabaseConnection,
    changes: Arc<watch::Sender<u64>>,
}

impl SqliteMovieStore {
    pub fn new(db: DatabaseConnection) -> Self {
        let (changes, _) = watch::channel(0);
        Self { db, changes: Arc::new(changes) }
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }
}

/// `%query%` with the query's own wildcards matched literally.
fn contains_pattern(query: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape(LIKE_ESCAPE)
}

#[async_trait]
impl MovieStore for SqliteMovieStore {
    async fn by_category(&self, category: Category) -> AppResult<Vec<movie::Model>> {
        let rows = movie::Entity::find()
            .filter(movie::Column::Category.eq(category.as_str()))
            .order_by_desc(movie::Column::Popularity)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn bookmarked(&self) -> AppResult<Vec<movie::Model>> {
        let rows = movie::Entity::find()
            .filter(movie::Column::IsBookmarked.eq(true))
            .order_by_desc(movie::Column::UpdatedAt)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn get(&self, id: i32) -> AppResult<Option<movie::Model>> {
        Ok(movie::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn search_titles(&self, query: &str) -> AppResult<Vec<movie::Model>> {
        let rows = movie::Entity::find()
            // SQLite's LIKE folds ASCII letters only; other scripts match case-sensitively.
            .filter(movie::Column::Title.like(contains_pattern(query)))
            .order_by_desc(movie::Column::Popularity)
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn upsert_many(&self, movies: &[movie::Model]) -> AppResult<()> {
        if movies.is_empty() {
            return Ok(());
        }

        movie::Entity::insert_many(movies.iter().map(active_model))
            .on_conflict(upsert_conflict())
            .exec_without_returning(&self.db)
            .await?;

        debug!(count = movies.len(), "upserted movies");
        self.notify();
        Ok(())
    }

    async fn upsert(&self, movie: &movie::Model) -> AppResult<()> {
        movie::Entity::insert(active_model(movie))
            .on_conflict(upsert_conflict())
            .exec_without_returning(&self.db)
            .await?;

        self.notify();
        Ok(())
    }

    async fn toggle_bookmark(&self, id: i32) -> AppResult<Option<bool>> {
        let txn = self.db.begin().await?;

        let Some(row) = movie::Entity::find_by_id(id).one(&txn).await? else {
            debug!(movie_id = id, "bookmark toggle on uncached movie ignored");
            return Ok(None);
        };

        let bookmarked = !row.is_bookmarked;
        let mut model: movie::ActiveModel = row.into();
        model.is_bookmarked = Set(bookmarked);
        model.update(&txn).await?;
        txn.commit().await?;

        self.notify();
        Ok(Some(bookmarked))
    }

    async fn delete_stale(&self, category: Category) -> AppResult<u64> {
        let res = movie::Entity::delete_many()
            .filter(movie::Column::Category.eq(category.as_str()))
            .filter(movie::Column::IsBookmarked.eq(false))
            .exec(&self.db)
            .await?;

        if res.rows_affected > 0 {
            self.notify();
        }
        Ok(res.rows_affected)
    }

    async fn count_by_category(&self, category: Category) -> AppResult<u64> {
        let count = movie::Entity::find()
            .filter(movie::Column::Category.eq(category.as_str()))
            .count(&self.db)
            .await?;
        Ok(count)
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

fn active_model(row: &movie::Model) -> movie::ActiveModel {
    movie::ActiveModel {
        id: Set(row.id),
        title: Set(row.title.clone()),
        overview: Set(row.overview.clone()),
        poster_path: Set(row.poster_path.clone()),
        backdrop_path: Set(row.backdrop_path.clone()),
        release_date: Set(row.release_date.clone()),
        vote_average: Set(row.vote_average),
        vote_count: Set(row.vote_count),
        popularity: Set(row.popularity),
        is_bookmarked: Set(row.is_bookmarked),
        category: Set(row.category.clone()),
        runtime: Set(row.runtime),
        tagline: Set(row.tagline.clone()),
        genres: Set(row.genres.clone()),
        updated_at: Set(row.updated_at),
    }
}

fn upsert_conflict() -> OnConflict {
    OnConflict::column(movie::Column::Id)
        .update_columns([
            movie::Column::Title,
            movie::Column::Overview,
            movie::Column::PosterPath,
            movie::Column::BackdropPath,
            movie::Column::ReleaseDate,
            movie::Column::VoteAverage,
            movie::Column::VoteCount,
            movie::Column::Popularity,
            movie::Column::IsBookmarked,
            movie::Column::Category,
            movie::Column::Runtime,
            movie::Column::Tagline,
            movie::Column::Genres,
            movie::Column::UpdatedAt,
        ])
        .to_owned()
}
