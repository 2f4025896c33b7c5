//! Conversions between the TMDB wire shapes, the cached row and the domain
//! movie. Everything here is pure; callers supply the timestamp.

use crate::{
    entities::movie,
    models::Movie,
    tmdb::{MovieDetailDto, MovieDto},
};

const GENRE_SEPARATOR: &str = ",";

pub fn list_item_to_row(
    dto: MovieDto,
    category: &str,
    is_bookmarked: bool,
    updated_at: i64,
) -> movie::Model {
    movie::Model {
        id: dto.id,
        title: dto.title,
        overview: dto.overview.unwrap_or_default(),
        poster_path: dto.poster_path,
        backdrop_path: dto.backdrop_path,
        release_date: dto.release_date,
        vote_average: dto.vote_average,
        vote_count: dto.vote_count,
        popularity: dto.popularity,
        is_bookmarked,
        category: category.to_string(),
        runtime: None,
        tagline: None,
        genres: None,
        updated_at,
    }
}

pub fn detail_to_row(
    dto: MovieDetailDto,
    category: &str,
    is_bookmarked: bool,
    updated_at: i64,
) -> movie::Model {
    let genres = dto.genres.map(|g| g.into_iter().map(|g| g.name).collect::<Vec<_>>());
    movie::Model {
        id: dto.id,
        title: dto.title,
        overview: dto.overview.unwrap_or_default(),
        poster_path: dto.poster_path,
        backdrop_path: dto.backdrop_path,
        release_date: dto.release_date,
        vote_average: dto.vote_average,
        vote_count: dto.vote_count,
        popularity: dto.popularity,
        is_bookmarked,
        category: category.to_string(),
        runtime: dto.runtime,
        tagline: dto.tagline,
        genres: genres.as_deref().and_then(join_genres),
        updated_at,
    }
}

/// Assumes genre names never contain the separator.
pub fn join_genres(genres: &[String]) -> Option<String> {
    if genres.is_empty() {
        return None;
    }
    Some(genres.join(GENRE_SEPARATOR))
}

pub fn split_genres(genres: Option<&str>) -> Vec<String> {
    genres
        .map(|g| {
            g.split(GENRE_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl From<movie::Model> for Movie {
    fn from(row: movie::Model) -> Self {
        let genres = split_genres(row.genres.as_deref());
        Self {
            id: row.id,
            title: row.title,
            overview: row.overview,
            poster_path: row.poster_path,
            backdrop_path: row.backdrop_path,
            release_date: row.release_date,
            vote_average: row.vote_average,
            vote_count: row.vote_count,
            popularity: row.popularity,
            is_bookmarked: row.is_bookmarked,
            runtime: row.runtime,
            tagline: row.tagline,
            genres,
        }
    }
}

impl From<MovieDto> for Movie {
    fn from(dto: MovieDto) -> Self {
        Self {
            id: dto.id,
            title: dto.title,
            overview: dto.overview.unwrap_or_default(),
            poster_path: dto.poster_path,
            backdrop_path: dto.backdrop_path,
            release_date: dto.release_date,
            vote_average: dto.vote_average,
            vote_count: dto.vote_count,
            popularity: dto.popularity,
            is_bookmarked: false,
            runtime: None,
            tagline: None,
            genres: Vec::new(),
        }
    }
}

pub fn rows_to_domain(rows: Vec<movie::Model>) -> Vec<Movie> {
    rows.into_iter().map(Movie::from).collect()
}
