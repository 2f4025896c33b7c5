use jiff::civil::Date;
use serde::{Serialize, Serializer, ser::SerializeStruct};

pub const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/";
pub const DEFAULT_POSTER_SIZE: &str = "w500";
pub const DEFAULT_BACKDROP_SIZE: &str = "w780";

/// Local partition label of a cached movie row.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Trending,
    NowPlaying,
    Detail,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Trending => "trending",
            Category::NowPlaying => "now_playing",
            Category::Detail => "detail",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A movie as presented to consumers of the repository. Serializes with its
/// derived display fields so clients need no knowledge of TMDB image paths.
#[derive(Clone, Debug, PartialEq)]
pub struct Movie {
    pub id: i32,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f64,
    pub vote_count: i32,
    pub popularity: f64,
    pub is_bookmarked: bool,
    pub runtime: Option<i32>,
    pub tagline: Option<String>,
    pub genres: Vec<String>,
}

impl Movie {
    pub fn poster_url(&self, size: &str) -> Option<String> {
        self.poster_path.as_deref().map(|path| image_url(size, path))
    }

    pub fn backdrop_url(&self, size: &str) -> Option<String> {
        self.backdrop_path.as_deref().map(|path| image_url(size, path))
    }

    /// Year of the release date. Falls back to the leading four digits when
    /// TMDB sends a partial date such as `2025` or `2025-06`.
    pub fn release_year(&self) -> Option<i16> {
        let raw = self.release_date.as_deref()?.trim();
        if let Ok(date) = raw.parse::<Date>() {
            return Some(date.year());
        }
        raw.get(..4).filter(|y| y.bytes().all(|b| b.is_ascii_digit()))?.parse().ok()
    }

    pub fn formatted_rating(&self) -> String {
        format!("{:.1}", self.vote_average)
    }

    /// Runtime as `2h 15m`, or `45m` under an hour.
    pub fn formatted_runtime(&self) -> Option<String> {
        let runtime = self.runtime?;
        let (hours, minutes) = (runtime / 60, runtime % 60);
        Some(if hours > 0 { format!("{hours}h {minutes}m") } else { format!("{minutes}m") })
    }
}

impl Serialize for Movie {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Movie", 18)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("title", &self.title)?;
        s.serialize_field("overview", &self.overview)?;
        s.serialize_field("poster_path", &self.poster_path)?;
        s.serialize_field("backdrop_path", &self.backdrop_path)?;
        s.serialize_field("release_date", &self.release_date)?;
        s.serialize_field("vote_average", &self.vote_average)?;
        s.serialize_field("vote_count", &self.vote_count)?;
        s.serialize_field("popularity", &self.popularity)?;
        s.serialize_field("is_bookmarked", &self.is_bookmarked)?;
        s.serialize_field("runtime", &self.runtime)?;
        s.serialize_field("tagline", &self.tagline)?;
        s.serialize_field("genres", &self.genres)?;
        s.serialize_field("poster_url", &self.poster_url(DEFAULT_POSTER_SIZE))?;
        s.serialize_field("backdrop_url", &self.backdrop_url(DEFAULT_BACKDROP_SIZE))?;
        s.serialize_field("release_year", &self.release_year())?;
        s.serialize_field("rating", &self.formatted_rating())?;
        s.serialize_field("runtime_text", &self.formatted_runtime())?;
        s.end()
    }
}

pub fn image_url(size: &str, path: &str) -> String {
    format!("{IMAGE_BASE_URL}{size}{path}")
}
