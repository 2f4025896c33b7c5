use serde::Serialize;

/// State of a one-shot fetch as observed by a subscriber.
///
/// `Loading` and `Error` may carry the best data known at that point (a cache
/// snapshot), `Success` always carries the freshly fetched value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Resource<T> {
    Loading { data: Option<T> },
    Success { data: T },
    Error { message: String, data: Option<T> },
}

impl<T> Resource<T> {
    pub fn loading() -> Self {
        Resource::Loading { data: None }
    }

    pub fn cached(data: T) -> Self {
        Resource::Loading { data: Some(data) }
    }

    pub fn success(data: T) -> Self {
        Resource::Success { data }
    }

    pub fn error(message: impl Into<String>, data: Option<T>) -> Self {
        Resource::Error { message: message.into(), data }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Resource::Loading { data } | Resource::Error { data, .. } => data.as_ref(),
            Resource::Success { data } => Some(data),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Resource::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    /// `Success` and `Error` end a fetch sequence.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Resource::Loading { .. })
    }
}
