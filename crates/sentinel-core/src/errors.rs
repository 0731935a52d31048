/// Core error type for the notification sentinel.
///
/// Adapter crates map their transport errors into this type so the poll
/// cycle can decide what to contain and what to short-circuit on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dedup store error: {0}")]
    Storage(String),

    #[error("not authenticated against the source site")]
    NotAuthenticated,

    #[error("unexpected http status {status}")]
    Http { status: u16 },

    #[error("external error: {0}")]
    External(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
