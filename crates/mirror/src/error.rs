use thiserror::Error;

/// Result type alias for replica operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`LocalDb`](crate::LocalDb).
///
/// Transport failures during mirroring do not show up here for mutations:
/// writes keep succeeding locally and the mirror moves to `Disconnected`.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] tarn_core::Error),
    #[error("snapshot of table {table} failed after {attempts} attempts")]
    Snapshot { table: String, attempts: u32 },
    #[error("mutation issued from inside a change callback")]
    ReentrantMutation,
    #[error("transport error: {0}")]
    Transport(#[from] crate::channel::TransportError),
    #[error("replica is closed")]
    Closed,
}

impl Error {
    /// The core store error, if this is one.
    pub fn as_store(&self) -> Option<&tarn_core::Error> {
        match self {
            Error::Store(e) => Some(e),
            _ => None,
        }
    }
}
