use thiserror::Error;

/// Error type returned by [`Migration::apply`](super::Migration::apply) and
/// [`Migration::revert`](super::Migration::revert).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort a migration run or an administrative rollback.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to create migration ledger: {0}")]
    LedgerBootstrap(#[source] rusqlite::Error),

    #[error("failed to read migration ledger: {0}")]
    LedgerRead(#[source] rusqlite::Error),

    #[error("migration {id} failed: {source}")]
    Apply {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to update ledger for migration {id}: {source}")]
    LedgerWrite {
        id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("transaction for migration {id} failed: {source}")]
    Transaction {
        id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to revert migration {id}: {source}")]
    Revert {
        id: String,
        #[source]
        source: BoxError,
    },

    #[error("migration {0} is registered more than once")]
    Duplicate(String),

    #[error("migration identifier cannot be empty")]
    InvalidId,

    #[error("migration {0} is not registered")]
    Unknown(String),

    #[error("migration {0} has not been applied")]
    NotApplied(String),
}

impl MigrationError {
    /// The migration this error is about, if it concerns a single one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Apply { id, .. }
            | Self::LedgerWrite { id, .. }
            | Self::Transaction { id, .. }
            | Self::Revert { id, .. } => Some(id),
            Self::Duplicate(id) | Self::Unknown(id) | Self::NotApplied(id) => Some(id),
            Self::LedgerBootstrap(_) | Self::LedgerRead(_) | Self::InvalidId => None,
        }
    }
}

impl From<MigrationError> for libris_common::Error {
    fn from(e: MigrationError) -> Self {
        libris_common::Error::Migration(e.to_string())
    }
}
