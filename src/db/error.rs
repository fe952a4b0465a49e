use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Open or migration failed; callers should behave as if nothing is stored.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Another process changed the schema under an open handle.
    #[error("schema version changed from {expected} to {found}; handle released")]
    VersionChanged { expected: i64, found: i64 },

    /// Required collections vanished under an open handle; it is released
    /// and the next operation rebuilds the store.
    #[error("required collections missing: {missing}; handle released")]
    SchemaMissing { missing: String },

    #[error("transaction on '{collection}' failed: {source}")]
    Transaction {
        collection: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("collection '{collection}' has no index named '{index}'")]
    UnknownIndex {
        collection: &'static str,
        index: String,
    },

    #[error("record codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn transaction(collection: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| StoreError::Transaction { collection, source }
    }
}
