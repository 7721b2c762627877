//! vecstore Postgres - PostgreSQL + pgvector storage provider
//!
//! Each collection is a table `<schema>.<name>` with a `vector(<dim>)`
//! column, registered in `<schema>.vector_collections`. Similarity search
//! uses the pgvector operator matching the collection's distance type.

pub mod provider;
pub mod sql;

pub use provider::PostgresProvider;

use vecstore_core::VectorError;

/// Duplicate key or duplicate table
fn is_duplicate(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505" || code == "42P07")
}

/// Map a sqlx error onto the error taxonomy, keeping it as the source
pub(crate) fn classify(err: sqlx::Error, context: impl Into<String>) -> VectorError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => VectorError::connection_failed(context, err),
        _ => VectorError::operation_failed(context, err),
    }
}

/// Like [`classify`], but a duplicate maps to `CollectionExists`
pub(crate) fn classify_create(err: sqlx::Error, collection: &str) -> VectorError {
    if is_duplicate(&err) {
        VectorError::CollectionExists(collection.to_string())
    } else {
        classify(err, format!("failed to create collection {collection}"))
    }
}
