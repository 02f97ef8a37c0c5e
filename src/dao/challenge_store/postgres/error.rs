use thiserror::Error;

use crate::dao::storage::StorageError;

pub type PgResult<T> = Result<T, PgDaoError>;

/// Errors raised by the Postgres backend.
#[derive(Debug, Error)]
pub enum PgDaoError {
    #[error("failed to connect to postgres")]
    Connect { source: sqlx::Error },
    #[error("failed to run migrations")]
    Migrate { source: sqlx::migrate::MigrateError },
    #[error("query `{context}` failed")]
    Query {
        context: &'static str,
        source: sqlx::Error,
    },
}

impl From<PgDaoError> for StorageError {
    fn from(err: PgDaoError) -> Self {
        match err {
            PgDaoError::Connect { source } => {
                StorageError::unavailable("postgres connection failed", source)
            }
            PgDaoError::Migrate { source } => {
                StorageError::unavailable("postgres migration failed", source)
            }
            PgDaoError::Query { context, source } => StorageError::query(context, source),
        }
    }
}
