use crate::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("catalog session is not open")]
    SessionClosed,

    #[error("unexpected value in catalog column {column}: {value}")]
    UnexpectedValue { column: &'static str, value: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
