//! Catalog extraction - read TimescaleDB objects back out of a live database.
//!
//! This is the reverse of the model: each extractor queries the catalog of a
//! connected database and returns one Info record per object, keyed by
//! [`QualifiedName`]. Used to reverse-engineer an existing schema.
//!
//! Extractors borrow a [`CatalogSession`] and leave it the way they found it:
//! a closed session is opened for the query batch and closed again before
//! returning (on success and on failure), an open one stays open. A failed
//! query aborts the extractor; no partial results are returned.
//!
//! ```ignore
//! let mut session = PgSession::new(pg_config);
//! let hypertables = extract_hypertables(&mut session, &Config::default()).await?;
//! assert!(!session.is_open());
//! ```

mod continuous_aggregate;
mod continuous_aggregate_policy;
mod hypertable;
mod reorder_policy;

pub use continuous_aggregate::{ContinuousAggregateInfo, extract_continuous_aggregates};
pub use continuous_aggregate_policy::{
    ContinuousAggregatePolicyInfo, extract_continuous_aggregate_policies,
};
pub use hypertable::{HypertableInfo, extract_hypertables};
pub use reorder_policy::{ReorderPolicyInfo, extract_reorder_policies};

use crate::{Config, Error, Result};
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::Instrument;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `schema.name` of a catalog object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A database session the extractors can open, query and close.
///
/// Implemented by [`PgSession`].
pub trait CatalogSession: Send + Sync {
    fn is_open(&self) -> bool;

    fn open(&mut self) -> BoxFuture<'_, Result<()>>;

    fn close(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Execute a query, returning all rows. Fails with
    /// [`Error::SessionClosed`] if the session isn't open.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Result<Vec<Row>>>;
}

/// Opens `session` if needed. Returns true if this call opened it.
async fn begin<S: CatalogSession + ?Sized>(session: &mut S) -> Result<bool> {
    if session.is_open() {
        return Ok(false);
    }
    session.open().await?;
    Ok(true)
}

/// Closes `session` if [`begin`] opened it, then hands back `result`.
///
/// The query error wins over a close error.
async fn finish<S: CatalogSession + ?Sized, T>(
    session: &mut S,
    opened: bool,
    result: Result<T>,
) -> Result<T> {
    if !opened {
        return result;
    }
    let closed = session.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            tracing::warn!(error = %close_err, "failed to close catalog session after error");
            Err(e)
        }
    }
}

/// Schemas owned by TimescaleDB itself. Never extracted.
fn is_internal_schema(schema: &str) -> bool {
    schema.starts_with("_timescaledb")
        || schema == "timescaledb_information"
        || schema == "timescaledb_experimental"
}

fn wanted(config: &Config, schema: &str) -> bool {
    !is_internal_schema(schema) && config.includes_schema(schema)
}

/// Everything the extractors read, from one session.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub hypertables: IndexMap<QualifiedName, HypertableInfo>,
    pub continuous_aggregates: IndexMap<QualifiedName, ContinuousAggregateInfo>,
    pub continuous_aggregate_policies: IndexMap<QualifiedName, ContinuousAggregatePolicyInfo>,
    pub reorder_policies: IndexMap<QualifiedName, ReorderPolicyInfo>,
}

/// Run all four extractors in one open/close cycle.
pub async fn read_catalog<S: CatalogSession + ?Sized>(
    session: &mut S,
    config: &Config,
) -> Result<CatalogSnapshot> {
    let opened = begin(session).await?;
    let result = read_all(&*session, config).await;
    finish(session, opened, result).await
}

async fn read_all<S: CatalogSession + ?Sized>(
    session: &S,
    config: &Config,
) -> Result<CatalogSnapshot> {
    Ok(CatalogSnapshot {
        hypertables: hypertable::read(session, config).await?,
        continuous_aggregates: continuous_aggregate::read(session, config).await?,
        continuous_aggregate_policies: continuous_aggregate_policy::read(session, config).await?,
        reorder_policies: reorder_policy::read(session, config).await?,
    })
}

enum SessionSource {
    Config(tokio_postgres::Config),
    Pool(deadpool_postgres::Pool),
}

enum SessionClient {
    Direct {
        client: Client,
        connection: Option<tokio::task::JoinHandle<()>>,
    },
    Pooled(deadpool_postgres::Object),
}

impl SessionClient {
    fn client(&self) -> &Client {
        match self {
            SessionClient::Direct { client, .. } => client,
            SessionClient::Pooled(object) => {
                let client: &Client = object;
                client
            }
        }
    }
}

/// A [`CatalogSession`] over tokio-postgres.
///
/// Opens connections either directly from a `tokio_postgres::Config` or by
/// checking one out of a deadpool pool; closing drops the client (or returns
/// it to the pool). All queries are logged via tracing.
pub struct PgSession {
    source: SessionSource,
    client: Option<SessionClient>,
}

impl PgSession {
    /// A closed session that connects with `config` when opened.
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self {
            source: SessionSource::Config(config),
            client: None,
        }
    }

    /// A closed session that checks a connection out of `pool` when opened.
    pub fn from_pool(pool: deadpool_postgres::Pool) -> Self {
        Self {
            source: SessionSource::Pool(pool),
            client: None,
        }
    }

    /// An already open session. The connection future must already be
    /// driven by the caller; `config` is used if the session is reopened.
    pub fn from_client(config: tokio_postgres::Config, client: Client) -> Self {
        Self {
            source: SessionSource::Config(config),
            client: Some(SessionClient::Direct {
                client,
                connection: None,
            }),
        }
    }
}

impl CatalogSession for PgSession {
    fn is_open(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.client().is_closed())
    }

    fn open(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let client = match &self.source {
                SessionSource::Config(config) => {
                    let (client, connection) = config.connect(NoTls).await?;
                    let connection = tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            tracing::warn!(error = %e, "catalog connection error");
                        }
                    });
                    SessionClient::Direct {
                        client,
                        connection: Some(connection),
                    }
                }
                SessionSource::Pool(pool) => SessionClient::Pooled(pool.get().await?),
            };
            tracing::debug!("opened catalog session");
            self.client = Some(client);
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match self.client.take() {
                Some(SessionClient::Direct { client, connection }) => {
                    drop(client);
                    if let Some(connection) = connection {
                        if let Err(e) = connection.await {
                            tracing::warn!(error = %e, "catalog connection task failed");
                        }
                    }
                }
                Some(SessionClient::Pooled(object)) => drop(object),
                None => {}
            }
            tracing::debug!("closed catalog session");
            Ok(())
        })
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a (dyn ToSql + Sync)],
    ) -> BoxFuture<'a, Result<Vec<Row>>> {
        Box::pin(async move {
            let Some(client) = &self.client else {
                return Err(Error::SessionClosed);
            };
            let span = tracing::debug_span!(
                "db.query",
                sql = %sql,
                params = params.len(),
                rows = tracing::field::Empty,
            );
            let rows = client
                .client()
                .query(sql, params)
                .instrument(span.clone())
                .await?;
            span.record("rows", rows.len());
            Ok(rows)
        })
    }
}
