use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;

use dbdeploy_core::{
    ConnectionDetails, Error, PostgresTranslator, Result, Translator, VendorError, VersionRow,
};

use crate::adapter::{Session, SessionFactory};

mod queries;

/// Hands out PostgreSQL transactions from a pool.
#[derive(Debug, Clone)]
pub struct PostgresSessionFactory {
    pool: PgPool,
}

impl PostgresSessionFactory {
    /// Create a factory using a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url`. Every option in the URL is honoured; the
    /// translator's properties only add to it.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let details = ConnectionDetails::from_url(url)?;
        let options = connect_options(url, &details)?;

        info!(target_db = %details.redacted(), max_connections, "connecting");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(translate)?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SessionFactory for PostgresSessionFactory {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn Session>> {
        let tx = self.pool.begin().await.map_err(translate)?;
        Ok(Box::new(PostgresSession { tx }))
    }
}

struct PostgresSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Session for PostgresSession {
    fn translator(&self) -> &dyn Translator {
        &PostgresTranslator
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        queries::execute(&mut self.tx, sql).await.map_err(translate)
    }

    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool> {
        queries::table_exists(&mut self.tx, schema, table)
            .await
            .map_err(translate)
    }

    async fn fetch_latest_versions(
        &mut self,
        admin_schema: &str,
        data_schema: &str,
    ) -> Result<HashMap<String, i32>> {
        queries::fetch_latest_versions(&mut self.tx, admin_schema, data_schema)
            .await
            .map_err(translate)
    }

    async fn insert_version(&mut self, admin_schema: &str, row: &VersionRow) -> Result<()> {
        queries::insert_version(&mut self.tx, admin_schema, row)
            .await
            .map_err(translate)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(translate)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(translate)
    }
}

fn connect_options(url: &str, details: &ConnectionDetails) -> Result<PgConnectOptions> {
    let mut props = BTreeMap::new();
    PostgresTranslator.fill_properties(&mut props, details);

    let mut options = PgConnectOptions::from_str(url).map_err(translate)?;
    let explicit_sslmode = url
        .split_once('?')
        .is_some_and(|(_, query)| query.split('&').any(|pair| pair.starts_with("sslmode=")));
    if !explicit_sslmode && props.get("sslmode").map(String::as_str) == Some("require") {
        options = options.ssl_mode(PgSslMode::Require);
    }
    Ok(options)
}

/// Driver error to its portable vendor surface. Transport failures carry
/// SQLSTATE class 08 so they classify as connection errors.
fn vendor_error(err: &sqlx::Error) -> VendorError {
    match err {
        sqlx::Error::Database(db) => {
            let vendor = VendorError::new(db.message());
            match db.code() {
                Some(code) => vendor.with_sql_state(code.into_owned()),
                None => vendor,
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => VendorError::new(err.to_string()).with_sql_state("08006"),
        _ => VendorError::new(err.to_string()),
    }
}

fn translate(err: sqlx::Error) -> Error {
    Error::DataAccess(PostgresTranslator.translate(vendor_error(&err)))
}
