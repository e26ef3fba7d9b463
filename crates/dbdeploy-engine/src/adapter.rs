use std::collections::HashMap;

use async_trait::async_trait;

use dbdeploy_core::{Result, Translator, VersionRow};

/// One open database transaction.
///
/// Every failure a session reports has already been classified by its
/// translator, so callers only ever see `Error::DataAccess` for database
/// problems.
#[async_trait]
pub trait Session: Send {
    fn translator(&self) -> &dyn Translator;

    /// Execute a single DDL or DML statement.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool>;

    /// Highest recorded version per `schema:type:name` for both schemas.
    async fn fetch_latest_versions(
        &mut self,
        admin_schema: &str,
        data_schema: &str,
    ) -> Result<HashMap<String, i32>>;

    /// Append one row to the version history table.
    async fn insert_version(&mut self, admin_schema: &str, row: &VersionRow) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Trait implemented by backends that hand out transactions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Returns the engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Start a new transaction on its own connection.
    async fn begin(&self) -> Result<Box<dyn Session>>;
}
