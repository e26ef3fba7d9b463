//! In-memory backend for tests.
//!
//! [`MemoryDatabase`] implements the session seam with real transaction
//! buffering: statements and history rows written in a session only become
//! visible on commit. Faults can be scripted to fail matching statements
//! with a chosen vendor error, which the configured translator classifies
//! like a real driver error would be.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use dbdeploy_core::ledger::VERSION_HISTORY;
use dbdeploy_core::{
    DerbyTranslator, Error, ObjectType, Result, Translator, VendorError, VersionRow, ledger_key,
};

use crate::adapter::{Session, SessionFactory};

/// Fails statements containing `pattern` (every statement when `None`)
/// with `error`, `times` times.
#[derive(Debug, Clone)]
pub struct Fault {
    pub pattern: Option<String>,
    pub error: VendorError,
    pub times: u32,
}

impl Fault {
    pub fn always(error: VendorError) -> Self {
        Self {
            pattern: None,
            error,
            times: u32::MAX,
        }
    }

    pub fn times(error: VendorError, times: u32) -> Self {
        Self {
            pattern: None,
            error,
            times,
        }
    }

    pub fn matching(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Qualified table name to its column names.
    tables: BTreeMap<String, BTreeSet<String>>,
    statements: Vec<String>,
    history: Vec<VersionRow>,
    faults: Vec<Fault>,
    begins: u32,
    commits: u32,
    rollbacks: u32,
}

impl MemoryState {
    fn take_fault(&mut self, sql: &str) -> Option<VendorError> {
        let fault = self.faults.iter_mut().find(|fault| {
            fault.times > 0
                && fault
                    .pattern
                    .as_deref()
                    .is_none_or(|pattern| sql.contains(pattern))
        })?;
        fault.times -= 1;
        Some(fault.error.clone())
    }
}

/// Shared in-memory database. Clones point at the same state.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    translator: Arc<dyn Translator>,
    latency: Duration,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Speaks the embedded (Derby) dialect.
    pub fn new() -> Self {
        Self::with_translator(Arc::new(DerbyTranslator))
    }

    pub fn with_translator(translator: Arc<dyn Translator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            translator,
            latency: Duration::ZERO,
        }
    }

    /// Pause inside every `execute`, so concurrent workers interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_fault(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Committed statements in commit order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn history(&self) -> Vec<VersionRow> {
        self.lock().history.clone()
    }

    pub fn history_for(&self, schema: &str, object_type: ObjectType, name: &str) -> Vec<i32> {
        self.lock()
            .history
            .iter()
            .filter(|row| {
                row.schema_name == schema && row.object_type == object_type && row.object_name == name
            })
            .map(|row| row.version)
            .collect()
    }

    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        self.lock().tables.contains_key(&format!("{schema}.{table}"))
    }

    pub fn has_column(&self, schema: &str, table: &str, column: &str) -> bool {
        self.lock()
            .tables
            .get(&format!("{schema}.{table}"))
            .is_some_and(|columns| columns.contains(column))
    }

    pub fn begins(&self) -> u32 {
        self.lock().begins
    }

    pub fn commits(&self) -> u32 {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> u32 {
        self.lock().rollbacks
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionFactory for MemoryDatabase {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn Session>> {
        self.lock().begins += 1;
        Ok(Box::new(MemorySession {
            database: self.clone(),
            statements: Vec::new(),
            created: BTreeMap::new(),
            added: BTreeMap::new(),
            dropped: BTreeSet::new(),
            history: Vec::new(),
        }))
    }
}

struct MemorySession {
    database: MemoryDatabase,
    statements: Vec<String>,
    created: BTreeMap<String, BTreeSet<String>>,
    /// Columns added to tables committed before this session.
    added: BTreeMap<String, BTreeSet<String>>,
    dropped: BTreeSet<String>,
    history: Vec<VersionRow>,
}

impl MemorySession {
    fn fail(&self, vendor: VendorError) -> Error {
        Error::DataAccess(self.database.translator.translate(vendor))
    }

    fn table_visible(&self, state: &MemoryState, qualified: &str) -> bool {
        self.created.contains_key(qualified)
            || (state.tables.contains_key(qualified) && !self.dropped.contains(qualified))
    }

    fn column_visible(&self, state: &MemoryState, qualified: &str, column: &str) -> bool {
        let has = |tables: &BTreeMap<String, BTreeSet<String>>| {
            tables
                .get(qualified)
                .is_some_and(|columns| columns.contains(column))
        };
        has(&self.created)
            || has(&self.added)
            || (has(&state.tables) && !self.dropped.contains(qualified))
    }
}

/// Column names declared in a `CREATE TABLE` statement, constraints excluded.
fn declared_columns(sql: &str) -> BTreeSet<String> {
    let (Some(open), Some(close)) = (sql.find('('), sql.rfind(')')) else {
        return BTreeSet::new();
    };
    sql[open + 1..close]
        .split(", ")
        .filter(|part| !part.starts_with("CONSTRAINT "))
        .filter_map(|part| part.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Table and column of `ALTER TABLE t ADD COLUMN c ...`.
fn added_column(sql: &str) -> Option<(&str, &str)> {
    let table = object_name(sql, "ALTER TABLE ")?;
    let (_, rest) = sql.split_once(" ADD COLUMN ")?;
    let column = rest.split_whitespace().next()?;
    Some((table, column))
}

/// Name following `prefix` up to the first space or parenthesis.
fn object_name<'a>(sql: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = sql.strip_prefix(prefix)?;
    let end = rest.find([' ', '(']).unwrap_or(rest.len());
    Some(&rest[..end])
}

#[async_trait]
impl Session for MemorySession {
    fn translator(&self) -> &dyn Translator {
        self.database.translator.as_ref()
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        if !self.database.latency.is_zero() {
            tokio::time::sleep(self.database.latency).await;
        }

        let mut state = self.database.lock();
        if let Some(vendor) = state.take_fault(sql) {
            drop(state);
            return Err(self.fail(vendor));
        }

        if let Some(table) = object_name(sql, "CREATE TABLE ") {
            if self.table_visible(&state, table) {
                drop(state);
                return Err(self.fail(
                    VendorError::new(format!("Table '{table}' already exists"))
                        .with_sql_state("X0Y32")
                        .with_code(-601),
                ));
            }
            self.created.insert(table.to_string(), declared_columns(sql));
        } else if let Some((table, column)) = added_column(sql) {
            if !self.table_visible(&state, table) {
                drop(state);
                return Err(self.fail(
                    VendorError::new(format!("Table '{table}' does not exist"))
                        .with_sql_state("42X05")
                        .with_code(-204),
                ));
            }
            if self.column_visible(&state, table, column) {
                drop(state);
                return Err(self.fail(
                    VendorError::new(format!("Column '{column}' already exists in '{table}'"))
                        .with_sql_state("X0Y32")
                        .with_code(-612),
                ));
            }
            match self.created.get_mut(table) {
                Some(columns) => {
                    columns.insert(column.to_string());
                }
                None => {
                    self.added
                        .entry(table.to_string())
                        .or_default()
                        .insert(column.to_string());
                }
            }
        } else if let Some(table) = object_name(sql, "DROP TABLE ") {
            if !self.table_visible(&state, table) {
                drop(state);
                return Err(self.fail(
                    VendorError::new(format!("Table '{table}' does not exist"))
                        .with_sql_state("42X05")
                        .with_code(-204),
                ));
            }
            if self.created.remove(table).is_none() {
                self.added.remove(table);
                self.dropped.insert(table.to_string());
            }
        }

        self.statements.push(sql.to_string());
        Ok(())
    }

    async fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool> {
        let state = self.database.lock();
        Ok(self.table_visible(&state, &format!("{schema}.{table}")))
    }

    async fn fetch_latest_versions(
        &mut self,
        admin_schema: &str,
        data_schema: &str,
    ) -> Result<HashMap<String, i32>> {
        let state = self.database.lock();
        let history_table = format!("{admin_schema}.{VERSION_HISTORY}");
        if !self.table_visible(&state, &history_table) {
            drop(state);
            return Err(self.fail(
                VendorError::new(format!("Table '{history_table}' does not exist"))
                    .with_sql_state("42X05")
                    .with_code(-204),
            ));
        }

        let mut latest = HashMap::new();
        for row in state.history.iter().chain(self.history.iter()) {
            if row.schema_name != admin_schema && row.schema_name != data_schema {
                continue;
            }
            let key = ledger_key(&row.schema_name, row.object_type, &row.object_name);
            let entry = latest.entry(key).or_insert(row.version);
            *entry = (*entry).max(row.version);
        }
        Ok(latest)
    }

    async fn insert_version(&mut self, _admin_schema: &str, row: &VersionRow) -> Result<()> {
        let state = self.database.lock();
        let duplicate = state.history.iter().chain(self.history.iter()).any(|existing| {
            existing.schema_name == row.schema_name
                && existing.object_type == row.object_type
                && existing.object_name == row.object_name
                && existing.version == row.version
        });
        drop(state);

        if duplicate {
            return Err(self.fail(
                VendorError::new(format!("duplicate key in {VERSION_HISTORY}: {}", row.key()))
                    .with_sql_state("23505")
                    .with_code(-803),
            ));
        }
        self.history.push(row.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.database.lock();
        for table in &self.dropped {
            state.tables.remove(table);
        }
        for (table, columns) in &self.added {
            state
                .tables
                .entry(table.clone())
                .or_default()
                .extend(columns.iter().cloned());
        }
        state
            .tables
            .extend(self.created.iter().map(|(table, columns)| (table.clone(), columns.clone())));
        state.statements.extend(self.statements.iter().cloned());
        state.history.extend(self.history.iter().cloned());
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.database.lock().rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_names() {
        assert_eq!(
            object_name("CREATE TABLE FHIRDATA.PATIENT (ID BIGINT)", "CREATE TABLE "),
            Some("FHIRDATA.PATIENT")
        );
        assert_eq!(object_name("DROP TABLE A.B", "DROP TABLE "), Some("A.B"));
        assert_eq!(object_name("CREATE VIEW A.B AS SELECT 1", "CREATE TABLE "), None);
    }

    #[test]
    fn parses_table_columns() {
        let columns = declared_columns(
            "CREATE TABLE A.T (ID BIGINT NOT NULL, NAME VARCHAR(64), CONSTRAINT PK_T PRIMARY KEY (ID))",
        );
        assert_eq!(
            columns.into_iter().collect::<Vec<_>>(),
            vec!["ID".to_string(), "NAME".to_string()]
        );
        assert_eq!(
            added_column("ALTER TABLE A.T ADD COLUMN UPDATED TIMESTAMP"),
            Some(("A.T", "UPDATED"))
        );
    }
}
