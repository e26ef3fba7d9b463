use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, warn};

use dbdeploy_core::{ObjectType, Result, VersionRow, ledger_key};

use crate::adapter::{Session, SessionFactory};
use crate::transaction::{Snapshot, SnapshotUndo, TransactionScope};

/// In-memory view of the version history, shared by every worker of a run.
///
/// The snapshot is read once when the run starts and is never re-read.
/// Two processes deploying the same schema at the same time may both
/// decide that a change applies; the second one then appends a duplicate
/// history row. No cross-process lock is taken: throughput is preferred
/// over strict serializability, and statement-level idempotent DDL keeps
/// the outcome correct.
#[derive(Debug, Clone)]
pub struct VersionLedger {
    admin_schema: String,
    snapshot: Snapshot,
}

impl VersionLedger {
    pub fn empty(admin_schema: impl Into<String>) -> Self {
        Self {
            admin_schema: admin_schema.into(),
            snapshot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Load the latest version of every object in `admin_schema` and
    /// `data_schema` with one aggregate query.
    pub async fn load(session: &mut dyn Session, admin_schema: &str, data_schema: &str) -> Result<Self> {
        let versions = session
            .fetch_latest_versions(admin_schema, data_schema)
            .await?;
        debug!(
            admin_schema,
            data_schema,
            entries = versions.len(),
            "loaded version history"
        );
        Ok(Self {
            admin_schema: admin_schema.to_string(),
            snapshot: Arc::new(Mutex::new(versions)),
        })
    }

    pub async fn load_in_new_transaction(
        factory: &dyn SessionFactory,
        admin_schema: &str,
        data_schema: &str,
    ) -> Result<Self> {
        let mut scope = TransactionScope::begin(factory).await?;
        match Self::load(scope.session()?, admin_schema, data_schema).await {
            Ok(ledger) => {
                scope.close().await?;
                Ok(ledger)
            }
            Err(err) => {
                scope.set_rollback_only();
                if let Err(close_err) = scope.close().await {
                    warn!(error = %close_err, "rollback after failed ledger load failed");
                }
                Err(err)
            }
        }
    }

    pub fn admin_schema(&self) -> &str {
        &self.admin_schema
    }

    /// Recorded version, `0` when the object was never applied.
    pub fn get_version(&self, schema: &str, object_type: ObjectType, name: &str) -> i32 {
        let key = ledger_key(schema, object_type, name);
        self.lock().get(&key).copied().unwrap_or(0)
    }

    /// True when nothing is recorded or the recorded version is older than
    /// `version`.
    pub fn applies(&self, schema: &str, object_type: ObjectType, name: &str, version: i32) -> bool {
        let key = ledger_key(schema, object_type, name);
        match self.lock().get(&key) {
            Some(current) => *current < version,
            None => true,
        }
    }

    /// Append a history row inside `scope` and move the snapshot forward.
    /// The snapshot change is undone if `scope` does not commit.
    pub async fn add_version(
        &self,
        scope: &mut TransactionScope,
        schema: &str,
        object_type: ObjectType,
        name: &str,
        version: i32,
    ) -> Result<()> {
        let row = VersionRow {
            schema_name: schema.to_string(),
            object_type,
            object_name: name.to_string(),
            version,
            applied: Utc::now(),
        };
        scope
            .session()?
            .insert_version(&self.admin_schema, &row)
            .await?;

        let key = row.key();
        let previous = self.lock().insert(key.clone(), version);
        scope.record_undo(SnapshotUndo {
            snapshot: Arc::clone(&self.snapshot),
            key,
            previous,
        });
        Ok(())
    }

    /// Append several rows in one transaction.
    pub async fn insert_versions(&self, scope: &mut TransactionScope, rows: &[VersionRow]) -> Result<()> {
        for row in rows {
            self.add_version(
                scope,
                &row.schema_name,
                row.object_type,
                &row.object_name,
                row.version,
            )
            .await?;
        }
        Ok(())
    }

    /// Sorted copy of the snapshot.
    pub fn snapshot(&self) -> BTreeMap<String, i32> {
        self.lock()
            .iter()
            .map(|(key, version)| (key.clone(), *version))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, i32>> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
