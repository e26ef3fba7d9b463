//! Unit of work around a single object's apply step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use dbdeploy_core::{Error, Result};

use crate::adapter::{Session, SessionFactory};

pub(crate) type Snapshot = Arc<Mutex<HashMap<String, i32>>>;

/// Snapshot value to restore if the transaction does not commit.
#[derive(Debug)]
pub(crate) struct SnapshotUndo {
    pub(crate) snapshot: Snapshot,
    pub(crate) key: String,
    pub(crate) previous: Option<i32>,
}

impl SnapshotUndo {
    fn revert(self) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        match self.previous {
            Some(version) => snapshot.insert(self.key, version),
            None => snapshot.remove(&self.key),
        };
    }
}

/// Begin/commit/rollback-only scope over one [`Session`].
///
/// `close` commits unless the scope was marked rollback-only. A scope that
/// is dropped without being closed rolls back: the session is discarded
/// and any ledger snapshot change made through it is undone.
pub struct TransactionScope {
    session: Option<Box<dyn Session>>,
    rollback_only: bool,
    undo: Vec<SnapshotUndo>,
}

impl TransactionScope {
    pub async fn begin(factory: &dyn SessionFactory) -> Result<Self> {
        let session = factory.begin().await?;
        Ok(Self::new(session))
    }

    pub fn new(session: Box<dyn Session>) -> Self {
        Self {
            session: Some(session),
            rollback_only: false,
            undo: Vec::new(),
        }
    }

    pub fn session(&mut self) -> Result<&mut dyn Session> {
        match self.session.as_mut() {
            Some(session) => Ok(session.as_mut()),
            None => Err(Error::Unsupported("transaction already closed".to_string())),
        }
    }

    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub(crate) fn record_undo(&mut self, undo: SnapshotUndo) {
        self.undo.push(undo);
    }

    /// Commit, or roll back when marked rollback-only.
    pub async fn close(mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        if self.rollback_only {
            debug!("rolling back transaction");
            self.revert_snapshot();
            return session.rollback().await;
        }

        match session.commit().await {
            Ok(()) => {
                self.undo.clear();
                Ok(())
            }
            Err(err) => {
                self.revert_snapshot();
                Err(err)
            }
        }
    }

    fn revert_snapshot(&mut self) {
        for undo in self.undo.drain(..).rev() {
            undo.revert();
        }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("transaction scope dropped without close, rolling back");
            self.revert_snapshot();
        }
    }
}
