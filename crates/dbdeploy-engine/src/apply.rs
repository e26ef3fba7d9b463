//! Per-object apply, versioned apply, drop and grant.
//!
//! Groups never emit DDL themselves: each operation fans out to the
//! members, in declaration order (reverse order for drop). Groups are never
//! recorded in the ledger; their members are.

use tracing::{debug, info};

use dbdeploy_core::{DatabaseObject, ObjectId, PhysicalModel, Result};

use crate::ledger::VersionLedger;
use crate::transaction::TransactionScope;

/// Borrowed view of one object in its model.
#[derive(Debug, Clone, Copy)]
pub struct ObjectHandle<'a> {
    model: &'a PhysicalModel,
    id: ObjectId,
}

impl<'a> ObjectHandle<'a> {
    pub fn new(model: &'a PhysicalModel, id: ObjectId) -> Self {
        Self { model, id }
    }

    pub fn object(&self) -> &'a DatabaseObject {
        self.model.get(self.id)
    }

    fn members(&self) -> impl DoubleEndedIterator<Item = &'a DatabaseObject> + 'a {
        let model = self.model;
        self.object().members().iter().map(move |id| model.get(*id))
    }

    /// Apply the DDL without consulting the ledger. `prior_version` is the
    /// version currently deployed, `0` for a fresh install.
    pub async fn apply(&self, prior_version: i32, scope: &mut TransactionScope) -> Result<()> {
        let object = self.object();
        if object.is_group() {
            for member in self.members() {
                apply_single(member, prior_version, scope).await?;
            }
            Ok(())
        } else {
            apply_single(object, prior_version, scope).await
        }
    }

    /// Apply only if the ledger holds an older version, then record the
    /// new one in the same transaction.
    pub async fn apply_version(&self, scope: &mut TransactionScope, ledger: &VersionLedger) -> Result<()> {
        let object = self.object();
        if object.is_group() {
            for member in self.members() {
                apply_version_single(member, scope, ledger).await?;
            }
            Ok(())
        } else {
            apply_version_single(object, scope, ledger).await
        }
    }

    pub async fn drop(&self, scope: &mut TransactionScope) -> Result<()> {
        let object = self.object();
        if object.is_group() {
            for member in self.members().rev() {
                drop_single(member, scope).await?;
            }
            Ok(())
        } else {
            drop_single(object, scope).await
        }
    }

    /// Grant the privileges registered under `group` to `grantee`.
    pub async fn grant(&self, group: &str, grantee: &str, scope: &mut TransactionScope) -> Result<()> {
        let object = self.object();
        if object.is_group() {
            for member in self.members() {
                grant_single(member, group, grantee, scope).await?;
            }
            Ok(())
        } else {
            grant_single(object, group, grantee, scope).await
        }
    }
}

async fn execute_all(statements: Vec<String>, scope: &mut TransactionScope) -> Result<()> {
    let session = scope.session()?;
    for sql in statements {
        debug!(sql = %sql, "executing");
        session.execute(&sql).await?;
    }
    Ok(())
}

async fn apply_single(object: &DatabaseObject, prior_version: i32, scope: &mut TransactionScope) -> Result<()> {
    let statements = {
        let session = scope.session()?;
        object.create_statements(prior_version, session.translator())
    };
    execute_all(statements, scope).await
}

async fn apply_version_single(
    object: &DatabaseObject,
    scope: &mut TransactionScope,
    ledger: &VersionLedger,
) -> Result<()> {
    let schema = object.schema_name();
    let object_type = object.object_type();
    let name = object.name();

    if !ledger.applies(schema, object_type, name, object.version()) {
        debug!(
            object = %object.type_and_name(),
            version = object.version(),
            "already at version, skipping"
        );
        return Ok(());
    }

    let prior_version = ledger.get_version(schema, object_type, name);
    info!(
        "applying change [v{}] {}.{}",
        object.version(),
        schema,
        object.type_and_name()
    );
    apply_single(object, prior_version, scope).await?;
    ledger
        .add_version(scope, schema, object_type, name, object.version())
        .await
}

async fn drop_single(object: &DatabaseObject, scope: &mut TransactionScope) -> Result<()> {
    let statements = {
        let session = scope.session()?;
        object.drop_statements(session.translator())
    };
    info!(object = %object.type_and_name(), "dropping");
    execute_all(statements, scope).await
}

async fn grant_single(
    object: &DatabaseObject,
    group: &str,
    grantee: &str,
    scope: &mut TransactionScope,
) -> Result<()> {
    let statements = object.grant_statements(group, grantee)?;
    if !statements.is_empty() {
        debug!(object = %object.type_and_name(), group, grantee, "granting");
    }
    execute_all(statements, scope).await
}
