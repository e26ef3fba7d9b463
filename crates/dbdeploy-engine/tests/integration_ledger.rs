use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use dbdeploy_core::{ErrorKind, ObjectType, VendorError, VersionRow};
use dbdeploy_engine::testing::{Fault, MemoryDatabase};
use dbdeploy_engine::{DeployOptions, Orchestrator, SessionFactory, TransactionScope, VersionLedger};

const ADMIN: &str = "FHIR_ADMIN";
const DATA: &str = "FHIRDATA";

fn row(name: &str, version: i32) -> VersionRow {
    VersionRow {
        schema_name: DATA.to_string(),
        object_type: ObjectType::Table,
        object_name: name.to_string(),
        version,
        applied: Utc::now(),
    }
}

async fn bootstrapped(db: &MemoryDatabase) -> Result<Orchestrator> {
    let factory: Arc<dyn SessionFactory> = Arc::new(db.clone());
    let orchestrator = Orchestrator::new(factory, DeployOptions::new(ADMIN, DATA));
    orchestrator.bootstrap().await?;
    Ok(orchestrator)
}

#[tokio::test]
async fn latest_version_wins_after_batch_insert() -> Result<()> {
    let db = MemoryDatabase::new();
    assert_eq!(db.engine(), "memory");
    let orchestrator = bootstrapped(&db).await?;
    let ledger = orchestrator.load_ledger().await?;
    assert_eq!(ledger.admin_schema(), ADMIN);

    let mut scope = TransactionScope::begin(&db).await?;
    ledger
        .insert_versions(&mut scope, &[row("PATIENT", 1), row("PATIENT", 2), row("PATIENT", 3)])
        .await?;
    scope.close().await?;

    assert_eq!(ledger.get_version(DATA, ObjectType::Table, "PATIENT"), 3);
    for version in 1..=3 {
        assert!(!ledger.applies(DATA, ObjectType::Table, "PATIENT", version));
    }
    assert!(ledger.applies(DATA, ObjectType::Table, "PATIENT", 4));

    let reloaded = orchestrator.load_ledger().await?;
    assert_eq!(reloaded.snapshot(), ledger.snapshot());
    assert_eq!(reloaded.snapshot().get("FHIRDATA:TABLE:PATIENT"), Some(&3));
    Ok(())
}

#[tokio::test]
async fn rolled_back_rows_leave_snapshot_untouched() -> Result<()> {
    let db = MemoryDatabase::new();
    let orchestrator = bootstrapped(&db).await?;
    let ledger = orchestrator.load_ledger().await?;

    let commits = db.commits();
    let mut scope = TransactionScope::begin(&db).await?;
    ledger
        .add_version(&mut scope, DATA, ObjectType::Sequence, "FHIR_SEQUENCE", 1)
        .await?;
    assert_eq!(ledger.get_version(DATA, ObjectType::Sequence, "FHIR_SEQUENCE"), 1);

    scope.set_rollback_only();
    assert!(scope.is_rollback_only());
    scope.close().await?;

    assert_eq!(db.commits(), commits);
    assert_eq!(ledger.get_version(DATA, ObjectType::Sequence, "FHIR_SEQUENCE"), 0);
    assert!(db.history().is_empty());
    Ok(())
}

#[tokio::test]
async fn dropped_scope_rolls_back_snapshot() -> Result<()> {
    let db = MemoryDatabase::new();
    let orchestrator = bootstrapped(&db).await?;
    let ledger = orchestrator.load_ledger().await?;

    {
        let mut scope = TransactionScope::begin(&db).await?;
        ledger
            .add_version(&mut scope, DATA, ObjectType::View, "PATIENT_VIEW", 2)
            .await?;
    }

    assert_eq!(ledger.get_version(DATA, ObjectType::View, "PATIENT_VIEW"), 0);
    assert!(db.history().is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_history_row_is_classified() -> Result<()> {
    let db = MemoryDatabase::new();
    let orchestrator = bootstrapped(&db).await?;
    let ledger = orchestrator.load_ledger().await?;

    let mut scope = TransactionScope::begin(&db).await?;
    ledger.insert_versions(&mut scope, &[row("PATIENT", 1)]).await?;
    scope.close().await?;

    let stale = VersionLedger::empty(ADMIN);
    assert_eq!(stale.get_version(DATA, ObjectType::Table, "PATIENT"), 0);
    let mut scope = TransactionScope::begin(&db).await?;
    let err = stale
        .insert_versions(&mut scope, &[row("PATIENT", 1)])
        .await
        .expect_err("history primary key");
    assert_eq!(err.kind(), Some(ErrorKind::Duplicate));
    scope.set_rollback_only();
    scope.close().await?;

    assert_eq!(stale.get_version(DATA, ObjectType::Table, "PATIENT"), 0);
    assert_eq!(db.history_for(DATA, ObjectType::Table, "PATIENT"), vec![1]);
    Ok(())
}

#[tokio::test]
async fn missing_history_table_fails_the_load() -> Result<()> {
    let db = MemoryDatabase::new();
    let factory: Arc<dyn SessionFactory> = Arc::new(db.clone());
    let orchestrator = Orchestrator::new(factory, DeployOptions::new(ADMIN, DATA));

    let err = orchestrator.load_ledger().await.expect_err("no history table");
    assert_eq!(err.kind(), Some(ErrorKind::UndefinedName));
    assert_eq!(db.rollbacks(), 1);
    Ok(())
}

#[tokio::test]
async fn cleared_faults_stop_failing() -> Result<()> {
    let db = MemoryDatabase::new();
    db.push_fault(Fault::always(
        VendorError::new("connection reset").with_sql_state("08006"),
    ));
    let factory: Arc<dyn SessionFactory> = Arc::new(db.clone());
    let orchestrator = Orchestrator::new(factory, DeployOptions::new(ADMIN, DATA));

    let err = orchestrator.bootstrap().await.expect_err("scripted fault");
    assert_eq!(err.kind(), Some(ErrorKind::ConnectionError));

    db.clear_faults();
    orchestrator.bootstrap().await?;
    assert!(db.has_table(ADMIN, "VERSION_HISTORY"));
    Ok(())
}
