//! Deployment engine: transactions, the version ledger, the retry state
//! machine and the worker-pool orchestrator.

pub mod adapter;
pub mod apply;
pub mod ledger;
pub mod orchestrator;
pub mod postgres;
pub mod retry;
#[cfg(feature = "testing")]
pub mod testing;
pub mod transaction;

pub use adapter::{Session, SessionFactory};
pub use apply::ObjectHandle;
pub use ledger::VersionLedger;
pub use orchestrator::{
    DeployOptions, DeployReport, FailurePolicy, ObjectOutcome, ObjectStatus, Orchestrator,
};
pub use postgres::PostgresSessionFactory;
pub use retry::{
    ApplyOutcome, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF, Jitter, RandomJitter, RetryPolicy,
    apply_with_transaction_retry,
};
pub use transaction::TransactionScope;
