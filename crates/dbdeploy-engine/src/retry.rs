//! Transactional retry state machine for a single object.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use dbdeploy_core::{Error, ObjectId, PhysicalModel, Result};

use crate::adapter::SessionFactory;
use crate::apply::ObjectHandle;
use crate::ledger::VersionLedger;
use crate::transaction::TransactionScope;

/// Attempts per object, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Ceiling of the random pause between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Source of the pause taken before a retry.
pub trait Jitter: Send {
    /// A duration in `[0, ceiling]`.
    fn backoff(&mut self, ceiling: Duration) -> Duration;
}

/// Uniformly random pause, from a seedable generator.
#[derive(Debug, Clone)]
pub struct RandomJitter {
    rng: ChaCha8Rng,
}

impl RandomJitter {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Jitter for RandomJitter {
    fn backoff(&mut self, ceiling: Duration) -> Duration {
        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(self.rng.random_range(0..=millis))
    }
}

/// Result of a committed apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub attempts: u32,
}

impl ApplyOutcome {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Run `apply_version` for one object in a fresh transaction per attempt.
///
/// Deadlocks and lock timeouts roll back, pause for a random duration
/// bounded by the policy and try again until the attempts run out. Every
/// other failure rolls back and fails immediately. Failures are wrapped in
/// [`Error::Deploy`] with the object's `TYPE:NAME` and the attempts left.
pub async fn apply_with_transaction_retry(
    factory: &dyn SessionFactory,
    model: &PhysicalModel,
    id: ObjectId,
    ledger: &VersionLedger,
    policy: &RetryPolicy,
    jitter: &mut dyn Jitter,
) -> Result<ApplyOutcome> {
    let handle = ObjectHandle::new(model, id);
    let object = handle.object().type_and_name();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let remaining = max_attempts - attempt;

        let result = match TransactionScope::begin(factory).await {
            Ok(mut scope) => match handle.apply_version(&mut scope, ledger).await {
                Ok(()) => scope.close().await,
                Err(err) => {
                    scope.set_rollback_only();
                    if let Err(close_err) = scope.close().await {
                        warn!(object = %object, error = %close_err, "rollback failed");
                    }
                    Err(err)
                }
            },
            Err(err) => Err(err),
        };

        let err = match result {
            Ok(()) => return Ok(ApplyOutcome { attempts: attempt }),
            Err(err) => err,
        };

        if !err.is_retryable() {
            error!(object = %object, error = %err, "[FAILED] apply failed");
            return Err(Error::deploy(object, remaining, err));
        }

        let kind = err.kind().map(|kind| kind.as_str()).unwrap_or("lock failure");
        warn!(object = %object, remaining, kind, "{kind} on {object} [remaining={remaining}]");

        if remaining == 0 {
            error!(object = %object, attempts = attempt, "[FAILED] retries exhausted");
            return Err(Error::deploy(object, remaining, err));
        }

        let pause = jitter.backoff(policy.max_backoff);
        tokio::time::sleep(pause).await;
    }
}
