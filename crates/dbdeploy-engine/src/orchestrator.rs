//! Dependency-ordered deployment over a bounded worker pool.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use dbdeploy_core::ledger::VERSION_HISTORY;
use dbdeploy_core::{Error, ModelBuilder, ObjectId, PhysicalModel, Result, version_history_table};

use crate::adapter::SessionFactory;
use crate::apply::ObjectHandle;
use crate::ledger::VersionLedger;
use crate::retry::{ApplyOutcome, RandomJitter, RetryPolicy, apply_with_transaction_retry};
use crate::transaction::TransactionScope;

/// What happens to the rest of the run once an object fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Start nothing new; let running workers finish.
    #[default]
    AbortRun,
    /// Keep deploying objects that do not depend on the failed one.
    ContinueIndependent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub admin_schema: String,
    pub data_schema: String,
    pub pool_size: usize,
    pub failure_policy: FailurePolicy,
    pub retry: RetryPolicy,
    /// Fixes the retry jitter sequence; random when `None`.
    pub jitter_seed: Option<u64>,
}

impl DeployOptions {
    pub fn new(admin_schema: impl Into<String>, data_schema: impl Into<String>) -> Self {
        Self {
            admin_schema: admin_schema.into(),
            data_schema: data_schema.into(),
            pool_size: 4,
            failure_policy: FailurePolicy::default(),
            retry: RetryPolicy::default(),
            jitter_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ObjectStatus {
    Committed { attempts: u32 },
    Failed { error: String },
    /// Never started: a predecessor failed or the run was aborted.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectOutcome {
    pub object: String,
    #[serde(flatten)]
    pub status: ObjectStatus,
}

/// Per-object outcome of a run, in deployment order.
#[derive(Debug, Default)]
pub struct DeployReport {
    pub outcomes: Vec<ObjectOutcome>,
    first_error: Option<Error>,
}

impl DeployReport {
    pub fn is_success(&self) -> bool {
        self.first_error.is_none()
    }

    pub fn committed(&self) -> usize {
        self.count(|status| matches!(status, ObjectStatus::Committed { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, ObjectStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|status| matches!(status, ObjectStatus::Skipped))
    }

    /// Retries across all committed objects.
    pub fn retries(&self) -> u32 {
        self.outcomes
            .iter()
            .map(|outcome| match outcome.status {
                ObjectStatus::Committed { attempts } => attempts.saturating_sub(1),
                _ => 0,
            })
            .sum()
    }

    pub fn first_error(&self) -> Option<&Error> {
        self.first_error.as_ref()
    }

    /// The first fatal error of the run, if any.
    pub fn into_result(self) -> Result<DeployReport> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }

    fn count(&self, predicate: impl Fn(&ObjectStatus) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.status))
            .count()
    }
}

pub struct Orchestrator {
    factory: Arc<dyn SessionFactory>,
    options: DeployOptions,
}

impl Orchestrator {
    pub fn new(factory: Arc<dyn SessionFactory>, options: DeployOptions) -> Self {
        Self { factory, options }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Create the version history table when it does not exist yet. It is
    /// applied with plain `apply`, never through the ledger.
    pub async fn bootstrap(&self) -> Result<()> {
        let admin_schema = &self.options.admin_schema;
        let table = version_history_table(admin_schema)?;

        let mut scope = TransactionScope::begin(self.factory.as_ref()).await?;
        let result: Result<()> = async {
            if scope.session()?.table_exists(admin_schema, VERSION_HISTORY).await? {
                debug!(admin_schema = %admin_schema, "version history present");
                return Ok(());
            }
            info!(admin_schema = %admin_schema, "creating {VERSION_HISTORY}");
            let mut builder = ModelBuilder::new();
            let id = builder.add(table)?;
            let model = builder.build()?;
            ObjectHandle::new(&model, id).apply(0, &mut scope).await
        }
        .await;
        finish(scope, result).await
    }

    pub async fn load_ledger(&self) -> Result<VersionLedger> {
        VersionLedger::load_in_new_transaction(
            self.factory.as_ref(),
            &self.options.admin_schema,
            &self.options.data_schema,
        )
        .await
    }

    /// Bootstrap, load the ledger once and deploy every object.
    ///
    /// A run where some object failed still returns `Ok`; the report holds
    /// per-object outcomes and [`DeployReport::into_result`] yields the
    /// first fatal error. `Err` is reserved for an invalid model or a failed
    /// bootstrap or ledger load.
    pub async fn deploy(&self, model: Arc<PhysicalModel>) -> Result<DeployReport> {
        self.check_schemas(&model)?;
        self.bootstrap().await?;
        let ledger = self.load_ledger().await?;
        self.run(model, &ledger).await
    }

    /// Deploy every object against an already loaded ledger. An object is
    /// released to the pool only once all of its predecessors committed.
    pub async fn run(&self, model: Arc<PhysicalModel>, ledger: &VersionLedger) -> Result<DeployReport> {
        self.check_schemas(&model)?;
        let order = model.topological_order()?;
        let position: HashMap<ObjectId, usize> =
            order.iter().enumerate().map(|(p, id)| (*id, p)).collect();

        let mut waiting_on = model.dependency_map();
        let mut dependents: BTreeMap<ObjectId, BTreeSet<ObjectId>> = BTreeMap::new();
        for (id, deps) in &waiting_on {
            for dep in deps {
                dependents.entry(*dep).or_default().insert(*id);
            }
        }

        let mut ready: VecDeque<ObjectId> = order
            .iter()
            .copied()
            .filter(|id| waiting_on.get(id).is_none_or(BTreeSet::is_empty))
            .collect();

        let mut seeds = match self.options.jitter_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let pool_size = self.options.pool_size.max(1);
        let mut running: JoinSet<(ObjectId, Result<ApplyOutcome>)> = JoinSet::new();
        let mut outcomes: BTreeMap<ObjectId, ObjectStatus> = BTreeMap::new();
        let mut report = DeployReport::default();
        let mut aborted = false;

        info!(
            engine = self.factory.engine(),
            objects = order.len(),
            pool_size,
            "starting deployment"
        );

        loop {
            while !aborted && running.len() < pool_size {
                let Some(id) = ready.pop_front() else {
                    break;
                };
                debug!(object = %model.get(id).type_and_name(), "scheduling");

                let factory = Arc::clone(&self.factory);
                let model = Arc::clone(&model);
                let ledger = ledger.clone();
                let policy = self.options.retry.clone();
                let mut jitter = RandomJitter::seeded(seeds.random());
                running.spawn(async move {
                    let result = apply_with_transaction_retry(
                        factory.as_ref(),
                        &model,
                        id,
                        &ledger,
                        &policy,
                        &mut jitter,
                    )
                    .await;
                    (id, result)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let (id, result) = joined.map_err(|err| Error::Worker(err.to_string()))?;

            match result {
                Ok(outcome) => {
                    outcomes.insert(
                        id,
                        ObjectStatus::Committed {
                            attempts: outcome.attempts,
                        },
                    );
                    for dependent in dependents.get(&id).into_iter().flatten() {
                        if let Some(deps) = waiting_on.get_mut(dependent) {
                            deps.remove(&id);
                            if deps.is_empty() && !outcomes.contains_key(dependent) {
                                ready.push_back(*dependent);
                            }
                        }
                    }
                }
                Err(err) => {
                    outcomes.insert(
                        id,
                        ObjectStatus::Failed {
                            error: err.to_string(),
                        },
                    );
                    skip_dependents(id, &dependents, &model, &mut outcomes);
                    if self.options.failure_policy == FailurePolicy::AbortRun && !aborted {
                        warn!(object = %model.get(id).type_and_name(), "aborting deployment");
                        aborted = true;
                    }
                    if report.first_error.is_none() {
                        report.first_error = Some(err);
                    }
                }
            }
        }

        for id in &order {
            outcomes.entry(*id).or_insert(ObjectStatus::Skipped);
        }

        let mut ordered: Vec<(ObjectId, ObjectStatus)> = outcomes.into_iter().collect();
        ordered.sort_by_key(|(id, _)| position.get(id).copied().unwrap_or(usize::MAX));
        report.outcomes = ordered
            .into_iter()
            .map(|(id, status)| ObjectOutcome {
                object: model.get(id).type_and_name(),
                status,
            })
            .collect();

        if report.is_success() {
            info!(
                committed = report.committed(),
                retries = report.retries(),
                "deployment complete"
            );
        } else {
            error!(
                committed = report.committed(),
                failed = report.failed(),
                skipped = report.skipped(),
                "deployment failed"
            );
        }
        Ok(report)
    }

    /// The ledger snapshot only covers the admin and data schemas, so an
    /// object anywhere else would be re-applied on every run.
    fn check_schemas(&self, model: &PhysicalModel) -> Result<()> {
        let tracked = [
            self.options.admin_schema.as_str(),
            self.options.data_schema.as_str(),
        ];
        let untracked: Vec<String> = model
            .iter()
            .map(|(_, object)| object)
            .filter(|object| !tracked.contains(&object.schema_name()))
            .map(|object| object.qualified_name())
            .collect();
        if untracked.is_empty() {
            return Ok(());
        }
        Err(Error::InvalidModel(format!(
            "objects outside schemas {} and {}: {}",
            tracked[0],
            tracked[1],
            untracked.join(", ")
        )))
    }

    /// Drop every object, dependents first, one transaction per object.
    pub async fn drop_all(&self, model: &PhysicalModel) -> Result<()> {
        for id in model.drop_order()? {
            let mut scope = TransactionScope::begin(self.factory.as_ref()).await?;
            let result = ObjectHandle::new(model, id).drop(&mut scope).await;
            finish(scope, result).await?;
        }
        Ok(())
    }

    /// Grant the privileges registered under `group` on every object.
    pub async fn grant_all(&self, model: &PhysicalModel, group: &str, grantee: &str) -> Result<()> {
        let mut scope = TransactionScope::begin(self.factory.as_ref()).await?;
        let mut result = Ok(());
        for id in model.topological_order()? {
            result = ObjectHandle::new(model, id).grant(group, grantee, &mut scope).await;
            if result.is_err() {
                break;
            }
        }
        finish(scope, result).await
    }
}

/// Commit on success; otherwise roll back and return the original error.
async fn finish(mut scope: TransactionScope, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => scope.close().await,
        Err(err) => {
            scope.set_rollback_only();
            if let Err(close_err) = scope.close().await {
                warn!(error = %close_err, "rollback failed");
            }
            Err(err)
        }
    }
}

fn skip_dependents(
    failed: ObjectId,
    dependents: &BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    model: &PhysicalModel,
    outcomes: &mut BTreeMap<ObjectId, ObjectStatus>,
) {
    let mut stack = vec![failed];
    while let Some(id) = stack.pop() {
        for dependent in dependents.get(&id).into_iter().flatten() {
            if !outcomes.contains_key(dependent) {
                debug!(
                    object = %model.get(*dependent).type_and_name(),
                    "skipped after failed predecessor"
                );
                outcomes.insert(*dependent, ObjectStatus::Skipped);
                stack.push(*dependent);
            }
        }
    }
}
