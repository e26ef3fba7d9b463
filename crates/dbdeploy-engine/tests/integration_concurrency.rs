use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dbdeploy_core::{DatabaseObject, ModelBuilder, ObjectId, PhysicalModel, VendorError};
use dbdeploy_engine::testing::{Fault, MemoryDatabase};
use dbdeploy_engine::{DeployOptions, Orchestrator, RetryPolicy, SessionFactory};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const ADMIN: &str = "FHIR_ADMIN";
const DATA: &str = "FHIRDATA";

struct RandomDag {
    model: Arc<PhysicalModel>,
    names: HashMap<ObjectId, String>,
    edges: Vec<(ObjectId, ObjectId)>,
}

fn random_dag(seed: u64, size: usize) -> Result<RandomDag> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut builder = ModelBuilder::new();
    let mut names = HashMap::new();
    let mut ids = Vec::with_capacity(size);

    for index in 0..size {
        let name = format!("SEQ_{index:03}");
        let id = builder.add(DatabaseObject::sequence(DATA, &name, 1, 1, 1)?)?;
        names.insert(id, name);
        ids.push(id);
    }

    let mut edges = Vec::new();
    for (position, id) in ids.iter().enumerate() {
        for dependency in &ids[..position] {
            if rng.random_bool(0.15) {
                builder.add_dependency(*id, *dependency)?;
                edges.push((*id, *dependency));
            }
        }
    }

    Ok(RandomDag {
        model: Arc::new(builder.build()?),
        names,
        edges,
    })
}

fn orchestrator(db: &MemoryDatabase, pool_size: usize) -> Orchestrator {
    let factory: Arc<dyn SessionFactory> = Arc::new(db.clone());
    let mut options = DeployOptions::new(ADMIN, DATA);
    options.pool_size = pool_size;
    options.jitter_seed = Some(99);
    options.retry = RetryPolicy {
        max_attempts: 10,
        max_backoff: Duration::from_millis(5),
    };
    Orchestrator::new(factory, options)
}

fn commit_positions(db: &MemoryDatabase, names: &HashMap<ObjectId, String>) -> Result<HashMap<ObjectId, usize>> {
    let statements = db.statements();
    names
        .iter()
        .map(|(id, name)| {
            let needle = format!("FHIRDATA.{name} ");
            let position = statements
                .iter()
                .position(|sql| sql.contains(&needle))
                .with_context(|| format!("{name} was never created"))?;
            Ok::<_, anyhow::Error>((*id, position))
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn predecessors_commit_before_dependents_start() -> Result<()> {
    for seed in [1_u64, 2, 3] {
        let dag = random_dag(seed, 30)?;
        let db = MemoryDatabase::new().with_latency(Duration::from_millis(1));

        let report = orchestrator(&db, 4)
            .deploy(Arc::clone(&dag.model))
            .await?
            .into_result()?;
        assert_eq!(report.committed(), 30);

        let positions = commit_positions(&db, &dag.names)?;
        for (dependent, dependency) in &dag.edges {
            assert!(
                positions[dependency] < positions[dependent],
                "{} committed before {}",
                dag.names[dependent],
                dag.names[dependency]
            );
        }
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deadlocks_are_absorbed_by_retries() -> Result<()> {
    let dag = random_dag(42, 20)?;
    let db = MemoryDatabase::new().with_latency(Duration::from_millis(1));
    for name in ["SEQ_003", "SEQ_007", "SEQ_011"] {
        db.push_fault(
            Fault::times(VendorError::new("deadlock").with_sql_state("40XL1"), 2)
                .matching(format!("FHIRDATA.{name} ")),
        );
    }

    let report = orchestrator(&db, 4)
        .deploy(Arc::clone(&dag.model))
        .await?
        .into_result()?;

    assert_eq!(report.committed(), 20);
    assert_eq!(report.retries(), 6);
    assert_eq!(db.history().len(), 20);
    Ok(())
}
