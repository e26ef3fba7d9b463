mod logging;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbdeploy_core::{ConnectionDetails, DbType, Error as CoreError, PhysicalModel, Translator};
use dbdeploy_engine::{DeployOptions, FailurePolicy, Orchestrator, PostgresSessionFactory, SessionFactory};
use logging::{LogOptions, LoggingError, init_logging};
use serde::Serialize;
use settings::{DEFAULT_SETTINGS_FILE, Overrides, Settings, SettingsError, load_definition};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("cannot encode output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
}

#[derive(Parser, Debug)]
#[command(name = "dbdeploy", version, about = "Versioned schema deployment")]
struct Cli {
    /// Settings file; `dbdeploy.toml` is read when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Emit JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    /// Append JSON logs to this file.
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply every object whose declared version is ahead of the ledger.
    Deploy(DeployArgs),
    /// Drop every object in the definition, dependents first.
    Drop(DropArgs),
    /// Grant a privilege group's privileges to a database principal.
    Grant(GrantArgs),
    /// Print the recorded versions as JSON.
    Versions(VersionsArgs),
    /// Print the deployment order without touching a database.
    Plan(PlanArgs),
}

#[derive(Args, Debug, Clone, Default)]
struct TargetArgs {
    /// Database connection string.
    #[arg(long, value_name = "CONNECTION_STRING")]
    conn: Option<String>,
    /// Schema holding VERSION_HISTORY.
    #[arg(long)]
    admin_schema: Option<String>,
    /// Schema whose objects are tracked.
    #[arg(long)]
    data_schema: Option<String>,
}

#[derive(Args, Debug)]
struct DeployArgs {
    /// Schema definition file (JSON or TOML).
    definition: PathBuf,
    #[command(flatten)]
    target: TargetArgs,
    /// Concurrent deployment workers.
    #[arg(long)]
    pool_size: Option<usize>,
    /// What to do with the rest of the run after a failure.
    #[arg(long, value_enum)]
    on_failure: Option<OnFailure>,
    /// Seed for the retry backoff.
    #[arg(long)]
    jitter_seed: Option<u64>,
}

#[derive(Args, Debug)]
struct DropArgs {
    definition: PathBuf,
    #[command(flatten)]
    target: TargetArgs,
    /// Required; dropping is irreversible.
    #[arg(long, default_value_t = false)]
    confirm: bool,
}

#[derive(Args, Debug)]
struct GrantArgs {
    definition: PathBuf,
    #[command(flatten)]
    target: TargetArgs,
    /// Privilege group registered on the objects.
    #[arg(long)]
    group: String,
    /// User or role receiving the privileges.
    #[arg(long)]
    grantee: String,
}

#[derive(Args, Debug)]
struct VersionsArgs {
    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Args, Debug)]
struct PlanArgs {
    definition: PathBuf,
    /// Also render DDL for this dialect (derby, db2, postgresql).
    #[arg(long)]
    dialect: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnFailure {
    Abort,
    Continue,
}

impl From<OnFailure> for FailurePolicy {
    fn from(value: OnFailure) -> Self {
        match value {
            OnFailure::Abort => FailurePolicy::AbortRun,
            OnFailure::Continue => FailurePolicy::ContinueIndependent,
        }
    }
}

#[derive(Debug, Serialize)]
struct PlanStep {
    object: String,
    version: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    statements: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    let (settings_path, explicit) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_SETTINGS_FILE), false),
    };
    let settings = Settings::load(&settings_path, explicit)?;

    init_logging(&LogOptions {
        json: cli.log_json,
        file: cli.log_file.clone().or_else(|| settings.log_file.clone()),
    })?;

    let run_id = Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now();
    tracing::info!(event = "run_started", run_id = %run_id, started_at = %started_at.to_rfc3339());
    let timer = Instant::now();

    let result = match cli.command {
        Command::Deploy(args) => run_deploy(&settings, args).await,
        Command::Drop(args) => run_drop(&settings, args).await,
        Command::Grant(args) => run_grant(&settings, args).await,
        Command::Versions(args) => run_versions(&settings, args).await,
        Command::Plan(args) => run_plan(args),
    };

    let duration_ms = timer.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => tracing::info!(event = "run_finished", run_id = %run_id, duration_ms),
        Err(err) => tracing::error!(event = "run_failed", run_id = %run_id, duration_ms, error = %err),
    }
    result
}

async fn run_deploy(settings: &Settings, args: DeployArgs) -> Result<(), CliError> {
    let definition = load_definition(&args.definition)?;
    let model = Arc::new(definition.build()?);
    let overrides = Overrides {
        pool_size: args.pool_size,
        failure_policy: args.on_failure.map(FailurePolicy::from),
        ..overrides(&args.target)
    };
    let mut options = settings.deploy_options(&overrides, &definition.schema);
    options.jitter_seed = args.jitter_seed;

    let orchestrator = connect(settings, &overrides, options).await?;
    tracing::info!(event = "deploy_started", objects = model.len());
    let report = orchestrator.deploy(model).await?;
    println!("{}", serde_json::to_string_pretty(&report.outcomes)?);
    let report = report.into_result()?;
    tracing::info!(
        event = "deploy_finished",
        committed = report.committed(),
        retries = report.retries()
    );
    Ok(())
}

async fn run_drop(settings: &Settings, args: DropArgs) -> Result<(), CliError> {
    if !args.confirm {
        return Err(CliError::InvalidConfig(
            "drop removes every object in the definition; pass --confirm".to_string(),
        ));
    }
    let definition = load_definition(&args.definition)?;
    let model = definition.build()?;
    let overrides = overrides(&args.target);
    let options = settings.deploy_options(&overrides, &definition.schema);

    let orchestrator = connect(settings, &overrides, options).await?;
    orchestrator.drop_all(&model).await?;
    tracing::info!(event = "drop_finished", objects = model.len());
    Ok(())
}

async fn run_grant(settings: &Settings, args: GrantArgs) -> Result<(), CliError> {
    let definition = load_definition(&args.definition)?;
    let model = definition.build()?;
    let overrides = overrides(&args.target);
    let options = settings.deploy_options(&overrides, &definition.schema);

    let orchestrator = connect(settings, &overrides, options).await?;
    orchestrator.grant_all(&model, &args.group, &args.grantee).await?;
    tracing::info!(event = "grant_finished", group = %args.group, grantee = %args.grantee);
    Ok(())
}

async fn run_versions(settings: &Settings, args: VersionsArgs) -> Result<(), CliError> {
    let overrides = overrides(&args.target);
    let data_schema = overrides
        .data_schema
        .clone()
        .or_else(|| settings.data_schema.clone())
        .ok_or_else(|| CliError::InvalidConfig("--data-schema is required".to_string()))?;
    let options = settings.deploy_options(&overrides, &data_schema);

    let orchestrator = connect(settings, &overrides, options).await?;
    let ledger = orchestrator.load_ledger().await?;
    println!("{}", serde_json::to_string_pretty(&ledger.snapshot())?);
    Ok(())
}

fn run_plan(args: PlanArgs) -> Result<(), CliError> {
    let definition = load_definition(&args.definition)?;
    let model = definition.build()?;
    let translator = args
        .dialect
        .as_deref()
        .map(str::parse::<DbType>)
        .transpose()?
        .map(DbType::translator);
    println!("{}", serde_json::to_string_pretty(&plan(&model, translator.as_deref())?)?);
    Ok(())
}

fn plan(model: &PhysicalModel, translator: Option<&dyn Translator>) -> Result<Vec<PlanStep>, CliError> {
    let steps = model
        .flattened_order()?
        .into_iter()
        .map(|id| {
            let object = model.get(id);
            PlanStep {
                object: object.type_and_name(),
                version: object.version(),
                statements: translator
                    .map(|translator| object.create_statements(0, translator))
                    .unwrap_or_default(),
            }
        })
        .collect();
    Ok(steps)
}

fn overrides(target: &TargetArgs) -> Overrides {
    Overrides {
        connection: target.conn.clone(),
        admin_schema: target.admin_schema.clone(),
        data_schema: target.data_schema.clone(),
        ..Overrides::default()
    }
}

async fn connect(
    settings: &Settings,
    overrides: &Overrides,
    options: DeployOptions,
) -> Result<Orchestrator, CliError> {
    let conn = settings
        .connection(overrides)
        .ok_or_else(|| CliError::InvalidConfig("connection string is required".to_string()))?;
    let details = ConnectionDetails::from_url(&conn)?;
    let engine = detect_engine(&details)?;
    tracing::info!(event = "engine_detected", engine = %engine, target = %details.redacted());

    // One connection beyond the worker pool for ledger and bootstrap work.
    let max_connections = u32::try_from(options.pool_size.max(1) + 1).unwrap_or(u32::MAX);
    let factory = PostgresSessionFactory::connect(&conn, max_connections).await?;
    let factory: Arc<dyn SessionFactory> = Arc::new(factory);
    Ok(Orchestrator::new(factory, options))
}

fn detect_engine(details: &ConnectionDetails) -> Result<DbType, CliError> {
    match details.engine.parse::<DbType>() {
        Ok(DbType::Postgresql) => Ok(DbType::Postgresql),
        Ok(other) => Err(CliError::UnsupportedEngine(format!(
            "{other} has a translator but no live session backend"
        ))),
        Err(_) => Err(CliError::UnsupportedEngine(details.engine.clone())),
    }
}
