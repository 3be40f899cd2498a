use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use procurement_api::ProcurementApi;
use procurement_core::{Contract, PlanItem, Purchase, PurchaseRequest};
use procurement_ingest::{IngestError, IngestManifest, SourceFile};
use procurement_store_sqlite::{PageRequest, RecordFilter, StoredEntity};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "procure")]
#[command(about = "Procurement workflow kernel CLI")]
struct Cli {
    #[arg(long, default_value = "./procurement.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Import spreadsheet exports, then recompute statuses unless told not to.
    Ingest(IngestArgs),
    Status {
        #[command(subcommand)]
        command: StatusCommand,
    },
    Requests {
        #[command(subcommand)]
        command: RequestsCommand,
    },
    Purchases {
        #[command(subcommand)]
        command: ListCommand,
    },
    Contracts {
        #[command(subcommand)]
        command: ListCommand,
    },
    PlanItems {
        #[command(subcommand)]
        command: ListCommand,
    },
    Runs {
        #[command(subcommand)]
        command: RunsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    SchemaVersion,
    Migrate(DbMigrateArgs),
    IntegrityCheck,
}

#[derive(Debug, Args)]
struct DbMigrateArgs {
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct IngestArgs {
    #[arg(long, conflicts_with = "sources")]
    manifest: Option<PathBuf>,
    #[arg(long = "source", value_name = "KIND=PATH", value_parser = parse_source)]
    sources: Vec<SourceFile>,
    #[arg(long, default_value_t = false)]
    no_recompute: bool,
}

#[derive(Debug, Subcommand)]
enum StatusCommand {
    Recompute,
}

#[derive(Debug, Subcommand)]
enum RequestsCommand {
    List(ListArgs),
    /// One request with its approval records.
    Show(ShowRequestArgs),
}

#[derive(Debug, Subcommand)]
enum ListCommand {
    List(ListArgs),
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    cfo: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    page_size: Option<u32>,
}

#[derive(Debug, Args)]
struct ShowRequestArgs {
    #[arg(long)]
    number: i64,
}

#[derive(Debug, Subcommand)]
enum RunsCommand {
    List(RunsListArgs),
}

#[derive(Debug, Args)]
struct RunsListArgs {
    #[arg(long, default_value_t = 20)]
    limit: u32,
}

fn parse_source(raw: &str) -> Result<SourceFile, String> {
    raw.parse().map_err(|err: IngestError| err.to_string())
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn emit<T: serde::Serialize>(value: &T, what: &str) -> Result<()> {
    emit_json(serde_json::to_value(value).with_context(|| format!("failed to serialize {what}"))?)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let api = ProcurementApi::new(cli.db);
    match cli.command {
        Command::Db { command } => run_db(command, &api),
        Command::Ingest(args) => run_ingest(args, &api),
        Command::Status { command: StatusCommand::Recompute } => {
            emit(&api.recompute_statuses()?, "status pass report")
        }
        Command::Requests { command } => run_requests(command, &api),
        Command::Purchases { command: ListCommand::List(args) } => {
            run_list::<Purchase>(&args, &api)
        }
        Command::Contracts { command: ListCommand::List(args) } => {
            run_list::<Contract>(&args, &api)
        }
        Command::PlanItems { command: ListCommand::List(args) } => {
            run_list::<PlanItem>(&args, &api)
        }
        Command::Runs { command: RunsCommand::List(args) } => {
            let runs = api.ingest_runs(args.limit)?;
            emit_json(serde_json::json!({ "runs": runs }))
        }
    }
}

fn run_db(command: DbCommand, api: &ProcurementApi) -> Result<()> {
    match command {
        DbCommand::SchemaVersion => {
            let status = api.schema_status()?;
            emit_json(serde_json::json!({
                "current_version": status.current_version,
                "target_version": status.target_version,
                "pending_versions": status.pending_versions,
                "up_to_date": status.pending_versions.is_empty()
            }))
        }
        DbCommand::Migrate(args) => emit(&api.migrate(args.dry_run)?, "migration result"),
        DbCommand::IntegrityCheck => emit(&api.integrity_check()?, "integrity report"),
    }
}

fn run_ingest(args: IngestArgs, api: &ProcurementApi) -> Result<()> {
    let mut manifest = match args.manifest {
        Some(path) => IngestManifest::load(&path)
            .with_context(|| format!("failed to load manifest {}", path.display()))?,
        None if args.sources.is_empty() => {
            return Err(anyhow!("ingest requires --manifest or at least one --source"));
        }
        None => IngestManifest { sources: args.sources, recompute_statuses: true },
    };
    if args.no_recompute {
        manifest.recompute_statuses = false;
    }

    let report = api.ingest(&manifest)?;
    if report.failed_files > 0 {
        tracing::warn!("{} of {} files failed", report.failed_files, report.files.len());
    }
    emit(&report, "batch report")
}

fn run_requests(command: RequestsCommand, api: &ProcurementApi) -> Result<()> {
    match command {
        RequestsCommand::List(args) => run_list::<PurchaseRequest>(&args, api),
        RequestsCommand::Show(args) => {
            let request = api.request_by_number(args.number)?;
            let approvals = api.approvals::<PurchaseRequest>(request.id)?;
            emit_json(serde_json::json!({ "request": request, "approvals": approvals }))
        }
    }
}

fn run_list<E>(args: &ListArgs, api: &ProcurementApi) -> Result<()>
where
    E: StoredEntity + serde::Serialize,
{
    let filter = RecordFilter {
        status: args.status.clone(),
        cfo: args.cfo.clone(),
        search: args.search.clone(),
    };
    let page = api.list::<E>(&filter, PageRequest::new(args.page, args.page_size))?;
    emit(&page, "page")
}
