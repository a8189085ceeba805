use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use navicue_catalog_api::{CatalogApi, FacetRequest, QueryRequest, RecommendRequest};
use navicue_catalog_core::{FilterSpec, StatusFilter};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "ncat")]
#[command(about = "NaviCue catalog CLI")]
struct Cli {
    /// Catalog bundle directory, `.ndjson` file, or JSON array file.
    #[arg(long, env = "NAVICUE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Log filter directive; `RUST_LOG` wins when set.
    #[arg(long, env = "NAVICUE_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    Item {
        #[command(subcommand)]
        command: ItemCommand,
    },
    Query(QueryArgs),
    Facets(FacetsArgs),
    Recommend(RecommendArgs),
}

#[derive(Debug, Subcommand)]
enum CatalogCommand {
    Stats,
    Export(ExportArgs),
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Subcommand)]
enum ItemCommand {
    Show(ItemShowArgs),
}

#[derive(Debug, Args)]
struct ItemShowArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Exact facet match, `name=value`. Repeatable.
    #[arg(long = "facet")]
    facets: Vec<String>,
    #[arg(long)]
    text: Option<String>,
    #[arg(long, value_enum, default_value_t = StatusArg::Active)]
    status: StatusArg,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    offset: i64,
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,
}

#[derive(Debug, Args)]
struct FacetsArgs {
    #[arg(long)]
    facet: String,
    #[arg(long, value_enum, default_value_t = StatusArg::Active)]
    status: StatusArg,
}

#[derive(Debug, Args)]
struct RecommendArgs {
    #[arg(long, allow_negative_numbers = true)]
    regulation_score: Option<f64>,
    /// Recently shown facet value, most recent first. Repeatable.
    #[arg(long = "history")]
    history: Vec<String>,
    #[arg(long)]
    top: Option<usize>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Draft,
    Active,
    Archived,
    Any,
}

impl StatusArg {
    fn into_status_filter(self) -> StatusFilter {
        match self {
            Self::Draft => StatusFilter::Draft,
            Self::Active => StatusFilter::Active,
            Self::Archived => StatusFilter::Archived,
            Self::Any => StatusFilter::Any,
        }
    }
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

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let api = open_catalog(cli.catalog.as_deref())?;
    match cli.command {
        Command::Catalog { command } => run_catalog(command, &api),
        Command::Item { command } => run_item(command, &api),
        Command::Query(args) => run_query(args, &api),
        Command::Facets(args) => run_facets(args, &api),
        Command::Recommend(args) => run_recommend(args, &api),
    }
}

fn open_catalog(path: Option<&Path>) -> Result<CatalogApi> {
    let path =
        path.ok_or_else(|| anyhow!("no catalog given; pass --catalog or set NAVICUE_CATALOG"))?;
    let api = CatalogApi::new();
    let stats = api.load_bundle(path)?;
    debug!(path = %path.display(), total = stats.total, "catalog opened");
    Ok(api)
}

fn run_catalog(command: CatalogCommand, api: &CatalogApi) -> Result<()> {
    match command {
        CatalogCommand::Stats => {
            emit_json(serde_json::to_value(api.stats()).context("failed to serialize stats")?)
        }
        CatalogCommand::Export(args) => {
            let manifest = api.export_bundle(&args.out)?;
            emit_json(serde_json::json!({
                "out": args.out.display().to_string(),
                "manifest": manifest
            }))
        }
    }
}

fn run_item(command: ItemCommand, api: &CatalogApi) -> Result<()> {
    match command {
        ItemCommand::Show(args) => {
            let item = api.get_item(&args.id)?;
            emit_json(serde_json::json!({ "item": item }))
        }
    }
}

fn run_query(args: QueryArgs, api: &CatalogApi) -> Result<()> {
    let mut filter = FilterSpec::new();
    for raw in &args.facets {
        let (name, value) = parse_facet_arg(raw)?;
        filter = filter.with_facet(name, value);
    }
    if let Some(text) = args.text {
        filter = filter.with_free_text(text);
    }

    let response = api.query(QueryRequest {
        filter,
        status: args.status.into_status_filter(),
        offset: args.offset,
        limit: args.limit,
    })?;
    emit_json(serde_json::to_value(&response).context("failed to serialize query response")?)
}

fn run_facets(args: FacetsArgs, api: &CatalogApi) -> Result<()> {
    let response = api.facets(FacetRequest {
        facet: args.facet,
        status: args.status.into_status_filter(),
    })?;
    emit_json(serde_json::to_value(&response).context("failed to serialize facet response")?)
}

fn run_recommend(args: RecommendArgs, api: &CatalogApi) -> Result<()> {
    let response = api.recommend(RecommendRequest {
        regulation_score: args.regulation_score,
        recent_facet_history: args.history,
        top: args.top,
    })?;
    emit_json(serde_json::to_value(&response).context("failed to serialize recommendation")?)
}

fn parse_facet_arg(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => Err(anyhow!("invalid --facet `{raw}`; expected name=value")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facet_arg_splits_on_first_equals() {
        assert_eq!(parse_facet_arg("schema=shame").ok(), Some(("schema", "shame")));
        assert_eq!(parse_facet_arg("note=a=b").ok(), Some(("note", "a=b")));
        assert!(parse_facet_arg("schema").is_err());
        assert!(parse_facet_arg("=shame").is_err());
    }

    #[test]
    fn non_object_output_is_wrapped_in_payload() {
        let wrapped = with_contract_version(serde_json::json!([1, 2]));
        assert_eq!(wrapped["contract_version"], CLI_CONTRACT_VERSION);
        assert_eq!(wrapped["payload"], serde_json::json!([1, 2]));
    }
}
