//! clubhub - command-line access to the clubs and events backend.
//!
//! Builds the shared query cache and batch coalescer once and runs reads
//! through them:
//!
//! ```text
//! clubhub select <table> [selection] [column=value ...]
//! clubhub lookup <table> <fields> <id> [id ...]
//! clubhub init
//! ```

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clubhub_core::{BatchCoalescer, Config, DataService, Filter, QueryCache, QueryExecutor, RestExecutor};

#[derive(Debug, PartialEq)]
enum Command {
    Select {
        table: String,
        selection: String,
        filters: Vec<Filter>,
    },
    Lookup {
        table: String,
        fields: String,
        ids: Vec<String>,
    },
    /// Write the current settings (file + environment) to the config file
    Init,
}

const USAGE: &str = "usage:\n  clubhub select <table> [selection] [column=value ...]\n  clubhub lookup <table> <fields> <id> [id ...]\n  clubhub init";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn parse_filter(arg: &str) -> Result<Filter> {
    match arg.split_once('=') {
        Some((column, value)) if !column.is_empty() => Ok(Filter::eq(column, value)),
        _ => bail!("invalid filter '{}', expected column=value", arg),
    }
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args {
        [cmd, table, rest @ ..] if cmd == "select" => {
            let (selection, filter_args) = match rest {
                [first, tail @ ..] if !first.contains('=') => (first.clone(), tail),
                _ => ("*".to_string(), rest),
            };
            let filters = filter_args
                .iter()
                .map(|a| parse_filter(a))
                .collect::<Result<Vec<_>>>()?;
            Ok(Command::Select {
                table: table.clone(),
                selection,
                filters,
            })
        }
        [cmd, table, fields, ids @ ..] if cmd == "lookup" && !ids.is_empty() => Ok(Command::Lookup {
            table: table.clone(),
            fields: fields.clone(),
            ids: ids.to_vec(),
        }),
        [cmd] if cmd == "init" => Ok(Command::Init),
        _ => bail!("{}", USAGE),
    }
}

/// Composition root: one executor, one cache, one coalescer for the process.
fn build_service(config: &Config) -> Result<DataService> {
    let backend_url = config
        .backend_url
        .as_deref()
        .context("No backend URL configured (set CLUBHUB_BACKEND_URL)")?;
    let api_key = config
        .api_key
        .as_deref()
        .context("No API key configured (set CLUBHUB_API_KEY)")?;

    let executor: Arc<dyn QueryExecutor> = Arc::new(RestExecutor::with_timeout(
        backend_url,
        api_key,
        config.request_timeout(),
    )?);
    let cache = Arc::new(QueryCache::with_default_ttl(config.cache_capacity, config.default_ttl())?);
    let batcher = Arc::new(BatchCoalescer::with_delay(Arc::clone(&executor), config.batch_delay()));

    Ok(DataService::new(executor, cache, batcher))
}

async fn run(service: &DataService, command: Command) -> Result<()> {
    match command {
        Command::Select {
            table,
            selection,
            filters,
        } => {
            let rows = service.select(&table, &selection, &filters, None).await?;
            println!("{}", serde_json::to_string_pretty(rows.as_slice())?);
        }
        Command::Init => {}
        Command::Lookup { table, fields, ids } => {
            let lookups = ids.iter().map(|id| service.lookup(&table, &fields, id));
            for (id, result) in ids.iter().zip(join_all(lookups).await) {
                match result? {
                    Some(record) => println!("{}", serde_json::to_string(&record)?),
                    None => eprintln!("{}: not found", id),
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let config = Config::load()?;
    if command == Command::Init {
        config.save()?;
        info!("Configuration saved");
        return Ok(());
    }

    let service = build_service(&config)?;
    info!(capacity = config.cache_capacity, "clubhub starting");

    run(&service, command).await?;

    debug!(stats = ?service.cache_stats(), "Cache usage");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_select_defaults_selection() {
        let cmd = parse_args(&args(&["select", "clubs", "faculty_id=3"])).unwrap();
        assert_eq!(
            cmd,
            Command::Select {
                table: "clubs".into(),
                selection: "*".into(),
                filters: vec![Filter::eq("faculty_id", "3")],
            }
        );
    }

    #[test]
    fn test_parse_select_with_selection() {
        let cmd = parse_args(&args(&["select", "events", "id,title"])).unwrap();
        assert_eq!(
            cmd,
            Command::Select {
                table: "events".into(),
                selection: "id,title".into(),
                filters: vec![],
            }
        );
    }

    #[test]
    fn test_parse_lookup() {
        let cmd = parse_args(&args(&["lookup", "users", "id,name", "a", "b"])).unwrap();
        assert_eq!(
            cmd,
            Command::Lookup {
                table: "users".into(),
                fields: "id,name".into(),
                ids: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["lookup", "users", "id"])).is_err());
        assert!(parse_args(&args(&["select", "clubs", "*", "=3"])).is_err());
        assert!(parse_args(&args(&["delete", "clubs"])).is_err());
        assert!(parse_args(&args(&["init", "now"])).is_err());
    }

    #[test]
    fn test_parse_init() {
        assert_eq!(parse_args(&args(&["init"])).unwrap(), Command::Init);
    }

    #[test]
    fn test_build_service_requires_backend() {
        assert!(build_service(&Config::default()).is_err());
    }
}
