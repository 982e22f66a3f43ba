use std::path::{Path, PathBuf};

use anyhow::Context;
use apitree::{
    config, executor::MemoryExecutor, request::RequestMethod, resolver::path_index::ReferencePolicy,
    resolver::RequestParser, server,
};
use clap::Parser;

/// apitree - declarative JSON query resolution over HTTP
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// HTTP server host address
    #[arg(long, default_value = "0.0.0.0")]
    http_host: String,

    /// HTTP server port
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// YAML or JSON file with the tables to serve
    #[arg(long)]
    data_file: Option<String>,

    /// YAML file with request structures and the role table
    #[arg(long)]
    structure_file: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Maximum nesting depth of a request
    #[arg(long, default_value_t = 5)]
    max_query_depth: usize,

    /// Maximum statements executed per request
    #[arg(long, default_value_t = 200)]
    max_sql_count: usize,

    /// Add timing and statement counters to responses
    #[arg(long)]
    debug: bool,

    /// How null references are handled: permissive or strict
    #[arg(long, default_value = "permissive")]
    reference_policy: ReferencePolicy,

    /// Resolve this request file once and print the response instead of
    /// serving
    #[arg(long)]
    request: Option<PathBuf>,

    /// Method for --request
    #[arg(long, default_value = "GET", requires = "request")]
    method: RequestMethod,
}

impl Cli {
    fn cli_config(&self) -> config::CliConfig {
        config::CliConfig {
            http_host: self.http_host.clone(),
            http_port: self.http_port,
            data_file: self.data_file.clone(),
            structure_file: self.structure_file.clone(),
            request_timeout_secs: self.request_timeout_secs,
            max_query_depth: self.max_query_depth,
            max_sql_count: self.max_sql_count,
            debug: self.debug,
            reference_policy: self.reference_policy,
        }
    }
}

/// Resolves one request file against the configured store and prints the
/// response.
fn resolve_once(config: config::ServerConfig, path: &Path, method: RequestMethod) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    let request: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON object", path.display()))?;

    let state = server::AppState::load(config)?;
    let mut executor = MemoryExecutor::new(state.store.clone());
    let outcome = RequestParser::new(
        &state.config.resolver,
        state.verifier.as_ref(),
        state.structures.as_ref(),
    )
    .parse(method, &request, &mut executor);

    println!("{}", serde_json::to_string_pretty(&outcome.response)?);
    if let Some(e) = outcome.error {
        anyhow::bail!("{} request failed: {}", method, e);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = match config::ServerConfig::from_cli(cli.cli_config()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = &cli.request {
        if let Err(e) = resolve_once(config, path, cli.method) {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
        return;
    }

    println!("\napitree v{}\n", env!("CARGO_PKG_VERSION"));
    server::run_with_config(config).await;
}
