//! # scriptrun CLI
//!
//! ```bash
//! # Serve ./scripts on port 8000
//! scriptrun serve -d scripts -b 0.0.0.0:8000
//!
//! # Call a function (prints raw JSON)
//! scriptrun call http://127.0.0.1:8000 hello.greet -a '{"name": "World", "times": 2}'
//!
//! # Save a file result
//! scriptrun call http://127.0.0.1:8000 report.csv -o report.csv
//! ```
//!
//! The scripts directory falls back to `$SCRIPTRUN_SCRIPTS_DIR`, then to
//! `scripts`.

use anyhow::{Context, Result};
use argh::FromArgs;
use scriptrun_client::{RunOutput, ScriptrunClient};
use scriptrun_server::{HttpServer, ScriptRunner, ServerConfig, DEFAULT_CACHE_CAPACITY};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable consulted when `--scripts-dir` is not given.
const SCRIPTS_DIR_ENV: &str = "SCRIPTRUN_SCRIPTS_DIR";

#[derive(FromArgs)]
/// scriptrun - run functions from JavaScript files over HTTP
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for serving a scripts directory.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// serve the scripts in a directory
struct ServeArgs {
    /// directory holding <name>.js scripts
    #[argh(option, short = 'd', long = "scripts-dir")]
    scripts_dir: Option<String>,

    /// address to bind the HTTP server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:8000\".into()")]
    bind: String,

    /// timeout in seconds for requests without a timeout query (1-300)
    #[argh(option, long = "default-timeout", default = "300")]
    default_timeout: u64,

    /// number of loaded scripts kept in memory
    #[argh(option, long = "cache-capacity", default = "DEFAULT_CACHE_CAPACITY")]
    cache_capacity: usize,
}

/// Arguments for a single call.
///
/// JSON results are printed to stdout without pretty-printing so they can be
/// piped into other tools. File results are written to `--output`, or to
/// stdout as raw bytes.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call a script function on a server
struct CallArgs {
    /// server URL, e.g. http://127.0.0.1:8000
    #[argh(positional)]
    server_address: String,

    /// function to call, as script.function
    #[argh(positional)]
    method: String,

    /// JSON object with keyword arguments
    #[argh(option, short = 'a', long = "args", default = "\"{}\".into()")]
    args: String,

    /// timeout in seconds
    #[argh(option, short = 't', long = "timeout")]
    timeout: Option<u64>,

    /// where to write a file result
    #[argh(option, short = 'o', long = "output")]
    output: Option<PathBuf>,
}

impl ServeArgs {
    fn config(&self, env_dir: Option<String>) -> ServerConfig {
        let scripts_dir = self
            .scripts_dir
            .clone()
            .or(env_dir)
            .unwrap_or_else(|| "scripts".to_string());

        ServerConfig::new()
            .with_scripts_dir(scripts_dir)
            .with_default_timeout(Duration::from_secs(self.default_timeout))
            .with_cache_capacity(self.cache_capacity)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // `call` output goes to stdout, keep it free of log lines.
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = args.config(std::env::var(SCRIPTS_DIR_ENV).ok());
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address {}: {}", args.bind, e))?;

    tracing::info!("Starting scriptrun server");
    tracing::info!("Scripts directory: {}", config.scripts_dir.display());
    tracing::info!("Default timeout: {}s", config.default_timeout_secs());

    let runner = ScriptRunner::new(config)?;
    HttpServer::new(Arc::new(runner)).run(addr).await?;

    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(&args.args).map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    let client = ScriptrunClient::new(&args.server_address)?;
    let output = client.run(&args.method, params, args.timeout).await?;

    match output {
        RunOutput::Json(value) => {
            println!("{}", serde_json::to_string(&value)?);
        }
        RunOutput::File(file) => match &args.output {
            Some(path) => {
                std::fs::write(path, &file.content)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!("Wrote {} bytes to {} ({})", file.content.len(), path.display(), file.media_type);
            }
            None => {
                use std::io::Write;
                std::io::stdout().write_all(&file.content)?;
            }
        },
    }

    Ok(())
}
