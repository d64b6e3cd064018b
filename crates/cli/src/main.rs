mod config;
mod replay;
mod serve;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Reap farm registry.
#[derive(Parser)]
#[command(name = "reap", version, about = "Reap farm registry")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP JSON API over an in-memory registry
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
        /// Path to a TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Path to TLS certificate PEM file (requires --tls-key and the `tls` feature)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires --tls-cert and the `tls` feature)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Replay a JSON script of registry mutations and report each outcome
    Replay {
        /// Path to the JSON script
        script: PathBuf,
    },
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Serve {
            port,
            config,
            tls_cert,
            tls_key,
        } => {
            cmd_serve(port, config.as_deref(), tls_cert, tls_key, cli.output, cli.quiet);
        }
        Commands::Replay { script } => {
            cmd_replay(&script, cli.output, cli.quiet);
        }
    }
}

fn cmd_serve(
    port: Option<u16>,
    config_path: Option<&Path>,
    tls_cert: Option<PathBuf>,
    tls_key: Option<PathBuf>,
    output: OutputFormat,
    quiet: bool,
) {
    // Validate TLS flags: both must be provided or neither
    if tls_cert.is_some() != tls_key.is_some() {
        report_error(
            "error: --tls-cert and --tls-key must both be provided",
            output,
            quiet,
        );
        process::exit(1);
    }

    let mut config = match Config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };
    if let Some(port) = port {
        config.server.port = port;
    }

    let rt = runtime(output, quiet);
    if let Err(e) = rt.block_on(serve::start_server(config, tls_cert, tls_key)) {
        report_error(&format!("server error: {}", e), output, quiet);
        process::exit(1);
    }
}

fn cmd_replay(script: &Path, output: OutputFormat, quiet: bool) {
    let steps = match replay::load_script(script) {
        Ok(s) => s,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let rt = runtime(output, quiet);
    let report = match rt.block_on(replay::run_script(steps)) {
        Ok(r) => r,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };

    replay::print_report(&report, output, quiet);
    if report.failed > 0 {
        process::exit(1);
    }
}

/// Report an error message respecting output format and quiet flag.
pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
