//! pipe-probe - send one HTTP request over a named pipe and print the JSON answer.
//!
//! ```text
//! pipe-probe                                  # GET /info on the default engine pipe
//! pipe-probe /version                         # custom request path
//! pipe-probe //./pipe/podman /_ping -v 2      # custom pipe, trace logging
//! pipe-probe -X POST /containers/prune
//! ```

use clap::Parser;
use pipe_probe::logging::init_logging;
use pipe_probe::{CallContext, Interpretation, Invocation, PipeProbe, ProbeConfig, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, trace, warn};

#[derive(Parser, Debug)]
#[command(name = "pipe-probe", version)]
#[command(about = "Send one HTTP request over a named pipe and print the JSON response")]
struct Args {
    /// Verbosity relative to the configured log level (negative is quieter)
    #[arg(short = 'v', long = "verbosity", default_value_t = 0, allow_negative_numbers = true)]
    verbosity: i32,

    /// HTTP method
    #[arg(short = 'X', long = "method")]
    method: Option<String>,

    /// Timeout for the whole exchange in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// At most two: [PIPE] [PATH], or [PATH] alone
    #[arg(value_name = "ARGS")]
    positionals: Vec<String>,
}

fn load_config(args: &Args) -> Result<ProbeConfig> {
    let mut config = match &args.config {
        Some(path) => ProbeConfig::from_file(path)?,
        None => ProbeConfig::default(),
    };
    config.apply_env_overrides();

    if let Some(method) = &args.method {
        config.target.method = method.clone();
    }
    if let Some(timeout_ms) = args.timeout {
        config.client.timeout_ms = timeout_ms;
    }
    if args.json_logs {
        config.logging.structured = true;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pipe-probe: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging, args.verbosity) {
        eprintln!("pipe-probe: {}", e);
        return ExitCode::FAILURE;
    }

    match Invocation::from_positionals(&args.positionals) {
        Ok(invocation) => invocation.apply(&mut config.target),
        Err(e) => {
            error!(args = ?args.positionals, error = %e, "Incorrect usage");
            return ExitCode::from(2);
        }
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }

    let ctx = CallContext::with_timeout(config.timeout());
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling request");
            interrupt.cancel();
        }
    });

    let target = &config.target;
    let probe = PipeProbe::connect_to(&target.pipe_path)
        .max_body_bytes(config.client.max_body_bytes);

    match probe.request(&target.method, &target.request_path, &ctx).await {
        Ok(report) => {
            match report.interpretation {
                Interpretation::Structured(value) => println!("{:#}", value),
                Interpretation::Opaque { content_type } => {
                    trace!(
                        status = %report.status,
                        content_type = ?content_type,
                        "response is not JSON"
                    );
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                error = %e,
                kind = ?e.kind(),
                pipe = %target.pipe_path,
                request = %target.request_path,
                "could not make request"
            );
            ExitCode::FAILURE
        }
    }
}
