//! `localpv` — one-shot driver for the local directory provisioner.
//!
//! Each invocation performs exactly one provisioner operation and prints the
//! response message as JSON on stdout; logs go to stderr.  The node identity
//! and tuning knobs come from the environment (see
//! [`liblocalpv::config`]).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::EnvFilter;

use liblocalpv::{
    LocalDirProvisioner, ProvisionOptions, ProvisionerConfig, ProvisionerMessage, service,
};

/// Path argument meaning "read from stdin".
const STDIN_PATH: &str = "-";

#[derive(Parser, Debug)]
#[command(name = "localpv", version, about = "Local directory volume provisioner")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision a volume for a claim.
    Provision {
        /// Claim document (JSON or YAML, `-` for stdin).
        #[arg(long)]
        claim: PathBuf,
        /// Storage class document (JSON or YAML, `-` for stdin).
        #[arg(long)]
        class: PathBuf,
    },
    /// Delete a previously provisioned volume.
    Delete {
        /// Volume document (JSON or YAML, `-` for stdin).
        #[arg(long)]
        volume: PathBuf,
    },
    /// Read one request message from stdin and answer it on stdout.
    ServeOnce,
    /// Print provisioner information.
    Info,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Parse a JSON or YAML document.
///
/// Files ending in `.yaml`/`.yml` are YAML, other files are JSON.  On stdin a
/// document starting with `{` is JSON and anything else YAML.
fn parse_document<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T> {
    let yaml = if path == Path::new(STDIN_PATH) {
        !raw.trim_start().starts_with('{')
    } else {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        )
    };
    if yaml {
        serde_yaml::from_str(raw).with_context(|| format!("Failed to parse YAML from {path:?}"))
    } else {
        serde_json::from_str(raw).with_context(|| format!("Failed to parse JSON from {path:?}"))
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = if path == Path::new(STDIN_PATH) {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {path:?}"))?
    };
    parse_document(path, &raw)
}

/// Turn the command line into the request message it stands for.
fn build_request(command: Command) -> Result<ProvisionerMessage> {
    let request = match command {
        Command::Provision { claim, class } => {
            if claim == Path::new(STDIN_PATH) && class == Path::new(STDIN_PATH) {
                bail!("--claim and --class cannot both be read from stdin");
            }
            ProvisionerMessage::Provision(ProvisionOptions {
                claim: read_document(&claim)?,
                storage_class: read_document(&class)?,
            })
        }
        Command::Delete { volume } => ProvisionerMessage::Delete(read_document(&volume)?),
        Command::ServeOnce => read_document(Path::new(STDIN_PATH))?,
        Command::Info => ProvisionerMessage::GetInfo,
    };
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config =
        ProvisionerConfig::from_env().context("Failed to load provisioner configuration")?;
    let provisioner = LocalDirProvisioner::from_config(&config);
    info!(
        node = %config.node_name,
        provisioner = %config.provisioner_name,
        "local provisioner ready"
    );

    let request = build_request(cli.command)?;
    let response = service::dispatch(&provisioner, request).await;

    let payload =
        serde_json::to_string_pretty(&response).context("Failed to serialize response")?;
    println!("{payload}");

    Ok(if response.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
