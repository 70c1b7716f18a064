//! tpmtool CLI - trust-on-first-use PCR baseline checks for remote TPMs.
//!
//! Registers device attestation keys, issues challenges, verifies scanned
//! quotes against the stored baseline and records accepted baselines.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tpmtool_core::config::{ENV_NONCE, ENV_STORE, ENV_VERIFIER};
use tpmtool_core::{
    AttestationEngine, AttestationResult, Device, DeviceManager, Nonce, ResultKind, TrustConfig,
    TrustError,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// tpmtool - detect platform state changes on remote TPM devices.
///
/// A device is registered with its attestation public key. The first
/// verified quote is shown as CHANGED and must be accepted to become the
/// baseline (trust on first use). Later quotes are compared against it.
#[derive(Parser)]
#[command(name = "tpmtool")]
#[command(version = VERSION)]
#[command(about = "Trust-on-first-use PCR baseline verification for remote TPMs")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    /// Device store file (kept in memory if unset)
    #[arg(long, global = true, env = ENV_STORE)]
    store: Option<PathBuf>,

    /// External quote validator executable
    #[arg(long, global = true, env = ENV_VERIFIER)]
    verifier: Option<PathBuf>,

    /// Argument placed before the generated validator arguments (repeatable)
    #[arg(long = "verifier-arg", global = true, allow_hyphen_values = true)]
    verifier_args: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh challenge nonce
    Nonce,

    /// List registered devices
    List,

    /// Register a device
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// Base64 public key (PEM body without headers)
        #[arg(long)]
        key: String,
    },

    /// Rename a device or replace its key
    Edit {
        /// Device id
        #[arg(long)]
        id: u64,

        /// New display name
        #[arg(long)]
        name: Option<String>,

        /// New base64 public key
        #[arg(long)]
        key: Option<String>,
    },

    /// Delete a device and its baseline
    Delete {
        /// Device id
        #[arg(long)]
        id: u64,
    },

    /// Verify a scanned quote against the device's baseline
    Attest {
        /// Device id
        #[arg(long)]
        id: Option<u64>,

        /// Scanned payload `signature|message|pcrDigest` (read from stdin if unset)
        #[arg(long)]
        input: Option<String>,

        /// Challenge that was given to the device (generated if unset)
        #[arg(long, env = ENV_NONCE)]
        nonce: Option<String>,

        /// Accept a CHANGED result as the new baseline without asking
        #[arg(long)]
        accept: bool,
    },

    /// Show the stored baseline of a device (no verification)
    Show {
        /// Device id
        #[arg(long)]
        id: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let json_output = cli.format == "json";

    // Initialize logging (suppress for JSON output)
    if json_output {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = TrustConfig::from_env();
    config.store_path = cli.store.clone();
    config.verifier_program = cli.verifier.clone();
    if !cli.verifier_args.is_empty() {
        config.verifier_args = cli.verifier_args.clone();
    }

    match run(cli.command, &config, json_output).await {
        Ok(code) => code,
        Err(e) => {
            if json_output {
                print_json(&serde_json::json!({
                    "status": "error",
                    "category": e.category().as_str(),
                    "message": e.to_string(),
                }));
            } else {
                eprintln!("\x1b[31m[ERROR]\x1b[0m {}", e);
            }
            ExitCode::from(2)
        },
    }
}

async fn run(command: Commands, config: &TrustConfig, json: bool) -> Result<ExitCode, TrustError> {
    if let Commands::Nonce = command {
        let nonce = Nonce::generate();
        if json {
            print_json(&serde_json::json!({ "nonce": nonce }));
        } else {
            println!("{}", nonce);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let engine = Arc::new(AttestationEngine::from_config(config).await?);
    let devices = DeviceManager::new(engine.store());

    match command {
        Commands::Nonce => {},
        Commands::List => {
            let list = devices.list_devices().await?;
            if json {
                print_json(&serde_json::json!(list));
            } else if list.is_empty() {
                println!("No devices registered.");
            } else {
                for device in &list {
                    print_device_line(device);
                }
            }
        },
        Commands::Add { name, key } => {
            let device = devices.add_device(&name, &key).await?;
            report_device(&device, "Registered", json);
        },
        Commands::Edit { id, name, key } => {
            let current = engine
                .store()
                .get_by_id(id)
                .await?
                .ok_or(TrustError::DeviceNotFound { id })?;
            let name = name.unwrap_or(current.name);
            let key = key.unwrap_or(current.public_key);
            let device = devices.edit_device(id, &name, &key).await?;
            report_device(&device, "Updated", json);
        },
        Commands::Delete { id } => {
            devices.delete_device(id).await?;
            if json {
                print_json(&serde_json::json!({ "status": "deleted", "id": id }));
            } else {
                println!("Deleted device {}", id);
            }
        },
        Commands::Show { id } => {
            let result = engine.view_last_result(id).await?;
            print_result(&result, json);
        },
        Commands::Attest {
            id,
            input,
            nonce,
            accept,
        } => {
            let nonce = match nonce.filter(|n| !n.trim().is_empty()) {
                Some(value) => Nonce::custom(value),
                None => {
                    let fresh = Nonce::generate();
                    if !json {
                        println!("Challenge nonce: {}", fresh);
                    }
                    fresh
                },
            };

            let input = input.or_else(|| read_scanned_input(json));

            let result = engine.attest(id, input.as_deref(), &nonce).await?;
            print_result(&result, json);

            return match result.kind {
                ResultKind::Ok | ResultKind::Replay => Ok(ExitCode::SUCCESS),
                ResultKind::Failed => Ok(ExitCode::from(2)),
                ResultKind::Changed => {
                    if accept || (!json && confirm("Accept as new baseline?")) {
                        if let Some(device) = engine.accept_changes(&result).await? {
                            report_device(&device, "Baseline accepted for", json);
                            return Ok(ExitCode::SUCCESS);
                        }
                    }
                    Ok(ExitCode::from(1))
                },
            };
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// Read one scanned payload line from stdin; `None` if nothing arrives.
fn read_scanned_input(json: bool) -> Option<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() && !json {
        print!("Scanned quote: ");
        let _ = std::io::stdout().flush();
    }
    let mut line = String::new();
    match stdin.lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

fn confirm(question: &str) -> bool {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return false;
    }
    print!("{} [y/N] ", question);
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if stdin.lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn print_device_line(device: &Device) {
    println!(
        "{:>4}  {:<24} last success: {}",
        device.id,
        device.name,
        device
            .last_success
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string())
    );
}

fn report_device(device: &Device, action: &str, json: bool) {
    if json {
        print_json(&serde_json::json!(device));
    } else {
        println!("{} device {} ({})", action, device.id, device.name);
    }
}

fn print_result(result: &AttestationResult, json: bool) {
    if json {
        print_json(&serde_json::json!(result));
        return;
    }

    let color = match result.kind {
        ResultKind::Ok => "\x1b[32m",      // Green
        ResultKind::Changed => "\x1b[33m", // Yellow
        ResultKind::Failed => "\x1b[31m",  // Red
        ResultKind::Replay => "\x1b[36m",  // Cyan
    };

    println!();
    if let Some(device) = &result.device {
        println!("Device: {} ({})", device.name, device.id);
        if let Some(ts) = device.last_success {
            println!("Last success: {}", format_timestamp(ts));
        }
    }
    println!("Result: {}{}\x1b[0m", color, result.kind);

    if let Some(reason) = &result.failure_reason {
        println!("Reason: {}", reason);
    }

    if let Some(differences) = &result.differences {
        println!();
        if differences.is_empty() {
            println!("No previous baseline. Accepting trusts this state from now on.");
        } else {
            println!("Changed PCRs:");
            print!("{}", differences);
        }
    }

    if result.kind == ResultKind::Replay {
        println!();
        if result.quote_document.is_empty() {
            println!("No baseline accepted yet.");
        } else {
            println!("{}", result.quote_document);
        }
    }
}

/// Format a Unix timestamp.
fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}
