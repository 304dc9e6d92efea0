//! Bridge Gateway CLI: `bridgectl` command.
//!
//! Talks to a running gateway over its socket (`call`) and inspects or
//! edits the gateway's stores directly (`subject`, `result`, `jobs`,
//! `registry`). Direct store access is safe while the server runs: every
//! commit takes the same file lock, and the server re-reads the registry
//! manifest whenever it changes.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use serde_json::Value;

use bridge_gateway::identity::PackageEntry;
use bridge_gateway::time::millis_to_rfc3339;
use bridge_gateway::{
    BridgeClient, BridgeConfig, Fingerprint, JobState, JsonPackageRegistry, MeasurementStore,
    ResultStore, ResultSyncJob, SubjectSelection, SubjectStore, WireReply,
};

// ── CLI structure ─────────────────────────────────────────────────────────────

/// Bridge Gateway CLI: call the gateway, manage the selected subject, inspect
/// stored results and background jobs.
#[derive(Parser, Debug)]
#[command(
    name = "bridgectl",
    about = "Bridge Gateway CLI",
    version,
    long_about = "bridgectl: Bridge Gateway CLI\n\nCall a running gateway, select the current subject, inspect stored\nresults and background jobs, and manage the package registry."
)]
struct Cli {
    /// Data directory (default: $BRIDGE_HOME or ~/.bridge)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Call a running gateway over its socket
    Call {
        /// Socket path (default: from config)
        #[arg(long, global = true)]
        socket: Option<PathBuf>,

        #[command(subcommand)]
        subcommand: CallCommands,
    },

    /// Manage the subject served by REQUEST_DATA
    Subject {
        #[command(subcommand)]
        subcommand: SubjectCommands,
    },

    /// Inspect or reset the last submitted result
    Result {
        #[command(subcommand)]
        subcommand: ResultCommands,
    },

    /// Inspect and run queued background jobs
    Jobs {
        #[command(subcommand)]
        subcommand: JobCommands,
    },

    /// Manage the package registry used to verify callers
    Registry {
        #[command(subcommand)]
        subcommand: RegistryCommands,
    },

    /// Print the SHA-256 fingerprint of a DER certificate
    Fingerprint {
        /// Certificate file (DER)
        cert: PathBuf,
    },

    /// Show or write the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CallCommands {
    /// Call REQUEST_DATA and print the returned document
    RequestData {
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Call SUBMIT_RESULT with a JSON payload
    Submit {
        /// Payload JSON (use --payload-file to read from a file)
        #[arg(long, conflicts_with = "payload_file")]
        payload: Option<String>,

        /// Read the payload from a file
        #[arg(long)]
        payload_file: Option<PathBuf>,

        #[arg(long)]
        request_id: Option<String>,
    },

    /// Call an arbitrary method with raw JSON arguments
    Raw {
        method: String,

        /// Arguments object (default: {})
        #[arg(long)]
        args: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SubjectCommands {
    /// Select the current subject
    Select {
        #[arg(long)]
        measurement_code: String,
        #[arg(long)]
        subject_code: String,
        #[arg(long)]
        subject_name: String,
    },
    /// Clear the current subject
    Clear,
    /// Show the current subject
    Show,
}

#[derive(Subcommand, Debug)]
enum ResultCommands {
    /// Show the last stored payload
    Show,
    /// Show the last measurement record, field by field
    Record,
    /// Forget the last payload and measurement record
    Clear,
}

#[derive(Subcommand, Debug)]
enum JobCommands {
    /// List queued jobs
    List {
        /// Only jobs in this state (pending, failed)
        #[arg(long)]
        state: Option<String>,
    },
    /// Run every due job now
    Run,
    /// Delete failed jobs
    Purge,
}

#[derive(Subcommand, Debug)]
enum RegistryCommands {
    /// Add or replace a package
    Add {
        /// Package name
        #[arg(long)]
        name: String,

        /// Uid owning the package (repeatable)
        #[arg(long = "uid", required = true)]
        uids: Vec<u32>,

        /// Current signing certificate, DER (repeatable)
        #[arg(long = "cert")]
        certs: Vec<PathBuf>,

        /// Past signing certificate, DER (repeatable)
        #[arg(long = "history")]
        history: Vec<PathBuf>,
    },
    /// List registered packages
    List,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to config.json
    Init,
}

// ── Main entry point ──────────────────────────────────────────────────────────

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = load_config(cli.home.as_deref()).and_then(|config| match cli.command {
        Commands::Call { socket, subcommand } => {
            let socket = socket.unwrap_or_else(|| config.socket_path());
            match subcommand {
                CallCommands::RequestData { request_id } => {
                    cmd_call_request_data(&socket, request_id.as_deref(), verbose)
                }
                CallCommands::Submit {
                    payload,
                    payload_file,
                    request_id,
                } => cmd_call_submit(
                    &socket,
                    payload,
                    payload_file.as_deref(),
                    request_id.as_deref(),
                    verbose,
                ),
                CallCommands::Raw { method, args } => {
                    cmd_call_raw(&socket, &method, args.as_deref(), verbose)
                }
            }
        }
        Commands::Subject { subcommand } => match subcommand {
            SubjectCommands::Select {
                measurement_code,
                subject_code,
                subject_name,
            } => cmd_subject_select(
                &config,
                SubjectSelection::new(measurement_code, subject_code, subject_name),
            ),
            SubjectCommands::Clear => cmd_subject_clear(&config),
            SubjectCommands::Show => cmd_subject_show(&config),
        },
        Commands::Result { subcommand } => match subcommand {
            ResultCommands::Show => cmd_result_show(&config, verbose),
            ResultCommands::Record => cmd_result_record(&config),
            ResultCommands::Clear => cmd_result_clear(&config),
        },
        Commands::Jobs { subcommand } => match subcommand {
            JobCommands::List { state } => cmd_jobs_list(&config, state.as_deref(), verbose),
            JobCommands::Run => cmd_jobs_run(&config),
            JobCommands::Purge => cmd_jobs_purge(&config),
        },
        Commands::Registry { subcommand } => match subcommand {
            RegistryCommands::Add {
                name,
                uids,
                certs,
                history,
            } => cmd_registry_add(&config, name, uids, &certs, &history),
            RegistryCommands::List => cmd_registry_list(&config, verbose),
        },
        Commands::Fingerprint { cert } => cmd_fingerprint(&cert),
        Commands::Config { subcommand } => match subcommand {
            ConfigCommands::Show => cmd_config_show(&config),
            ConfigCommands::Init => cmd_config_init(&config),
        },
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(home: Option<&Path>) -> Result<BridgeConfig> {
    let config = match home {
        Some(home) => BridgeConfig::load(home),
        None => BridgeConfig::load_default(),
    };
    config.context("failed to load configuration")
}

// ── Call commands ─────────────────────────────────────────────────────────────

fn connect(socket: &Path) -> Result<BridgeClient> {
    BridgeClient::connect(socket)
        .with_context(|| format!("failed to connect to gateway at {}", socket.display()))
}

/// Print a reply; denials and `ok=false` become errors.
fn print_reply(reply: WireReply, verbose: bool) -> Result<()> {
    let response = match reply {
        WireReply::SecurityDenied { reason } => bail!("security denied: {reason}"),
        WireReply::Response(response) => response,
    };

    if verbose {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }
    if !response.ok {
        bail!(
            "{}",
            response.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    if let Some(data) = response.data {
        // Pretty-print the data document when it is JSON.
        match serde_json::from_str::<Value>(&data) {
            Ok(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
            Err(_) => println!("{data}"),
        }
    }
    if let Some(status) = response.status {
        println!("status: {status}");
    }
    Ok(())
}

/// `bridgectl call request-data [--request-id ID]`
fn cmd_call_request_data(socket: &Path, request_id: Option<&str>, verbose: bool) -> Result<()> {
    let reply = connect(socket)?.request_data(request_id)?;
    print_reply(reply, verbose)
}

/// `bridgectl call submit --payload JSON | --payload-file PATH [--request-id ID]`
fn cmd_call_submit(
    socket: &Path,
    payload: Option<String>,
    payload_file: Option<&Path>,
    request_id: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let payload = match (payload, payload_file) {
        (Some(payload), _) => payload,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read payload from {}", path.display()))?,
        (None, None) => return Err(anyhow!("one of --payload or --payload-file is required")),
    };
    let reply = connect(socket)?.submit_result(request_id, &payload)?;
    print_reply(reply, verbose)
}

/// `bridgectl call raw METHOD [--args JSON]`
fn cmd_call_raw(socket: &Path, method: &str, args: Option<&str>, verbose: bool) -> Result<()> {
    let arguments: Value = match args {
        Some(raw) => serde_json::from_str(raw).context("--args must be a JSON object")?,
        None => Value::Object(Default::default()),
    };
    let reply = connect(socket)?.call(method, arguments)?;
    print_reply(reply, verbose)
}

// ── Subject commands ──────────────────────────────────────────────────────────

fn subject_store(config: &BridgeConfig) -> Result<SubjectStore> {
    SubjectStore::open(config.prefs_dir()).context("failed to open subject store")
}

/// `bridgectl subject select ...`
fn cmd_subject_select(config: &BridgeConfig, selection: SubjectSelection) -> Result<()> {
    subject_store(config)?
        .select(&selection)
        .context("failed to save subject")?;
    println!(
        "Selected subject {} ({}) for measurement {}",
        selection.subject_code, selection.subject_name, selection.measurement_code
    );
    Ok(())
}

/// `bridgectl subject clear`
fn cmd_subject_clear(config: &BridgeConfig) -> Result<()> {
    subject_store(config)?
        .clear()
        .context("failed to clear subject")?;
    println!("Subject cleared");
    Ok(())
}

/// `bridgectl subject show`
fn cmd_subject_show(config: &BridgeConfig) -> Result<()> {
    match subject_store(config)?.current()? {
        Some(subject) => {
            println!("Subject:");
            println!("  Measurement code: {}", subject.measurement_code);
            println!("  Subject code:     {}", subject.subject_code);
            println!("  Subject name:     {}", subject.subject_name);
        }
        None => println!("No subject selected"),
    }
    Ok(())
}

// ── Result commands ───────────────────────────────────────────────────────────

/// `bridgectl result show`
fn cmd_result_show(config: &BridgeConfig, verbose: bool) -> Result<()> {
    let store = ResultStore::open(config.prefs_dir()).context("failed to open result store")?;
    let Some(last) = store.last()? else {
        println!("No result stored");
        return Ok(());
    };

    println!("Last result:");
    println!("  Request ID: {}", display_or_dash(&last.request_id));
    println!("  Updated:    {}", millis_to_rfc3339(last.updated_at));
    if verbose {
        if let Ok(doc) = serde_json::from_str::<Value>(&last.payload) {
            println!("  Payload:");
            for line in serde_json::to_string_pretty(&doc)?.lines() {
                println!("    {line}");
            }
            return Ok(());
        }
    }
    println!("  Payload:    {}", last.payload);
    Ok(())
}

/// `bridgectl result record`
fn cmd_result_record(config: &BridgeConfig) -> Result<()> {
    let store =
        MeasurementStore::open(config.prefs_dir()).context("failed to open measurement store")?;
    match store.load()? {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("No complete measurement record stored"),
    }
    Ok(())
}

/// `bridgectl result clear`
fn cmd_result_clear(config: &BridgeConfig) -> Result<()> {
    ResultStore::open(config.prefs_dir())?
        .clear()
        .context("failed to clear result store")?;
    MeasurementStore::open(config.prefs_dir())?
        .clear()
        .context("failed to clear measurement store")?;
    println!("Stored result cleared");
    Ok(())
}

// ── Job commands ──────────────────────────────────────────────────────────────

fn parse_job_state(s: &str) -> Result<JobState> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(JobState::Pending),
        "failed" => Ok(JobState::Failed),
        other => Err(anyhow!(
            "unknown job state '{other}' (expected pending or failed)"
        )),
    }
}

/// `bridgectl jobs list [--state STATE]`
fn cmd_jobs_list(config: &BridgeConfig, state: Option<&str>, verbose: bool) -> Result<()> {
    let filter = state.map(parse_job_state).transpose()?;
    let queue = config.open_job_queue().context("failed to open job queue")?;
    let jobs: Vec<_> = queue
        .list()?
        .into_iter()
        .filter(|job| filter.map_or(true, |s| job.state == s))
        .collect();

    if jobs.is_empty() {
        println!("No jobs");
        return Ok(());
    }

    println!("{} job(s):", jobs.len());
    for job in &jobs {
        println!(
            "  {}  {:<9}  attempts={}  requestId={}  enqueued={}",
            job.id,
            job.state.as_tag(),
            job.attempts,
            display_or_dash(&job.request_id),
            millis_to_rfc3339(job.enqueued_at)
        );
        if let Some(err) = &job.last_error {
            println!("      last error: {err}");
        }
        if verbose && job.state == JobState::Pending {
            println!("      next attempt: {}", millis_to_rfc3339(job.next_attempt_at));
        }
    }
    Ok(())
}

/// `bridgectl jobs run`
fn cmd_jobs_run(config: &BridgeConfig) -> Result<()> {
    let queue = config.open_job_queue().context("failed to open job queue")?;
    let summary = queue.run_due(&ResultSyncJob)?;
    println!(
        "Ran {} job(s): {} succeeded, {} retried, {} failed",
        summary.total(),
        summary.succeeded,
        summary.retried,
        summary.failed
    );
    Ok(())
}

/// `bridgectl jobs purge`
fn cmd_jobs_purge(config: &BridgeConfig) -> Result<()> {
    let removed = config
        .open_job_queue()
        .context("failed to open job queue")?
        .purge_failed()?;
    println!("Removed {removed} failed job(s)");
    Ok(())
}

// ── Registry commands ─────────────────────────────────────────────────────────

fn read_certs(paths: &[PathBuf]) -> Result<Vec<String>> {
    paths
        .iter()
        .map(|path| {
            let der = std::fs::read(path)
                .with_context(|| format!("failed to read certificate {}", path.display()))?;
            Ok(base64::engine::general_purpose::STANDARD.encode(der))
        })
        .collect()
}

fn load_registry_or_empty(path: &Path) -> Result<JsonPackageRegistry> {
    if path.exists() {
        JsonPackageRegistry::load(path)
            .with_context(|| format!("failed to load registry {}", path.display()))
    } else {
        Ok(JsonPackageRegistry::new())
    }
}

/// `bridgectl registry add --name PKG --uid UID [--cert DER]... [--history DER]...`
fn cmd_registry_add(
    config: &BridgeConfig,
    name: String,
    uids: Vec<u32>,
    certs: &[PathBuf],
    history: &[PathBuf],
) -> Result<()> {
    let path = config.registry_path();
    let mut registry = load_registry_or_empty(&path)?;
    registry.insert(PackageEntry {
        name: name.clone(),
        uids,
        signers: read_certs(certs)?,
        signing_history: read_certs(history)?,
    });
    registry
        .save(&path)
        .with_context(|| format!("failed to write registry {}", path.display()))?;

    println!("Registered package '{name}' in {}", path.display());
    Ok(())
}

/// `bridgectl registry list`
fn cmd_registry_list(config: &BridgeConfig, verbose: bool) -> Result<()> {
    let path = config.registry_path();
    let registry = load_registry_or_empty(&path)?;
    if registry.is_empty() {
        println!("No packages registered ({})", path.display());
        return Ok(());
    }

    println!("{} package(s) in {}:", registry.len(), path.display());
    for entry in registry.entries() {
        let uids: Vec<String> = entry.uids.iter().map(u32::to_string).collect();
        println!(
            "  {}  uids={}  signers={}  history={}",
            entry.name,
            uids.join(","),
            entry.signers.len(),
            entry.signing_history.len()
        );
        if verbose {
            for encoded in entry.signers.iter().chain(entry.signing_history.iter()) {
                match base64::engine::general_purpose::STANDARD.decode(encoded) {
                    Ok(der) => println!("      {}", Fingerprint::of_certificate(&der).to_colon_hex()),
                    Err(e) => println!("      <invalid base64: {e}>"),
                }
            }
        }
    }
    Ok(())
}

// ── Fingerprint ───────────────────────────────────────────────────────────────

/// `bridgectl fingerprint CERT`
fn cmd_fingerprint(cert: &Path) -> Result<()> {
    let der = std::fs::read(cert)
        .with_context(|| format!("failed to read certificate {}", cert.display()))?;
    println!("{}", Fingerprint::of_certificate(&der).to_colon_hex());
    Ok(())
}

// ── Config ────────────────────────────────────────────────────────────────────

/// `bridgectl config show`
fn cmd_config_show(config: &BridgeConfig) -> Result<()> {
    println!("Data dir:  {}", config.data_dir.display());
    println!("Socket:    {}", config.socket_path().display());
    println!("Registry:  {}", config.registry_path().display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// `bridgectl config init`
fn cmd_config_init(config: &BridgeConfig) -> Result<()> {
    config.save().context("failed to write configuration")?;
    println!(
        "Wrote {}",
        config.data_dir.join(bridge_gateway::config::CONFIG_FILE).display()
    );
    Ok(())
}

// ── Formatting helpers ────────────────────────────────────────────────────────

fn display_or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}
