use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use veil_core::bootstrap::{BootstrapConfig, OVERRIDES_ENV, PROFILES_ENV};
use veil_core::context::SerialContext;
use veil_core::paths::{profile_dir, settings_path};
use veil_core::settings::VeilSettings;
use veil_core::storage::load_settings;
use veil_service::discovery::{DiscoveryBackend, ProcessTable};
use veil_service::{ScannerEvent, VeilRuntime};

#[derive(Parser, Debug)]
#[command(author, version, about = "Veil runtime policy service", long_about = None)]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Track a process tree and protect what it owns until interrupted
    Run {
        #[arg(long)]
        pid: u32,
        /// Comma-separated profile list; falls back to VEIL_PROFILES
        #[arg(long, env = PROFILES_ENV)]
        profiles: Option<String>,
        /// JSON object of type -> {property -> value}; falls back to VEIL_OVERRIDES
        #[arg(long, env = OVERRIDES_ENV)]
        overrides: Option<String>,
        /// Classify this bundle instead of the process executable
        #[arg(long)]
        bundle: Option<PathBuf>,
    },
    /// Print the descendant tree of a process and its classification
    Tree {
        #[arg(long)]
        pid: u32,
    },
    /// Load profiles, apply some of them and print the resulting overrides
    Profiles {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        apply: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = match &cli.config {
        Some(p) => p.clone(),
        None => settings_path()?,
    };
    let settings = load_settings(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    init_tracing(&settings);

    match cli.command {
        Commands::Run {
            pid,
            profiles,
            overrides,
            bundle,
        } => run_command(settings, pid, profiles, overrides, bundle).await,
        Commands::Tree { pid } => tree_command(pid),
        Commands::Profiles { dir, apply } => profiles_command(settings, dir, apply),
    }
}

fn init_tracing(settings: &VeilSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_profile_dir(settings: &VeilSettings, explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit.or_else(|| settings.profile_dir.as_ref().map(PathBuf::from)) {
        Some(dir) => Ok(dir),
        None => profile_dir(),
    }
}

async fn run_command(
    settings: VeilSettings,
    pid: u32,
    profiles: Option<String>,
    overrides: Option<String>,
    bundle: Option<PathBuf>,
) -> Result<()> {
    let executor = Arc::new(SerialContext::spawn(
        "resources",
        &tokio::runtime::Handle::current(),
    ));
    let profile_dir = resolve_profile_dir(&settings, None)?;
    let runtime = VeilRuntime::new(settings, executor.clone())?;
    runtime.load_profiles(&profile_dir)?;

    let bootstrap = BootstrapConfig::from_parts(profiles.as_deref(), overrides.as_deref())?;
    let report = runtime.bootstrap(&bootstrap);
    if !report.failed_profiles.is_empty() {
        warn!(failed = ?report.failed_profiles, "some profiles could not be applied");
    }
    runtime.install_interceptors();

    let backend = runtime.audit_backend();
    let table = backend.table();
    if !table.contains(pid) {
        return Err(anyhow!("no process with pid {pid}"));
    }

    let scanner = runtime.scanner(backend.clone())?;
    let bundle = bundle.or_else(|| table.exe(pid).map(Path::to_path_buf));
    match bundle {
        Some(path) => {
            scanner.configure_for_bundle(&path);
        }
        None => warn!(pid, "executable path unknown, keeping default scan strategy"),
    }
    scanner.track_process(pid);
    scanner.set_adaptive(runtime.settings.scanner.adaptive);
    scanner.start(scanner.current_interval())?;

    let mut events = scanner.subscribe();
    let log_events = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ScannerEvent::BatchProtected { ids, skipped }) => {
                    info!(?ids, skipped, "batch protected");
                }
                Ok(ScannerEvent::IntervalChanged { from, to, resource_count }) => {
                    info!(?from, ?to, resource_count, "scan interval changed");
                }
                Ok(ScannerEvent::ProtectionFailed { id, reason }) => {
                    warn!(resource = id, %reason, "protection failed");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!(missed = n, "event log lagged"),
                Err(RecvError::Closed) => return,
            }
        }
    });

    info!(pid, app_type = %scanner.application_type(), "veil service running; ctrl-c to stop");
    signal::ctrl_c().await?;

    scanner.stop();
    log_events.abort();
    runtime.shutdown();
    executor.close().await;
    info!(
        protected = backend.protected_ids().len(),
        jobs = executor.completed_jobs(),
        "veil service stopped"
    );
    Ok(())
}

fn tree_command(pid: u32) -> Result<()> {
    let table = ProcessTable::snapshot();
    let root = table
        .get(pid)
        .ok_or_else(|| anyhow!("no process with pid {pid}"))?;
    let backend = veil_service::ProcessAuditBackend::with_table(table.clone(), Default::default());
    let app_type = root
        .exe
        .as_deref()
        .map(|exe| backend.classify_application(exe))
        .unwrap_or_default();

    println!("{} {} [{}]", root.pid, root.name, app_type);
    print_children(&table, &backend, pid, app_type, 1);
    Ok(())
}

fn print_children(
    table: &ProcessTable,
    backend: &dyn DiscoveryBackend,
    pid: u32,
    app_type: veil_service::AppType,
    depth: usize,
) {
    for &child in table.children(pid) {
        let name = table.name(child).unwrap_or("?");
        let marker = if backend.is_auxiliary_process(child, app_type) {
            " (auxiliary)"
        } else {
            ""
        };
        println!("{}{} {}{}", "  ".repeat(depth), child, name, marker);
        print_children(table, backend, child, app_type, depth + 1);
    }
}

fn profiles_command(settings: VeilSettings, dir: Option<PathBuf>, apply: Vec<String>) -> Result<()> {
    let dir = resolve_profile_dir(&settings, dir)?;
    let runtime = VeilRuntime::new(settings, Arc::new(veil_core::context::InlineContext))?;
    let loaded = runtime.load_profiles(&dir)?;
    println!("{loaded} profile(s) in {}", dir.display());
    for profile in runtime.profiles.all_profiles() {
        println!("  {} - {}", profile.name, profile.description);
    }

    let failed = runtime.profiles.apply_profiles(&apply);
    if !failed.is_empty() {
        warn!(?failed, "profiles not applied");
    }
    println!("{}", serde_json::to_string_pretty(&runtime.store.snapshot())?);
    Ok(())
}
