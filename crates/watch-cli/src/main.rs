mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::{fmt, EnvFilter};

use watch_api::state::AppState;
use watch_core::{
    normalize_url, Checker, HttpProbe, LogMessenger, MemoryStore, Messenger, NetProber,
    ProbeReport, Prober, TargetStore, WebhookMessenger, DEFAULT_OPERATOR, SUBDOMAIN_EXEMPT,
    UNKNOWN_DAYS,
};

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        // Leak is fine — called once, lives for the program's lifetime.
        Box::leak(VERSION.to_string().into_boxed_str())
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// Site watcher — reachability, certificate, and domain-expiry monitoring.
#[derive(Parser)]
#[command(name = "sitewatch", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and HTTP API server.
    Serve {
        /// Listen address (e.g. 0.0.0.0:8080). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Check a single URL once and print the result (no server).
    Check {
        /// URL or hostname to check.
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, config } => {
            run_serve(listen, config).await;
        }
        Commands::Check { url } => {
            fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .init();
            run_check(url).await;
        }
    }
}

async fn run_serve(listen_override: Option<SocketAddr>, config_path: Option<PathBuf>) {
    let app_config = if let Some(ref path) = config_path {
        match config::AppConfig::load(path) {
            Ok(c) => {
                init_tracing(&c.server.log_format);
                tracing::info!(path = %path.display(), "Loaded config file");
                Some(c)
            }
            Err(e) => {
                init_tracing("pretty");
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
    } else {
        init_tracing("pretty");
        None
    };

    let listen = listen_override
        .or(app_config.as_ref().map(|c| c.server.listen))
        .unwrap_or_else(|| "0.0.0.0:8080".parse().unwrap());

    let watch_config = app_config
        .as_ref()
        .map(|c| c.defaults.to_watch_config())
        .unwrap_or_default();

    let store: Arc<dyn TargetStore> = Arc::new(MemoryStore::new());
    if let Some(ref app_config) = app_config {
        for def in &app_config.targets {
            let target = def.to_target_item();
            let url = target.url.clone();
            match store.add_target(target).await {
                Ok(true) => tracing::info!(%url, "Target registered from config"),
                Ok(false) => tracing::warn!(%url, "Duplicate target in config, skipped"),
                Err(e) => tracing::error!(%url, error = %e, "Failed to register target"),
            }
        }
    }

    let notifier = app_config.as_ref().and_then(|c| c.notifier.clone());
    let operator = notifier
        .as_ref()
        .map(|n| n.operator_id)
        .unwrap_or(DEFAULT_OPERATOR);
    let messenger: Arc<dyn Messenger> = match notifier {
        Some(def) => {
            tracing::info!(url = %def.url, "Using webhook notifier");
            Arc::new(WebhookMessenger::with_default_client(def.to_notifier_config()))
        }
        None => {
            tracing::info!("No notifier configured, messages are logged only");
            Arc::new(LogMessenger)
        }
    };

    let probe_client =
        HttpProbe::build_client(watch_config.http_timeout, &watch_config.user_agent);
    let prober = Arc::new(NetProber::with_client(probe_client, &watch_config));

    let checker = Arc::new(Checker::new(
        watch_config,
        Arc::clone(&store),
        prober,
        messenger,
        operator,
    ));
    checker.start().await;

    let state = AppState::new(Arc::clone(&checker), store);

    tracing::info!(%listen, "Starting sitewatch API server");
    if let Err(e) = watch_api::serve_with_state(listen, state, watch_api::shutdown_signal()).await
    {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown signal received, stopping scheduler...");
    checker.stop().await;
    tracing::info!("Shutdown complete");
}

async fn run_check(url: String) {
    let config = watch_core::WatchConfig::default();
    let normalized = normalize_url(&url);
    let prober = NetProber::new(&config);

    println!(
        "{} {}",
        style("sitewatch").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!("{}", style(&normalized).bold());
    println!();

    let report = prober.probe_all(&normalized).await;
    print_report(&report, config.expiry_warn_days);
}

fn print_report(report: &ProbeReport, warn_days: i64) {
    if report.reachable {
        println!("  {}    site is up", style("UP").green().bold());
    } else {
        println!("  {}  site is down", style("DOWN").red().bold());
    }

    match report.cert_days {
        UNKNOWN_DAYS => println!("  {}   could not be checked", style("SSL").dim()),
        days if days <= warn_days => println!(
            "  {}   expires in {} days",
            style("SSL").yellow().bold(),
            days
        ),
        days => println!("  {}   {} days until expiry", style("SSL").dim(), days),
    }

    match report.domain.days {
        SUBDOMAIN_EXEMPT => println!(
            "  {}  registration checks do not apply to sub-domains",
            style("DOM").dim()
        ),
        UNKNOWN_DAYS => println!("  {}   could not be checked", style("DOM").dim()),
        days if days <= warn_days => println!(
            "  {}   registration expires in {} days",
            style("DOM").yellow().bold(),
            days
        ),
        days => println!("  {}   {} days until registration expiry", style("DOM").dim(), days),
    }

    if let Some(ref registrar) = report.domain.registrar {
        println!("  {}  {}", style("reg:").dim(), registrar);
    }
    if let Some(ref contact) = report.domain.registrar_url {
        println!("  {}  {}", style("url:").dim(), contact);
    }
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt().with_env_filter(filter).init();
        }
    }
}
