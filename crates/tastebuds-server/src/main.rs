//! Tastebuds — prompt × flavors × models generation server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tastebuds_core::TastebudsConfig;
use tastebuds_providers::{OpenRouterProvider, ProviderConfig};
use tastebuds_server::{admin, build_router, AppState};
use tastebuds_store::{FsArtifactStore, SqliteStore, Tier};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("TASTEBUDS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()));
            if let Some(dir) = exe_dir {
                let parent_data = dir.join("../data");
                if parent_data.exists() {
                    return parent_data;
                }
            }
            PathBuf::from("data")
        })
}

fn print_usage() {
    println!("Tastebuds — generate one prompt across flavors and models, then pick a winner");
    println!();
    println!("Usage: tastebuds [command]");
    println!();
    println!("Commands:");
    println!("  (none)                        Start the server");
    println!("  validate [data-dir]           Open the database and print row counts");
    println!("  grant <owner-id> <credits>    Add credits to an owner");
    println!("  tier <owner-id> <free|pro>    Set an owner's tier");
    println!("  help                          Show this help message");
}

fn usage_error(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Handle CLI subcommands
    if args.len() > 1 {
        match args[1].as_str() {
            "--validate" | "validate" => {
                let data_dir = args.get(2).map(PathBuf::from).unwrap_or_else(resolve_data_dir);
                let report = admin::validate(&data_dir);
                admin::print_report(&report);
                std::process::exit(if report.db_valid { 0 } else { 1 });
            }
            "grant" => {
                let (Some(owner), Some(amount)) = (args.get(2), args.get(3)) else {
                    usage_error("Usage: tastebuds grant <owner-id> <credits>");
                };
                let amount: i64 = amount
                    .parse()
                    .map_err(|_| anyhow::anyhow!("credits must be an integer: {}", amount))?;
                let config = TastebudsConfig::from_env(resolve_data_dir())?;
                let profile = admin::grant(&config.data_paths, owner, amount)?;
                admin::print_profile(&profile);
                return Ok(());
            }
            "tier" => {
                let (Some(owner), Some(tier)) = (args.get(2), args.get(3)) else {
                    usage_error("Usage: tastebuds tier <owner-id> <free|pro>");
                };
                let Some(tier) = Tier::parse(tier) else {
                    usage_error("Tier must be 'free' or 'pro'");
                };
                let config = TastebudsConfig::from_env(resolve_data_dir())?;
                let profile = admin::set_tier(&config.data_paths, owner, tier)?;
                admin::print_profile(&profile);
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                print_usage();
                return Ok(());
            }
            _ => {
                usage_error(&format!(
                    "Unknown command: {}. Use 'tastebuds help' for usage.",
                    args[1]
                ));
            }
        }
    }

    // Normal server startup
    let data_dir = resolve_data_dir();

    info!("Data directory: {}", data_dir.display());

    let config = TastebudsConfig::from_env(&data_dir)?;
    let port = config.port;
    let session_idle = config.session_idle_timeout();

    let store = Arc::new(
        SqliteStore::open(&config.data_paths.db)
            .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?,
    );
    let artifacts = Arc::new(FsArtifactStore::new(&config.data_paths.artifacts));

    let provider_config = ProviderConfig::load(&config.data_paths.provider_config_file);
    if !provider_config.is_configured() {
        warn!("No OpenRouter API key configured; every generation will fail");
    }
    let provider = Arc::new(OpenRouterProvider::new(provider_config.clone()));

    let state = Arc::new(AppState::new(
        config.limits,
        store,
        artifacts,
        provider,
        provider_config,
        session_idle,
    ));

    // Runs left pending by a previous process can never finish.
    state.orchestrator.recover_orphans()?;

    // Sweep abandoned comparison sessions so their documents are released.
    let sweeper = state.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            sweeper.sessions.evict_idle();
        }
    });

    let app = build_router(state.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Tastebuds server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
