//! outreach-api - tenant-isolated outreach core service
//!
//! Serves the workspace-scoped REST API, webhook intake, candidate
//! optimizer, and the orphan recovery job trigger.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use outreach_api::{build_router, AppState};
use outreach_common::config::{database_path, resolve_root_folder};
use outreach_common::db::{ensure_setting, get_setting, get_setting_i64, init_database};
use outreach_common::token::generate_token;

#[derive(Parser, Debug)]
#[command(name = "outreach-api", version, about = "Outreach core API service")]
struct Args {
    /// Root folder holding the database (overrides OUTREACH_ROOT and config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8470")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting outreach-api v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), "OUTREACH_ROOT")?;
    let db_path = database_path(&root_folder)?;
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;

    // The job trigger secret is generated on first startup and kept in the
    // settings table; the external scheduler reads it from there
    if get_setting(&pool, "cron_secret").await?.is_none() {
        ensure_setting(&pool, "cron_secret", &generate_token()).await?;
        info!("Generated new cron secret");
    }
    let cron_secret = get_setting(&pool, "cron_secret")
        .await?
        .unwrap_or_default();

    let max_body_bytes =
        get_setting_i64(&pool, "http_max_body_size_bytes", 1_048_576).await? as usize;

    let mut state = AppState::new(pool, cron_secret);
    state.max_body_bytes = max_body_bytes;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("outreach-api listening on http://{}", args.listen);
    info!("Health check: http://{}/health", args.listen);

    axum::serve(listener, app).await?;

    Ok(())
}
