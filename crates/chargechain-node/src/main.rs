mod api;
mod constants;
mod notify;

use chargechain_core::{
    chain::Chain,
    constants::DEFAULT_DIFFICULTY,
    recorder::{Recorder, RecorderConfig},
};
use chargechain_store::MemoryStore;
use clap::Parser;
use constants::{DEFAULT_MINE_TIMEOUT_SECS, DEFAULT_PORT, TWILIO_API_BASE};
use notify::Notifier;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chargechain-node")]
#[command(about = "Records charges on a proof-of-work chain and texts the counterparties")]
struct Args {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Leading zero hex characters required of a block hash
    #[arg(long, env = "DIFFICULTY", default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Give up mining a block after this many nonces
    #[arg(long, env = "MINE_MAX_ATTEMPTS")]
    max_attempts: Option<u64>,

    /// Give up mining a block after this many seconds (0 = never)
    #[arg(long, env = "MINE_TIMEOUT_SECS", default_value_t = DEFAULT_MINE_TIMEOUT_SECS)]
    mine_timeout_secs: u64,

    /// Search nonces on all cores
    #[arg(long, env = "PARALLEL_MINING")]
    parallel: bool,

    /// Directory served for non-API paths
    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    static_dir: PathBuf,

    /// Twilio account SID
    #[arg(long, env = "TWILIO_SID", hide_env_values = true)]
    twilio_sid: Option<String>,

    /// Twilio auth token
    #[arg(long, env = "TWILIO_AUTH", hide_env_values = true)]
    twilio_auth: Option<String>,

    /// Sender number for SMS; defaults to the payer's number
    #[arg(long, env = "TWILIO_FROM")]
    twilio_from: Option<String>,

    #[arg(long, env = "TWILIO_API_BASE", default_value = TWILIO_API_BASE, hide = true)]
    twilio_api_base: String,
}

impl Args {
    fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            difficulty: self.difficulty,
            max_attempts: self.max_attempts,
            timeout: (self.mine_timeout_secs > 0)
                .then(|| Duration::from_secs(self.mine_timeout_secs)),
            parallel: self.parallel,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let args = Args::parse();
    let chain = Chain::new(Arc::new(MemoryStore::new()));
    chain.ensure_genesis()?;

    let config = args.recorder_config();
    info!(
        difficulty = config.difficulty,
        parallel = config.parallel,
        "recorder ready"
    );
    let recorder = Arc::new(Recorder::new(chain, config));
    let cancel = recorder.cancel_handle();

    let notifier = Notifier::from_credentials(
        &args.twilio_api_base,
        args.twilio_sid.clone(),
        args.twilio_auth.clone(),
        args.twilio_from.clone(),
    )?;
    if !notifier.is_enabled() {
        warn!("TWILIO_SID / TWILIO_AUTH not set; SMS notifications disabled");
    }

    let app = api::router(api::AppState::new(recorder, notifier))
        .fallback_service(ServeDir::new(&args.static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!("chargechain-node listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;
    Ok(())
}

/// Waits for Ctrl-C, then stops any block being mined.
async fn shutdown_signal(cancel: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    cancel.store(true, Ordering::Relaxed);
}
