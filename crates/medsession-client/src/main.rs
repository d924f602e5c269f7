//! medsession binary.
//!
//! Keeps an outpatient session alive from a terminal: each line on stdin
//! counts as keyboard activity, and a line starting with `/` is also sent as
//! an authenticated GET through the request gateway.
//!
//! # Usage
//!
//! ```bash
//! # Resume the persisted session, or log in
//! MEDSESSION_PASSWORD=... medsession --email iyer@example.org
//!
//! # Point at another backend
//! medsession --config medsession.toml --base-url https://opd.example.org/api
//! ```
//!
//! Exits when the session expires, on EOF (after logging out), or on Ctrl-C
//! (session kept for the next run).

use std::path::PathBuf;

use clap::Parser;
use medsession_client::{ApiRequest, ClientError, RuntimeConfig};
use medsession_core::ActivitySignal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Session lifecycle coordinator for the outpatient frontend
#[derive(Parser, Debug)]
#[command(name = "medsession")]
#[command(about = "Outpatient session lifecycle coordinator")]
#[command(version)]
struct Args {
    /// Path to TOML configuration
    #[arg(short, long, default_value = "medsession.toml")]
    config: PathBuf,

    /// Backend base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Login email, used when no session is persisted
    #[arg(short, long)]
    email: Option<String>,

    /// Login password
    #[arg(long, env = "MEDSESSION_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Why the interactive loop ended.
enum Exit {
    Expired,
    EndOfInput,
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut config = RuntimeConfig::load(&args.config)?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }

    tracing::info!(base_url = %config.base_url, storage = %config.storage_path.display(), "medsession starting");

    let (runtime, gateway) = medsession_client::connect(&config)?;
    runtime.start();

    if runtime.snapshot().is_authenticated {
        tracing::info!("Resumed persisted session");
    } else {
        let (Some(email), Some(password)) = (args.email.as_deref(), args.password.as_deref()) else {
            runtime.stop().await;
            return Err("no persisted session: pass --email and set MEDSESSION_PASSWORD".into());
        };
        let snapshot = runtime.login(email, password).await?;
        tracing::info!(user = ?snapshot.user.map(|u| u.name), "Logged in");
    }

    let mut session = runtime.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let exit = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    runtime.record_activity(ActivitySignal::Keyboard).await;
                    let path = line.trim();
                    if path.starts_with('/') {
                        match gateway.send(&ApiRequest::get(path)).await {
                            Ok(response) => tracing::info!(path, status = response.status, "Request completed"),
                            Err(e) => tracing::warn!(path, error = %e, "Request failed"),
                        }
                    }
                },
                Ok(None) => break Exit::EndOfInput,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break Exit::EndOfInput;
                },
            },
            expired = session.wait_for(|s| s.is_expired) => {
                break if expired.is_ok() { Exit::Expired } else { Exit::Interrupted };
            },
            _ = tokio::signal::ctrl_c() => break Exit::Interrupted,
        }
    };

    match exit {
        Exit::Expired => tracing::warn!("Session expired; log in again to continue"),
        Exit::EndOfInput => {
            if let Err(e) = runtime.logout().await {
                log_client_error(&e);
            }
            tracing::info!("Logged out");
        },
        Exit::Interrupted => tracing::info!("Interrupted; session kept for next run"),
    }

    runtime.stop().await;

    Ok(())
}

fn log_client_error(e: &ClientError) {
    if e.is_fatal() {
        tracing::error!(error = %e, "Logout failed");
    } else {
        tracing::warn!(error = %e, "Logout failed");
    }
}
