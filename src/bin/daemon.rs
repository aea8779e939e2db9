// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! curve-schedulerd: system service that runs curve schedulers against Home
//! Assistant and accepts commands from clients over a Unix domain socket.

use clap::Parser;
use curve_scheduler::clock::LocalClock;
use curve_scheduler::config::{self, Config};
use curve_scheduler::hass::HassClient;
use curve_scheduler::manager::SchedulerManager;
use curve_scheduler::protocol::{self, Request, Response};
use curve_scheduler::store::JsonFileStore;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "curve-schedulerd", about = "Curve scheduler daemon for Home Assistant")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the socket path.
    #[arg(short, long)]
    socket: Option<String>,

    /// Override the scheduler store path.
    #[arg(long)]
    store: Option<String>,
}

// ---------------------------------------------------------------------------
// Shared daemon state
// ---------------------------------------------------------------------------

type Manager = SchedulerManager<HassClient, JsonFileStore>;
type SharedState = Arc<Mutex<Manager>>;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(Some(&cli.config));
    let cfg = config::load_config(&config_path).unwrap_or_else(|e| {
        log::warn!("Could not load config: {e}, using defaults");
        Config::default()
    });

    let socket_path = cli
        .socket
        .clone()
        .unwrap_or_else(|| cfg.daemon.socket_path.clone());
    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| cfg.daemon.store_path.clone());

    let hass = Arc::new(HassClient::new(&cfg.home_assistant)?);
    log::info!("Using Home Assistant at {}", cfg.home_assistant.url);

    let shutdown = CancellationToken::new();
    let poller = Arc::clone(&hass).spawn_state_poller(
        Duration::from_millis(cfg.home_assistant.state_poll_ms.max(1)),
        shutdown.child_token(),
    );

    let mut manager = SchedulerManager::new(
        Arc::clone(&hass),
        Arc::new(LocalClock),
        JsonFileStore::new(&store_path),
    );
    match manager.restore() {
        Ok(n) => log::info!("Restored {n} scheduler(s)"),
        Err(e) => log::error!("Failed to restore schedulers from {store_path}: {e:#}"),
    }
    let state: SharedState = Arc::new(Mutex::new(manager));

    // Clean up old socket file
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;

    // Make socket accessible to non-root users
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o666);
        std::fs::set_permissions(&socket_path, perms)?;
    }

    log::info!("Listening on {socket_path}");

    // Signal handler
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        log::info!("Received shutdown signal");
        shutdown_signal.cancel();
    });

    // Accept client connections
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let state_clone = state.clone();
                        tokio::spawn(handle_client(stream, state_clone));
                    }
                    Err(e) => {
                        log::error!("Failed to accept connection: {e}");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                log::info!("Daemon shutting down");
                break;
            }
        }
    }

    state.lock().await.shutdown();
    if let Err(e) = poller.await {
        log::warn!("State poller ended abnormally: {e}");
    }

    // Cleanup socket
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

// ---------------------------------------------------------------------------
// Client connection handler
// ---------------------------------------------------------------------------

async fn handle_client(stream: UnixStream, state: SharedState) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let response = match protocol::decode::<Request>(&line) {
            Ok(req) => process_request(req, &state).await,
            Err(e) => Response::Error {
                message: format!("Invalid request: {e}"),
            },
        };

        let encoded = match protocol::encode(&response) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Failed to encode response: {e}");
                continue;
            }
        };

        if writer.write_all(encoded.as_bytes()).await.is_err() {
            break; // Client disconnected
        }
    }
}

async fn process_request(req: Request, state: &SharedState) -> Response {
    match req {
        // Evaluation awaits host I/O; run it without holding the lock.
        Request::ApplyNow { entity_id } => {
            let job = state.lock().await.apply_now(&entity_id);
            match job {
                Ok(job) => Response::Applied { outcome: job.await },
                Err(e) => error(e),
            }
        }

        Request::ListSchedulers => Response::Schedulers {
            schedulers: state.lock().await.list(),
        },

        Request::Preview { entity_id } => match state.lock().await.preview(&entity_id) {
            Ok(preview) => Response::Preview { preview },
            Err(e) => error(e),
        },

        Request::CreateScheduler { name, entity_id } => {
            ok_or_error(state.lock().await.create(&name, &entity_id), || {
                format!("Created scheduler '{name}' for {entity_id}")
            })
        }

        Request::SetConfig { entity_id, patch } => {
            ok_or_error(state.lock().await.set_config(&entity_id, patch), || {
                format!("Updated {entity_id}")
            })
        }

        Request::DeleteScheduler { entity_id } => {
            ok_or_error(state.lock().await.delete(&entity_id), || {
                format!("Deleted {entity_id}")
            })
        }

        Request::TurnOn { entity_id } => {
            ok_or_error(state.lock().await.set_enabled(&entity_id, true), || {
                format!("Turned on {entity_id}")
            })
        }

        Request::TurnOff { entity_id } => {
            ok_or_error(state.lock().await.set_enabled(&entity_id, false), || {
                format!("Turned off {entity_id}")
            })
        }
    }
}

fn ok_or_error(result: anyhow::Result<()>, message: impl FnOnce() -> String) -> Response {
    match result {
        Ok(()) => Response::Ok { message: message() },
        Err(e) => error(e),
    }
}

fn error(e: anyhow::Error) -> Response {
    log::warn!("Request failed: {e:#}");
    Response::Error {
        message: format!("{e:#}"),
    }
}
