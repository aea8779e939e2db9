// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! schedctl: command-line client for curve-schedulerd.

use anyhow::Context;
use clap::{Parser, Subcommand};
use curve_scheduler::config;
use curve_scheduler::graph::Graph;
use curve_scheduler::protocol::{self, Request, Response};
use curve_scheduler::scheduler::ConfigPatch;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "schedctl", about = "Manage curve schedulers")]
struct Cli {
    /// Path to the daemon socket.
    #[arg(short, long, default_value = config::DEFAULT_SOCKET_PATH)]
    socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every scheduler configuration.
    List,

    /// Create a scheduler with a flat default graph.
    Create { entity_id: String, name: String },

    /// Change a scheduler's settings. Creates it if missing.
    Set {
        entity_id: String,

        #[arg(long)]
        name: Option<String>,

        /// Override the domain derived from the entity id.
        #[arg(long)]
        domain: Option<String>,

        /// Seconds between clock-aligned updates.
        #[arg(long)]
        interval: Option<u64>,

        #[arg(long)]
        graphs_per_row: Option<u32>,

        /// JSON file holding an array of graphs.
        #[arg(long)]
        graphs: Option<PathBuf>,
    },

    Delete { entity_id: String },

    /// Evaluate once, now.
    Apply { entity_id: String },

    /// Enable a scheduler.
    On { entity_id: String },

    /// Disable a scheduler.
    Off { entity_id: String },

    /// Show the current value and the next change.
    Preview { entity_id: String },
}

// ---------------------------------------------------------------------------
// Daemon connection
// ---------------------------------------------------------------------------

struct Connection {
    stream: UnixStream,
    reader: BufReader<UnixStream>,
}

impl Connection {
    fn connect(path: &str) -> io::Result<Self> {
        let stream = UnixStream::connect(path)?;
        stream.set_read_timeout(Some(Duration::from_secs(30)))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    fn send_request(&mut self, req: &Request) -> io::Result<Response> {
        let encoded = protocol::encode(req).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Encode error: {e}"))
        })?;
        self.stream.write_all(encoded.as_bytes())?;
        self.stream.flush()?;

        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        protocol::decode(&line).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("Decode error: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let request = build_request(cli.command)?;

    let mut conn = Connection::connect(&cli.socket)
        .with_context(|| format!("Could not connect to daemon at {}", cli.socket))?;
    log::debug!("Sending {request:?}");
    let response = conn.send_request(&request)?;

    match response {
        Response::Ok { message } => println!("{message}"),
        Response::Error { message } => anyhow::bail!(message),
        Response::Schedulers { schedulers } => {
            println!("{}", serde_json::to_string_pretty(&schedulers)?)
        }
        Response::Applied { outcome } => println!("{}", serde_json::to_string_pretty(&outcome)?),
        Response::Preview { preview } => println!("{}", serde_json::to_string_pretty(&preview)?),
    }
    Ok(())
}

fn build_request(command: Command) -> anyhow::Result<Request> {
    let req = match command {
        Command::List => Request::ListSchedulers,
        Command::Create { entity_id, name } => Request::CreateScheduler { name, entity_id },
        Command::Set {
            entity_id,
            name,
            domain,
            interval,
            graphs_per_row,
            graphs,
        } => {
            let graphs = graphs.as_deref().map(read_graphs).transpose()?;
            Request::SetConfig {
                entity_id,
                patch: ConfigPatch {
                    name,
                    domain: domain.map(Into::into),
                    update_interval: interval,
                    graphs_per_row,
                    graphs,
                    ..ConfigPatch::default()
                },
            }
        }
        Command::Delete { entity_id } => Request::DeleteScheduler { entity_id },
        Command::Apply { entity_id } => Request::ApplyNow { entity_id },
        Command::On { entity_id } => Request::TurnOn { entity_id },
        Command::Off { entity_id } => Request::TurnOff { entity_id },
        Command::Preview { entity_id } => Request::Preview { entity_id },
    };
    Ok(req)
}

fn read_graphs(path: &std::path::Path) -> anyhow::Result<Vec<Graph>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let graphs: Vec<Graph> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse graphs in {}", path.display()))?;
    for graph in &graphs {
        graph.validate().map_err(anyhow::Error::msg)?;
    }
    Ok(graphs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_graphs_reports_validation_error_once() {
        let path = std::env::temp_dir().join(format!("schedctl-graphs-{}.json", std::process::id()));
        std::fs::write(&path, r#"[{"id": "g", "weekdays": [9]}]"#).unwrap();

        let err = read_graphs(&path).unwrap_err();
        assert_eq!(err.to_string(), "Graph 'g': weekday 9 is out of range 0-6");

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_set_builds_patch() {
        let req = build_request(Command::Set {
            entity_id: "fan.attic".to_string(),
            name: None,
            domain: Some("fan".to_string()),
            interval: Some(60),
            graphs_per_row: None,
            graphs: None,
        })
        .unwrap();
        let Request::SetConfig { entity_id, patch } = req else {
            panic!("wrong request variant");
        };
        assert_eq!(entity_id, "fan.attic");
        assert_eq!(patch.update_interval, Some(60));
        assert!(patch.graphs.is_none());
    }
}
