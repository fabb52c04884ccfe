//! Dynamic port resolution. A configured port of 0 means "let the OS pick";
//! the pick is persisted to the runtime-ports file so EAs keep their
//! endpoints across relay restarts. A persisted port that is no longer
//! bindable is replaced and re-persisted.

use std::net::TcpListener;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::config::ZeroMqConfig;
use crate::db::RuntimePorts;

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPorts {
    pub receiver_port: u16,
    pub publisher_port: u16,
    /// True when at least one port came from OS assignment.
    pub is_dynamic: bool,
    pub generated_at: Option<String>,
}

impl ResolvedPorts {
    pub fn receiver_address(&self) -> String {
        format!("tcp://*:{}", self.receiver_port)
    }

    pub fn publisher_address(&self) -> String {
        format!("tcp://*:{}", self.publisher_port)
    }

    pub fn as_runtime_ports(&self) -> RuntimePorts {
        RuntimePorts {
            receiver_port: self.receiver_port,
            publisher_port: self.publisher_port,
            generated_at: self
                .generated_at
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
        }
    }
}

/// Resolve the two socket ports against the runtime-ports file.
pub fn resolve_ports<P: AsRef<Path>>(zmq: &ZeroMqConfig, runtime_path: P) -> Result<ResolvedPorts> {
    let runtime_path = runtime_path.as_ref();

    if zmq.receiver_port != 0 && zmq.publisher_port != 0 {
        tracing::info!(
            receiver_port = zmq.receiver_port,
            publisher_port = zmq.publisher_port,
            "using fixed ports from config"
        );
        return Ok(ResolvedPorts {
            receiver_port: zmq.receiver_port,
            publisher_port: zmq.publisher_port,
            is_dynamic: false,
            generated_at: None,
        });
    }

    let persisted = load_runtime_file(runtime_path);

    // Probe listeners stay alive until resolution finishes so two dynamic
    // ports can never collide with each other.
    let mut probes: Vec<TcpListener> = Vec::new();

    let mut reused = true;
    let receiver_port = pick_port(
        zmq.receiver_port,
        persisted.as_ref().map(|p| p.receiver_port),
        &mut probes,
        &mut reused,
    )?;
    let publisher_port = pick_port(
        zmq.publisher_port,
        persisted.as_ref().map(|p| p.publisher_port),
        &mut probes,
        &mut reused,
    )?;

    let generated_at = match (&persisted, reused) {
        (Some(p), true) => p.generated_at.clone(),
        _ => Utc::now().to_rfc3339(),
    };

    let resolved = ResolvedPorts {
        receiver_port,
        publisher_port,
        is_dynamic: true,
        generated_at: Some(generated_at),
    };

    if persisted.as_ref() != Some(&resolved.as_runtime_ports()) {
        save_runtime_file(runtime_path, &resolved.as_runtime_ports())?;
        tracing::info!(
            path = %runtime_path.display(),
            receiver_port,
            publisher_port,
            "persisted runtime ports"
        );
    }

    drop(probes);
    Ok(resolved)
}

fn pick_port(
    configured: u16,
    persisted: Option<u16>,
    probes: &mut Vec<TcpListener>,
    reused: &mut bool,
) -> Result<u16> {
    if configured != 0 {
        return Ok(configured);
    }

    if let Some(port) = persisted {
        if port != 0 {
            if let Ok(listener) = TcpListener::bind(("0.0.0.0", port)) {
                probes.push(listener);
                return Ok(port);
            }
            tracing::warn!(port, "persisted port is no longer bindable, reallocating");
        }
    }

    *reused = false;
    let listener =
        TcpListener::bind("0.0.0.0:0").context("failed to allocate a dynamic port")?;
    let port = listener.local_addr()?.port();
    probes.push(listener);
    Ok(port)
}

fn load_runtime_file(path: &Path) -> Option<RuntimePorts> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str::<RuntimePorts>(&content) {
            Ok(ports) => Some(ports),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "ignoring unreadable runtime-ports file"
                );
                None
            }
        },
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read runtime-ports file");
            None
        }
    }
}

fn save_runtime_file(path: &Path, ports: &RuntimePorts) -> Result<()> {
    let body = toml::to_string_pretty(ports).context("failed to serialize runtime ports")?;
    let header = "# Written by the relay when dynamic ports are in use.\n\
                  # Delete to force re-assignment on the next start.\n\n";
    std::fs::write(path, format!("{}{}", header, body))
        .with_context(|| format!("failed to write {}", path.display()))
}
