//! Supervisor: load config, bring up the store, sockets and long-lived
//! loops, serve HTTP(S), and propagate shutdown. Unrecoverable startup
//! errors (config parse, migration, bind) exit nonzero.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{broadcast, mpsc, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use copyflow_relay::api::{create_router, AppState};
use copyflow_relay::config::{Config, LoggingConfig};
use copyflow_relay::config_feed::ConfigFeed;
use copyflow_relay::connection_manager::ConnectionManager;
use copyflow_relay::db::Database;
use copyflow_relay::log_buffer::{create_log_buffer, LogBufferLayer};
use copyflow_relay::message_handler::{run_ingress_pump, MessageHandler};
use copyflow_relay::port_resolver;
use copyflow_relay::status::{RuntimeStatusMetrics, StatusService};
use copyflow_relay::wire::InboundMessage;
use copyflow_relay::zeromq::{ZmqPublisher, ZmqServer};

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    dev: bool,
}

fn parse_args() -> Result<CliArgs> {
    let mut args = CliArgs::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .context("--config requires a path argument")?;
                args.config = Some(PathBuf::from(path));
            }
            "--dev" => args.dev = true,
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(args)
}

/// Delete rotated log files beyond the retention count.
fn cleanup_old_logs(logging: &LoggingConfig) {
    if logging.max_files == 0 {
        return;
    }
    let dir = Path::new(&logging.directory);
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    let mut files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&logging.file_prefix))
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((entry.path(), modified))
        })
        .collect();

    files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in files.iter().skip(logging.max_files as usize) {
        if let Err(err) = std::fs::remove_file(path) {
            eprintln!("failed to delete old log file {:?}: {}", path, err);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    // rustls needs a process-wide crypto provider before any TLS use.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let env_overlay = if args.dev {
        Some("dev".to_string())
    } else {
        std::env::var("CONFIG_ENV").ok()
    };

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        Config::load(&config_path, env_overlay.as_deref())?
    } else if args.config.is_some() {
        bail!("config file not found: {}", config_path.display());
    } else {
        eprintln!(
            "no config file at {}, using built-in defaults",
            config_path.display()
        );
        Config::default()
    };

    // Logging: console + in-memory ring buffer + optional rolling file.
    let log_buffer = create_log_buffer();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let mut logging = config.logging.clone();
    if let Ok(dir) = std::env::var("LOG_DIR") {
        logging.directory = dir;
    }

    let (file_layer, _file_guard) = if logging.enabled {
        if let Err(err) = std::fs::create_dir_all(&logging.directory) {
            eprintln!("failed to create log directory {}: {}", logging.directory, err);
        }
        cleanup_old_logs(&logging);

        let appender = match logging.rotation.as_str() {
            "hourly" => tracing_appender::rolling::hourly(&logging.directory, &logging.file_prefix),
            "never" => tracing_appender::rolling::never(&logging.directory, &logging.file_prefix),
            _ => tracing_appender::rolling::daily(&logging.directory, &logging.file_prefix),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(LogBufferLayer::new(log_buffer.clone()))
        .with(file_layer)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting copyflow relay");
    config.warn_on_legacy_keys();

    // Socket ports, resolving 0 to an OS pick persisted next to the config.
    let runtime_ports_path = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("runtime-ports.toml");
    let resolved_ports = port_resolver::resolve_ports(&config.zeromq, &runtime_ports_path)?;
    tracing::info!(
        receiver = %resolved_ports.receiver_address(),
        publisher = %resolved_ports.publisher_address(),
        dynamic = resolved_ports.is_dynamic,
        "socket ports resolved"
    );

    // Store: open + migrate. DATABASE_URL overrides the config.
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database.url.clone());
    let db = Arc::new(
        Database::connect(&database_url)
            .await
            .with_context(|| format!("failed to open database {}", database_url))?,
    );
    tracing::info!(url = %database_url, "database ready");

    if resolved_ports.is_dynamic {
        db.set_runtime_ports(&resolved_ports.as_runtime_ports())
            .await
            .context("failed to persist runtime ports")?;
    }

    // Shared plumbing.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (ingress_tx, ingress_rx) = mpsc::unbounded_channel::<InboundMessage>();
    let (events_tx, _) = broadcast::channel::<String>(256);

    let publisher = Arc::new(
        ZmqPublisher::bind(&resolved_ports.publisher_address())
            .context("failed to bind publisher socket")?,
    );
    let zmq_server = Arc::new(ZmqServer::new(ingress_tx));
    zmq_server
        .start(&resolved_ports.receiver_address())
        .context("failed to start ingress socket")?;

    let connections = Arc::new(ConnectionManager::new(
        config.zeromq.timeout_seconds,
        config.zeromq.offline_grace_seconds,
    ));
    let metrics = Arc::new(RuntimeStatusMetrics::default());
    let feed = Arc::new(ConfigFeed::new(publisher.clone()));
    let status = Arc::new(StatusService::new(
        db.clone(),
        connections.clone(),
        feed.clone(),
        metrics.clone(),
        events_tx.clone(),
    ));

    // Ingress pump.
    let handler = Arc::new(MessageHandler::new(
        connections.clone(),
        db.clone(),
        status.clone(),
        feed.clone(),
        events_tx.clone(),
    ));
    tokio::spawn(run_ingress_pump(handler, ingress_rx, shutdown_rx.clone()));

    // Heartbeat sweeper.
    {
        let connections = connections.clone();
        let status = status.clone();
        let mut shutdown = shutdown_rx.clone();
        let interval = Duration::from_secs(config.zeromq.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for (account_id, role) in connections.sweep_timeouts().await {
                            status.handle_connection_event(&account_id, role).await;
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("heartbeat sweeper stopped");
        });
    }

    // Let already-listening EAs pick up the fleet settings right away.
    match db.get_vlogs_settings().await {
        Ok(settings) => feed.publish_vlogs(&settings),
        Err(err) => tracing::error!(error = %err, "failed to load vlogs settings at startup"),
    }

    // HTTP(S) surface.
    let app_state = AppState {
        db: db.clone(),
        connections: connections.clone(),
        status: status.clone(),
        feed: feed.clone(),
        events: events_tx.clone(),
        log_buffer: log_buffer.clone(),
        metrics: metrics.clone(),
        resolved_ports: Arc::new(resolved_ports),
        config: Arc::new(config.clone()),
    };
    let app = create_router(app_state);

    // Ctrl-C fans out to every loop through the watch channel.
    {
        let shutdown_tx = shutdown_tx.clone();
        let zmq_server = zmq_server.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                zmq_server.stop();
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let bind_address = config.server_address();
    let tls = config.tls.as_ref().filter(|tls| {
        Path::new(&tls.cert_path).exists() && Path::new(&tls.key_path).exists()
    });

    match tls {
        Some(tls) => {
            let rustls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &tls.cert_path,
                &tls.key_path,
            )
            .await
            .context("failed to load TLS certificate")?;

            let addr: std::net::SocketAddr = bind_address
                .parse()
                .with_context(|| format!("invalid bind address '{}'", bind_address))?;

            let handle = axum_server::Handle::new();
            {
                let handle = handle.clone();
                let mut shutdown = shutdown_rx.clone();
                tokio::spawn(async move {
                    while shutdown.changed().await.is_ok() {
                        if *shutdown.borrow() {
                            handle.graceful_shutdown(Some(Duration::from_secs(5)));
                            break;
                        }
                    }
                });
            }

            tracing::info!(address = %bind_address, "serving HTTPS");
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            if config.tls.is_some() {
                tracing::warn!("tls section configured but certificate files are missing, serving plain HTTP");
            }
            let listener = tokio::net::TcpListener::bind(&bind_address)
                .await
                .with_context(|| format!("failed to bind HTTP server to {}", bind_address))?;
            tracing::info!(address = %bind_address, "serving HTTP");

            let mut shutdown = shutdown_rx.clone();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    while shutdown.changed().await.is_ok() {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                })
                .await
                .context("HTTP server failed")?;
        }
    }

    zmq_server.stop();
    let _ = shutdown_tx.send(true);
    tracing::info!("relay stopped cleanly");
    Ok(())
}
