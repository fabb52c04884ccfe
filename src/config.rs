//! Layered TOML configuration. The base file is required; an
//! environment-specific overlay (`config.{env}.toml`, selected by `--dev`
//! or `CONFIG_ENV`) and a git-ignored `config.local.toml` merge on top.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub zeromq: ZeroMqConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTPS is served when this section is present and both files exist;
    /// provisioning the certificate is someone else's job.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZeroMqConfig {
    /// EA→relay PULL socket. 0 = OS-assigned, persisted across restarts.
    pub receiver_port: u16,
    /// relay→EA PUB socket. 0 = OS-assigned, persisted across restarts.
    pub publisher_port: u16,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i64,
    /// How long Timeout/Offline connections stay visible before eviction.
    #[serde(default = "default_offline_grace_seconds")]
    pub offline_grace_seconds: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Legacy third port from the retired 3-port topology. Parsed so old
    /// config files keep loading, warned about at startup, never used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_sender_port: Option<u16>,
}

fn default_timeout_seconds() -> i64 {
    30
}

fn default_offline_grace_seconds() -> i64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allow every origin. Development only.
    #[serde(default)]
    pub disable: bool,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// "daily", "hourly" or "never".
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
    /// 0 = unlimited.
    #[serde(default = "default_log_max_files")]
    pub max_files: u32,
}

fn default_logging_enabled() -> bool {
    true
}
fn default_log_directory() -> String {
    "logs".to_string()
}
fn default_log_file_prefix() -> String {
    "copyflow-relay".to_string()
}
fn default_log_rotation() -> String {
    "daily".to_string()
}
fn default_log_max_files() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            rotation: default_log_rotation(),
            max_files: default_log_max_files(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

impl Config {
    /// Load the layered configuration rooted at `base` (a path to the base
    /// config file, with or without the `.toml` extension).
    pub fn load<P: AsRef<Path>>(base: P, env_overlay: Option<&str>) -> Result<Self> {
        let base = base.as_ref();
        let base_str = base
            .to_str()
            .context("config path is not valid UTF-8")?
            .trim_end_matches(".toml")
            .to_string();

        let mut builder =
            config::Config::builder().add_source(config::File::with_name(&base_str));

        if let Some(env) = env_overlay {
            builder = builder.add_source(
                config::File::with_name(&format!("{}.{}", base_str, env)).required(false),
            );
        }

        builder = builder
            .add_source(config::File::with_name(&format!("{}.local", base_str)).required(false));

        builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Log anything a careful operator should fix. Currently: the retired
    /// third ZeroMQ port.
    pub fn warn_on_legacy_keys(&self) {
        if let Some(port) = self.zeromq.config_sender_port {
            tracing::warn!(
                config_sender_port = port,
                "zeromq.config_sender_port is from the retired 3-port topology and is ignored; \
                 config messages share the publisher port"
            );
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                request_timeout_secs: default_request_timeout_secs(),
            },
            database: DatabaseConfig {
                url: "sqlite://copyflow_relay.db?mode=rwc".to_string(),
            },
            zeromq: ZeroMqConfig {
                receiver_port: 5555,
                publisher_port: 5556,
                timeout_seconds: default_timeout_seconds(),
                offline_grace_seconds: default_offline_grace_seconds(),
                sweep_interval_secs: default_sweep_interval_secs(),
                config_sender_port: None,
            },
            cors: CorsConfig::default(),
            logging: LoggingConfig::default(),
            tls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_ports() {
        let config = Config::default();
        assert_eq!(config.zeromq.receiver_port, 5555);
        assert_eq!(config.zeromq.publisher_port, 5556);
        assert_eq!(config.zeromq.timeout_seconds, 30);
        assert_eq!(config.server.request_timeout_secs, 30);
        assert_eq!(config.server_address(), "0.0.0.0:8080");
    }

    #[test]
    fn parses_a_minimal_file() {
        let toml_str = r#"
[server]
host = "127.0.0.1"
port = 9000

[database]
url = "sqlite://relay.db"

[zeromq]
receiver_port = 7777
publisher_port = 7778
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.zeromq.receiver_port, 7777);
        assert_eq!(config.zeromq.timeout_seconds, 30);
        assert_eq!(config.zeromq.sweep_interval_secs, 10);
        assert!(config.tls.is_none());
        assert!(config.zeromq.config_sender_port.is_none());
    }

    #[test]
    fn legacy_third_port_still_parses() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 8080

[database]
url = "sqlite://relay.db"

[zeromq]
receiver_port = 5555
publisher_port = 5556
config_sender_port = 5557
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.zeromq.config_sender_port, Some(5557));
    }

    #[test]
    fn overlay_files_merge_on_top_of_the_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&base).unwrap();
        write!(
            file,
            r#"
[server]
host = "0.0.0.0"
port = 8080

[database]
url = "sqlite://relay.db"

[zeromq]
receiver_port = 5555
publisher_port = 5556
"#
        )
        .unwrap();

        let overlay = dir.path().join("config.dev.toml");
        let mut file = std::fs::File::create(&overlay).unwrap();
        write!(
            file,
            r#"
[server]
port = 9999

[cors]
disable = true
"#
        )
        .unwrap();

        let plain = Config::load(&base, None).unwrap();
        assert_eq!(plain.server.port, 8080);
        assert!(!plain.cors.disable);

        let dev = Config::load(&base, Some("dev")).unwrap();
        assert_eq!(dev.server.port, 9999);
        assert!(dev.cors.disable);
        // Values the overlay does not mention come from the base.
        assert_eq!(dev.zeromq.receiver_port, 5555);
    }
}
