use config::Config;
use log::warn;
use serde::Deserialize;
use std::{env, path::PathBuf};

/// Name of the environment variable that overrides the log file destination.
/// It is consulted every time a record is flushed, so the destination can be
/// switched between records without restarting the server.
pub const LOG_FILE_VAR: &str = "STAMPEDE_LOG_FILE";

/// The log server configuration. Loaded once at process start and shared
/// read-only by every component; nothing reads settings from ambient state
/// after startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// The logging port. Port 0 asks the OS for an ephemeral port.
    pub port: u16,

    /// The number of listener (dispatch) threads.
    pub listener_threads: usize,

    /// The listen queue size. Non-positive means the OS default.
    pub listen_queue_size: i32,

    /// Service thread pool sizing.
    pub service_threads: ServiceThreads,

    /// Chunk size in bytes for the segmented record buffers.
    pub buffer_size: usize,

    /// Size of the per-connection read buffer.
    pub read_buffer_size: usize,

    /// How long a worker probes for the first byte of a turn.
    pub probe_timeout_millis: u64,

    /// How long a worker waits for bytes while the protocol is undetermined.
    pub header_timeout_millis: u64,

    /// How long a worker waits for bytes while accumulating a record.
    pub read_timeout_millis: u64,

    /// Default destination for flushed records, unless overridden by the
    /// environment at flush time.
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceThreads {
    /// Base number of service threads.
    pub core: usize,

    /// Maximum number of service threads.
    pub max: usize,

    /// Idle seconds before a surplus service thread is terminated.
    pub time_out: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9999,
            listener_threads: 1,
            listen_queue_size: -1,
            service_threads: ServiceThreads::default(),
            buffer_size: 2048,
            read_buffer_size: 2048,
            probe_timeout_millis: 100,
            header_timeout_millis: 1000,
            read_timeout_millis: 10000,
            log_file: env::temp_dir().join("log.xml"),
        }
    }
}

impl Default for ServiceThreads {
    fn default() -> Self {
        Self {
            core: 2,
            max: 10,
            time_out: 300,
        }
    }
}

impl ServerConfig {
    /// Merges the `Settings` file (if present) with `STAMPEDE_` environment
    /// overrides. A malformed or missing configuration is not fatal: the
    /// failure is logged and the documented defaults are used, so the server
    /// still starts.
    pub fn load() -> Self {
        let loaded = Config::builder()
            .add_source(config::File::with_name("Settings").required(false))
            .add_source(config::Environment::with_prefix("STAMPEDE"))
            .build()
            .and_then(|config| config.try_deserialize::<ServerConfig>());

        match loaded {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load settings, falling back to defaults: {e}");
                ServerConfig::default()
            }
        }
    }

    /// The destination for the next flush, resolved at call time.
    pub fn flush_path(&self) -> PathBuf {
        env::var(LOG_FILE_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.log_file.clone())
    }
}
