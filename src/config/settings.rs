use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Outbound frame buffer per session; a full buffer fails the send
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
    /// Depth of the connect/disconnect/chat notice queue
    #[serde(default = "default_notice_queue")]
    pub notice_queue: usize,
    /// Worker tasks draining the notice queue
    #[serde(default = "default_notifier_workers")]
    pub notifier_workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Decode backend: "remote" or "disabled"
    #[serde(default = "default_detector_backend")]
    pub backend: String,
    /// Endpoint of the remote decode service (required for "remote")
    pub endpoint: Option<String>,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_detector_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted photo upload size in bytes
    #[serde(default = "default_upload_max_bytes")]
    pub max_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_session_buffer() -> usize {
    32
}

fn default_notice_queue() -> usize {
    256
}

fn default_notifier_workers() -> usize {
    4
}

fn default_detector_backend() -> String {
    "disabled".to_string()
}

fn default_detector_timeout_ms() -> u64 {
    5000 // 5 seconds
}

fn default_upload_max_bytes() -> usize {
    10 * 1024 * 1024 // 10 MiB
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("hub.session_buffer", 32)?
            .set_default("hub.notice_queue", 256)?
            .set_default("hub.notifier_workers", 4)?
            .set_default("detector.backend", "disabled")?
            .set_default("detector.timeout_ms", 5000)?
            .set_default("upload.max_bytes", 10 * 1024 * 1024)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, DETECTOR_ENDPOINT, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            session_buffer: default_session_buffer(),
            notice_queue: default_notice_queue(),
            notifier_workers: default_notifier_workers(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: default_detector_backend(),
            endpoint: None,
            timeout_ms: default_detector_timeout_ms(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_upload_max_bytes(),
        }
    }
}
