use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_DIR: &str = "config";

/// Vision-model endpoint settings. Any OpenAI-compatible chat-completions
/// endpoint works; the defaults assume a local gateway.
#[derive(Clone, Debug, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_vision_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_vision_model")]
    pub model: String,
    /// Request timeout in seconds; the vision call is the dominant latency
    /// point of the capture flow.
    #[serde(default = "default_vision_timeout_secs")]
    pub timeout_secs: u64,
    /// Transport failures are retried at most this many times.
    #[serde(default = "default_vision_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_vision_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: default_vision_base_url(),
            api_key: None,
            model: default_vision_model(),
            timeout_secs: default_vision_timeout_secs(),
            max_retries: default_vision_max_retries(),
            retry_backoff_ms: default_vision_retry_backoff_ms(),
        }
    }
}

/// Image preparation limits. The ceiling is the hard transport bound on the
/// base64-inflated payload; the target leaves a safety margin under it.
#[derive(Clone, Debug, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_max_encoded_bytes")]
    pub max_encoded_bytes: usize,
    #[serde(default = "default_image_target_encoded_bytes")]
    pub target_encoded_bytes: usize,
    #[serde(default = "default_image_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_encoded_bytes: default_image_max_encoded_bytes(),
            target_encoded_bytes: default_image_target_encoded_bytes(),
            max_attempts: default_image_max_attempts(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,

    /// Root directory for stored invoice photos
    #[serde(default = "default_blob_root")]
    pub blob_root: String,

    #[serde(default)]
    pub vision: VisionConfig,

    #[serde(default)]
    pub image: ImageConfig,
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }
}

fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_blob_root() -> String {
    "data/photos".to_string()
}
fn default_vision_base_url() -> String {
    "http://localhost:4000/v1".to_string()
}
fn default_vision_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_vision_timeout_secs() -> u64 {
    60
}
fn default_vision_max_retries() -> u32 {
    3
}
fn default_vision_retry_backoff_ms() -> u64 {
    500
}
fn default_image_max_encoded_bytes() -> usize {
    // 5 MB hard ceiling on the base64-inflated payload
    5 * 1024 * 1024
}
fn default_image_target_encoded_bytes() -> usize {
    // 10% safety margin below the ceiling
    4_500_000
}
fn default_image_max_attempts() -> u32 {
    6
}

/// Load configuration from `config/{default,<env>}.toml` files plus `APP__*`
/// environment variables, the latter taking precedence.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://fieldstock.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    config.try_deserialize()
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("fieldstock_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
