use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Deal rooms seeded into the in-memory repository at startup.
    /// A deployment backed by a real marketplace repository leaves this empty.
    #[serde(default)]
    pub rooms: Vec<RoomSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener
    #[serde(default = "default_host")]
    pub host: String,
    /// Listener port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capacity of each per-room broadcast channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Capacity of the scheduler command queue
    #[serde(default = "default_scheduler_queue")]
    pub scheduler_queue: usize,
    /// Capacity of the downstream workflow (order.created) queue
    #[serde(default = "default_workflow_queue")]
    pub workflow_queue: usize,
}

fn default_event_buffer() -> usize {
    1024
}

fn default_scheduler_queue() -> usize {
    256
}

fn default_workflow_queue() -> usize {
    512
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            scheduler_queue: default_scheduler_queue(),
            workflow_queue: default_workflow_queue(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// A deal room made available to the dev server
#[derive(Debug, Clone, Deserialize)]
pub struct RoomSeed {
    pub id: String,
    pub listing_id: String,
    pub seller_id: String,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("GAVEL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (GAVEL__SERVER__PORT, etc.)
            .add_source(
                Environment::with_prefix("GAVEL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.is_empty() {
            errors.push("server.host must not be empty".to_string());
        }

        if self.engine.event_buffer == 0 {
            errors.push("engine.event_buffer must be positive".to_string());
        }

        if self.engine.scheduler_queue == 0 {
            errors.push("engine.scheduler_queue must be positive".to_string());
        }

        if self.engine.workflow_queue == 0 {
            errors.push("engine.workflow_queue must be positive".to_string());
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => errors.push(format!("logging.level '{other}' is not a valid level")),
        }

        let mut seen_rooms = std::collections::HashSet::new();
        for room in &self.rooms {
            if room.id.is_empty() || room.seller_id.is_empty() {
                errors.push("seeded rooms require non-empty id and seller_id".to_string());
            }
            if !seen_rooms.insert(room.id.as_str()) {
                errors.push(format!("duplicate seeded room id: {}", room.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
