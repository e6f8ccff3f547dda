//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Handles all application settings from environment variables and files

use ag_core::{Error, Result};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub pipeline: PipelineConfig,
}

/// HTTP control-API server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or `"argus=debug,tower_http=warn"`.
    #[validate(length(min = 1))]
    pub log_level: String,
    /// Rate limiting configuration
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,
    /// Body size limits configuration
    #[validate(nested)]
    pub body_limits: BodyLimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            rate_limit: RateLimitConfig::default(),
            body_limits: BodyLimitsConfig::default(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RateLimitConfig {
    /// Maximum requests per minute (IP-based only)
    #[validate(range(min = 1, max = 10000))]
    pub requests_per_minute: u32,
    /// Rate limiting window duration in seconds
    #[validate(range(min = 1, max = 3600))]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
            window_seconds: 60,
        }
    }
}

/// Body size limits configuration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BodyLimitsConfig {
    /// Global JSON body size limit in bytes
    #[validate(range(min = 1024, max = 104857600))] // 1KB to 100MB
    pub global_json_limit: usize,
}

impl Default for BodyLimitsConfig {
    fn default() -> Self {
        Self {
            global_json_limit: 1_048_576, // 1MB
        }
    }
}

/// Pipeline configuration — every key named in the specification's
/// "Configuration keys" list (§6), plus the alarm database path.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pre-event clip duration, in seconds.
    #[validate(range(min = 1, max = 600))]
    pub clip_duration_seconds: u64,
    /// Timeout for the Clip-writer's FFmpeg transcode step, in seconds.
    #[validate(range(min = 1, max = 3600))]
    pub ffmpeg_timeout: u64,
    /// RawQ bounded capacity.
    #[validate(range(min = 1, max = 10_000))]
    pub raw_queue_cap: usize,
    /// AnnotatedQ bounded capacity.
    #[validate(range(min = 1, max = 10_000))]
    pub ann_queue_cap: usize,
    /// Per-worker join timeout on graceful shutdown, in seconds.
    #[validate(range(min = 1, max = 300))]
    pub join_timeout: u64,
    /// Delay between Puller stream reconnect attempts, in seconds.
    #[validate(range(min = 1, max = 300))]
    pub reconnect_delay: u64,
    /// Manager liveness-check interval, in seconds (may be fractional).
    #[validate(range(min = 0.01, max = 60.0))]
    pub manager_check_interval: f64,
    /// Detector observed-FPS sampling window, in seconds.
    #[validate(range(min = 0.1, max = 60.0))]
    pub fps_update_interval: f64,
    /// Behavior code -> model path/identifier.
    pub behavior_model_map: HashMap<String, String>,
    /// Behavior code -> open-vocabulary class filter list.
    pub behavior_class_map: HashMap<String, Vec<String>>,
    /// Model path used when a behavior has no explicit mapping.
    pub default_model_path: String,
    /// Root directory under which alarm clips (and their intermediates)
    /// are written. `video_path`/`image_path` in alarm records are stored
    /// relative to this root.
    pub video_root: String,
    /// Path to the SQLite database file backing the alarm store.
    pub alarm_db_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut behavior_model_map = HashMap::new();
        behavior_model_map.insert("ZHOUJIERUQIN".to_string(), "yolov8n.pt".to_string());
        behavior_model_map.insert("RENSHUTONGJI".to_string(), "yolov8s-worldv2.pt".to_string());
        behavior_model_map.insert("INSULATOR".to_string(), "insulator.pt".to_string());

        let mut behavior_class_map = HashMap::new();
        behavior_class_map.insert("RENSHUTONGJI".to_string(), vec!["person".to_string()]);

        Self {
            clip_duration_seconds: 3,
            ffmpeg_timeout: 60,
            raw_queue_cap: 60,
            ann_queue_cap: 60,
            join_timeout: 10,
            reconnect_delay: 5,
            manager_check_interval: 0.5,
            fps_update_interval: 1.0,
            behavior_model_map,
            behavior_class_map,
            default_model_path: "yolov8n.pt".to_string(),
            video_root: "./data/video".to_string(),
            alarm_db_path: "argus.db".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional `.env` file, and
    /// `ARGUS_`-prefixed environment variables (highest priority).
    pub fn load() -> Result<Self> {
        let defaults = Config::default();
        let mut builder = ConfigBuilder::builder();

        builder = builder
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port as i64)?
            .set_default("server.log_level", defaults.server.log_level)?
            .set_default(
                "server.rate_limit.requests_per_minute",
                defaults.server.rate_limit.requests_per_minute as i64,
            )?
            .set_default(
                "server.rate_limit.window_seconds",
                defaults.server.rate_limit.window_seconds as i64,
            )?
            .set_default(
                "server.body_limits.global_json_limit",
                defaults.server.body_limits.global_json_limit as i64,
            )?
            .set_default(
                "pipeline.clip_duration_seconds",
                defaults.pipeline.clip_duration_seconds as i64,
            )?
            .set_default("pipeline.ffmpeg_timeout", defaults.pipeline.ffmpeg_timeout as i64)?
            .set_default("pipeline.raw_queue_cap", defaults.pipeline.raw_queue_cap as i64)?
            .set_default("pipeline.ann_queue_cap", defaults.pipeline.ann_queue_cap as i64)?
            .set_default("pipeline.join_timeout", defaults.pipeline.join_timeout as i64)?
            .set_default("pipeline.reconnect_delay", defaults.pipeline.reconnect_delay as i64)?
            .set_default(
                "pipeline.manager_check_interval",
                defaults.pipeline.manager_check_interval,
            )?
            .set_default("pipeline.fps_update_interval", defaults.pipeline.fps_update_interval)?
            .set_default("pipeline.default_model_path", defaults.pipeline.default_model_path)?
            .set_default("pipeline.video_root", defaults.pipeline.video_root)?
            .set_default("pipeline.alarm_db_path", defaults.pipeline.alarm_db_path)?
            .set_default(
                "pipeline.behavior_model_map",
                defaults
                    .pipeline
                    .behavior_model_map
                    .into_iter()
                    .collect::<Vec<_>>(),
            )?
            .set_default(
                "pipeline.behavior_class_map",
                defaults
                    .pipeline
                    .behavior_class_map
                    .into_iter()
                    .map(|(k, v)| (k, v))
                    .collect::<Vec<_>>(),
            )?;

        if std::path::Path::new(".env").exists() {
            builder = builder.add_source(File::with_name(".env").required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("ARGUS")
                .try_parsing(true)
                .separator("_"),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed
            .validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Use a mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();

        env::remove_var("ARGUS_SERVER_HOST");
        env::remove_var("ARGUS_SERVER_PORT");
        env::remove_var("ARGUS_PIPELINE_VIDEO_ROOT");

        let config = Config::load().expect("Should load with defaults");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.raw_queue_cap, 60);
        assert_eq!(config.pipeline.ann_queue_cap, 60);
        assert_eq!(config.pipeline.clip_duration_seconds, 3);
        assert_eq!(
            config.pipeline.behavior_model_map.get("ZHOUJIERUQIN").map(String::as_str),
            Some("yolov8n.pt")
        );
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();

        env::remove_var("ARGUS_SERVER_HOST");
        env::remove_var("ARGUS_SERVER_PORT");

        env::set_var("ARGUS_SERVER_HOST", "0.0.0.0");
        env::set_var("ARGUS_SERVER_PORT", "9000");

        let config = Config::load().expect("Should load from env");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);

        env::remove_var("ARGUS_SERVER_HOST");
        env::remove_var("ARGUS_SERVER_PORT");
    }

    #[test]
    fn test_config_validation_failure() {
        let _lock = ENV_MUTEX.lock().unwrap();

        env::set_var("ARGUS_PIPELINE_RAW_QUEUE_CAP", "0"); // invalid, must be >= 1

        let result = Config::load();
        assert!(result.is_err());

        env::remove_var("ARGUS_PIPELINE_RAW_QUEUE_CAP");
    }
}
