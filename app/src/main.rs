use ag_config::Config;
use ag_core::telemetry;
use ag_db::Db;
use ag_obs::ObsState;
use ag_pipeline::{PipelineContext, Registry};
use ag_web::AppState;
use std::{process, sync::Arc};

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            process::exit(1);
        }
    };

    telemetry::init_tracing(&config.server.log_level, "argus");
    tracing::debug!(?config, "configuration loaded");

    let db = match Db::new(&config.pipeline.alarm_db_path).await {
        Ok(db) => {
            tracing::info!(path = %config.pipeline.alarm_db_path, "alarm database initialized");
            db
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize alarm database");
            process::exit(1);
        }
    };

    if let Err(e) = db.health_check().await {
        tracing::error!(error = %e, "alarm database health check failed");
        process::exit(1);
    }

    if let Err(e) = std::fs::create_dir_all(&config.pipeline.video_root) {
        tracing::error!(
            path = %config.pipeline.video_root,
            error = %e,
            "failed to create video root directory"
        );
        process::exit(1);
    }

    if let Err(e) = run(config, db).await {
        tracing::error!(error = %e, "argus exited with an error");
        process::exit(1);
    }
}

async fn run(config: Config, db: Db) -> ag_core::Result<()> {
    let config = Arc::new(config);
    let ctx = Arc::new(PipelineContext::new(Arc::clone(&config), Arc::new(db)));
    let registry = Registry::new(ctx);

    let web_state = AppState {
        registry,
        config: Arc::clone(&config),
        rate_limit_config: ag_web::middleware::ratelimit::RateLimitConfig {
            ip_requests_per_minute: config.server.rate_limit.requests_per_minute,
            window_duration: std::time::Duration::from_secs(config.server.rate_limit.window_seconds),
        },
        body_limits_config: ag_web::middleware::bodylimits::BodyLimitsConfig::new(
            config.server.body_limits.global_json_limit,
        ),
    };

    let obs_state = ObsState::new();
    let obs_bind_addr = "0.0.0.0:9090".to_string();
    let web_bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %obs_bind_addr, "starting observability server");
    tracing::info!(addr = %web_bind_addr, "starting control API server");

    tokio::select! {
        result = ag_obs::start_server(&obs_bind_addr, obs_state) => {
            tracing::error!("observability server exited");
            result
        }
        result = ag_web::start_server(&web_bind_addr, web_state) => {
            tracing::error!("control API server exited");
            result
        }
    }
}
