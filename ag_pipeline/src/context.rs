//! ABOUTME: Shared dependencies every pipeline worker needs: config and the alarm store.

use ag_config::Config;
use ag_db::Db;
use std::sync::Arc;

/// Process-wide dependencies handed to every Manager/Puller/Detector/
/// Pusher/Clip-writer. Cheap to clone (everything behind an `Arc`); one
/// instance is built at startup and shared by the whole Registry.
pub struct PipelineContext {
    pub config: Arc<Config>,
    pub db: Arc<Db>,
}

impl PipelineContext {
    pub fn new(config: Arc<Config>, db: Arc<Db>) -> Self {
        Self { config, db }
    }
}
