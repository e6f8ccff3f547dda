//! ABOUTME: Manager: per-Control supervisor starting Puller/Detector/Pusher and
//! ABOUTME: tearing the trio down (and removing the Control from the registry) on any death.

use crate::behavior::build_plugin;
use crate::context::PipelineContext;
use crate::control::{Control, ControlStatus};
use crate::queue::frame_queue;
use crate::registry::Registry;
use crate::{detector, puller, pusher};
use ag_vision::{load_model, ModelKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

/// Supervise one Control's workers until it stops or faults, then remove
/// it from `registry` and wake anyone waiting on `done` (§4.2).
#[instrument(skip_all, fields(code = %control.code))]
pub async fn run(
    control: Arc<Control>,
    ctx: Arc<PipelineContext>,
    registry: Arc<Registry>,
    done: Arc<Notify>,
) {
    let model_path = ctx
        .config
        .pipeline
        .behavior_model_map
        .get(&control.behavior_code)
        .cloned()
        .unwrap_or_else(|| ctx.config.pipeline.default_model_path.clone());
    let class_list = ctx
        .config
        .pipeline
        .behavior_class_map
        .get(&control.behavior_code)
        .cloned()
        .unwrap_or_default();

    let plugin = match build_plugin(
        &control.behavior_code,
        &model_path,
        class_list.clone(),
        ctx.config.pipeline.clip_duration_seconds,
    ) {
        Ok(plugin) => plugin,
        Err(e) => {
            control.fault(format!("manager: failed to build behavior plug-in: {e}"));
            registry.remove(&control.code);
            done.notify_one();
            return;
        }
    };

    let model = load_model(ModelKey::new(model_path, class_list));

    let (raw_tx, raw_rx) = frame_queue(ctx.config.pipeline.raw_queue_cap);
    let (ann_tx, ann_rx) = frame_queue(ctx.config.pipeline.ann_queue_cap);

    let mut workers: JoinSet<()> = JoinSet::new();
    workers.spawn(puller::run(Arc::clone(&control), raw_tx, Arc::clone(&ctx)));
    workers.spawn(detector::run(
        Arc::clone(&control),
        raw_rx,
        ann_tx,
        plugin,
        model,
        Arc::clone(&ctx),
    ));
    if control.push_enabled {
        workers.spawn(pusher::run(Arc::clone(&control), ann_rx, Arc::clone(&ctx)));
    }

    let check_interval = Duration::from_secs_f64(ctx.config.pipeline.manager_check_interval.max(0.01));
    let mut ticker = tokio::time::interval(check_interval);
    let mut became_running = false;

    loop {
        tokio::select! {
            _ = control.stop.cancelled() => {
                info!("manager observed stop signal");
                break;
            }
            _ = control.error_signal.cancelled() => {
                warn!("manager observed error signal");
                break;
            }
            joined = workers.join_next() => {
                if joined.is_some() && !control.is_stopping() {
                    control.fault("a pipeline worker exited unexpectedly");
                }
                break;
            }
            _ = ticker.tick() => {
                if !became_running && control.status() == ControlStatus::Starting && control.width() > 0 {
                    control.set_status(ControlStatus::Running);
                    became_running = true;
                }
            }
        }
    }

    if control.status() != ControlStatus::Error {
        control.set_status(ControlStatus::Stopping);
    }
    control.stop.cancel();

    let join_timeout = Duration::from_secs(ctx.config.pipeline.join_timeout);
    let _ = tokio::time::timeout(join_timeout, async {
        while workers.join_next().await.is_some() {}
    })
    .await;
    workers.shutdown().await;

    if control.status() != ControlStatus::Error {
        control.set_status(ControlStatus::Stopped);
    }

    registry.remove(&control.code);
    done.notify_one();
    info!("manager finished, control removed from registry");
}
