//! ABOUTME: Detector worker: inference, behavior dispatch, rolling buffer, clip trigger.
//! ABOUTME: Consumes RawQ, produces AnnotatedQ, spawns the Clip-writer on event.

use crate::behavior::{AlarmData, BehaviorPlugin, BehaviorState};
use crate::clip_writer;
use crate::context::PipelineContext;
use crate::control::Control;
use crate::queue::{FrameEnvelope, FrameQueue, FrameQueueReceiver};
use crate::rolling_buffer::RollingBuffer;
use ag_vision::DetectionModel;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

const RAW_RECV_TIMEOUT: Duration = Duration::from_millis(200);

#[instrument(skip_all, fields(code = %control.code))]
pub async fn run(
    control: Arc<Control>,
    mut raw_rx: FrameQueueReceiver,
    ann_tx: FrameQueue,
    plugin: Box<dyn BehaviorPlugin>,
    model: Arc<dyn DetectionModel>,
    ctx: Arc<PipelineContext>,
) {
    let join_timeout = Duration::from_secs(ctx.config.pipeline.join_timeout);
    let waited = Instant::now();
    while control.input_fps() <= 0.0 {
        if control.is_stopping() {
            return;
        }
        if waited.elapsed() > join_timeout {
            control.fault("detector: timed out waiting for input fps from puller");
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut rolling_buffer = RollingBuffer::sized_for(
        control.input_fps(),
        ctx.config.pipeline.clip_duration_seconds,
    );

    let mut state = BehaviorState::default();
    plugin.on_start(&mut state);

    let fps_update_interval = Duration::from_secs_f64(ctx.config.pipeline.fps_update_interval.max(0.01));
    let mut window_start = Instant::now();
    let mut frames_in_window: u64 = 0;

    loop {
        if control.is_stopping() {
            break;
        }

        let envelope = match raw_rx.recv_timeout(RAW_RECV_TIMEOUT).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(()) => {
                control.fault("detector: raw queue producer disappeared");
                break;
            }
        };

        let (annotated, detections) = match model.infer(&envelope.frame) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "model inference failed, passing frame through with no detections");
                (envelope.frame.clone(), Vec::new())
            }
        };

        let (annotated, event_triggered) = plugin.process_frame(&annotated, &detections, &mut state);

        if event_triggered {
            maybe_spawn_clip_writer(&control, &ctx, plugin.as_ref(), &state, &rolling_buffer);
        }

        rolling_buffer.push(annotated.to_owned_copy());

        ann_tx.try_offer(FrameEnvelope {
            frame: annotated,
            capture_timestamp: envelope.capture_timestamp,
        });

        frames_in_window += 1;
        let elapsed = window_start.elapsed();
        if elapsed >= fps_update_interval {
            let fps = frames_in_window as f64 / elapsed.as_secs_f64();
            control.set_observed_fps(fps);
            frames_in_window = 0;
            window_start = Instant::now();
        }
    }

    plugin.on_stop(&mut state);
    info!("detector stopped");
}

fn maybe_spawn_clip_writer(
    control: &Arc<Control>,
    ctx: &Arc<PipelineContext>,
    plugin: &dyn BehaviorPlugin,
    state: &BehaviorState,
    rolling_buffer: &RollingBuffer,
) {
    if control.clip_in_progress.swap(true, Ordering::AcqRel) {
        return;
    }
    control.clip_writer_active.store(true, Ordering::Release);

    let frames = rolling_buffer.snapshot();
    let width = control.width();
    let height = control.height();
    let fps = control.input_fps().max(1.0);
    let alarm_data: AlarmData = plugin.get_alarm_data(state);
    let behavior_code = control.behavior_code.clone();

    let control = Arc::clone(control);
    let ctx = Arc::clone(ctx);
    tokio::spawn(async move {
        clip_writer::run(control, ctx, frames, fps, width, height, behavior_code, alarm_data).await;
    });
}
