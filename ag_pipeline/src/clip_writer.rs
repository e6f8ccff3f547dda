//! ABOUTME: Clip-writer: transcodes a captured frame burst to MP4 and records the alarm.
//! ABOUTME: Spawned once per triggered event; always clears the Control's handshake flags on exit.

use crate::behavior::AlarmData;
use crate::context::PipelineContext;
use crate::control::Control;
use ag_core::{path::normalize_slashes, time::now_for_alarm_id, Frame};
use ag_db::{AlarmRepository, CreateAlarmRequest};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// Write `frames` to an MP4 under `ctx.config.pipeline.video_root` and
/// persist an alarm record on success. Always clears
/// `control.clip_in_progress`/`clip_writer_active` on every exit path,
/// including every early return below.
///
/// Frames are piped directly into a single ffmpeg process as raw BGR24
/// (the same stdin-pipe shape the Pusher uses) rather than written to an
/// intermediate container first: there is no pure-Rust video-container
/// writer in this dependency stack, and ffmpeg already accepts a raw
/// rawvideo stream directly, so the intermediate file the original
/// buffered-video helper wrote is unnecessary here.
#[instrument(skip_all, fields(code = %control.code, behavior_code = %behavior_code))]
pub async fn run(
    control: Arc<Control>,
    ctx: Arc<PipelineContext>,
    frames: Vec<Frame>,
    fps: f64,
    width: u32,
    height: u32,
    behavior_code: String,
    alarm_data: AlarmData,
) {
    if let Err(e) = write_clip(&ctx, &control, &frames, fps, width, height, &behavior_code, &alarm_data).await {
        warn!(error = %e, "clip writer failed, no alarm recorded");
    }

    control.clip_in_progress.store(false, Ordering::Release);
    control.clip_writer_active.store(false, Ordering::Release);
}

async fn write_clip(
    ctx: &Arc<PipelineContext>,
    control: &Arc<Control>,
    frames: &[Frame],
    fps: f64,
    width: u32,
    height: u32,
    behavior_code: &str,
    alarm_data: &AlarmData,
) -> ag_core::Result<()> {
    if frames.is_empty() {
        return Err(ag_core::Error::Validation(
            "clip writer invoked with an empty frame buffer".to_string(),
        ));
    }

    let alarm_id = format!("{}_{}", control.code, now_for_alarm_id());
    let video_root = Path::new(&ctx.config.pipeline.video_root);
    let clip_dir = video_root.join("alarm_videos");
    tokio::fs::create_dir_all(&clip_dir)
        .await
        .map_err(|e| ag_core::Error::Storage(format!("failed to create clip directory: {e}")))?;

    let relative_path = normalize_slashes(&format!("alarm_videos/{alarm_id}_annotated.mp4"));
    let absolute_path = clip_dir.join(format!("{alarm_id}_annotated.mp4"));

    let args = [
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "bgr24".to_string(),
        "-s".to_string(),
        format!("{width}x{height}"),
        "-r".to_string(),
        format!("{}", fps.max(1.0)),
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "23".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-y".to_string(),
        absolute_path.to_string_lossy().to_string(),
    ];

    let mut cmd = Command::new("ffmpeg");
    cmd.args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| ag_core::Error::Process(format!("failed to spawn clip ffmpeg: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ag_core::Error::Process("clip ffmpeg exposed no stdin pipe".to_string()))?;

    let write_result: ag_core::Result<()> = async {
        for frame in frames {
            stdin
                .write_all(frame.as_bytes())
                .await
                .map_err(|e| ag_core::Error::Process(format!("clip ffmpeg stdin write failed: {e}")))?;
        }
        Ok(())
    }
    .await;

    drop(stdin);

    if let Err(e) = write_result {
        let _ = child.start_kill();
        let _ = child.wait().await;
        return Err(e);
    }

    let timeout = Duration::from_secs(ctx.config.pipeline.ffmpeg_timeout);
    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => return Err(ag_core::Error::Process(format!("clip ffmpeg wait failed: {e}"))),
        Err(_elapsed) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(ag_core::Error::Timeout(format!(
                "clip ffmpeg did not finish within {}s",
                timeout.as_secs()
            )));
        }
    };

    if !status.success() {
        return Err(ag_core::Error::Process(format!(
            "clip ffmpeg exited with status {status}"
        )));
    }

    let repo = AlarmRepository::new(ctx.db.pool());
    repo.insert(CreateAlarmRequest {
        alarm_id: alarm_id.clone(),
        video_path: relative_path,
        video_absolute_path: Some(normalize_slashes(&absolute_path.to_string_lossy())),
        image_path: alarm_data.image_path.clone(),
        desc: alarm_data.desc.clone(),
    })
    .await?;

    info!(alarm_id = %alarm_id, behavior_code = %behavior_code, "clip written and alarm recorded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_config::Config;
    use ag_db::Db;

    async fn test_ctx(video_root: &str) -> Arc<PipelineContext> {
        let db = Db::new(&format!("test_clip_writer_{}.db", ag_core::Id::new()))
            .await
            .unwrap();
        let mut config = Config::default();
        config.pipeline.video_root = video_root.to_string();
        config.pipeline.ffmpeg_timeout = 2;
        Arc::new(PipelineContext {
            config: Arc::new(config),
            db: Arc::new(db),
        })
    }

    #[tokio::test]
    async fn empty_frame_buffer_is_rejected_without_touching_disk() {
        let dir = std::env::temp_dir().join(format!("ag_clip_test_{}", ag_core::Id::new()));
        let ctx = test_ctx(dir.to_str().unwrap()).await;
        let control = Arc::new(Control::new("c1", "ZHOUJIERUQIN", "rtsp://x", false, None));
        let err = write_clip(&ctx, &control, &[], 25.0, 4, 4, "ZHOUJIERUQIN", &AlarmData::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ag_core::Error::Validation(_)));
    }

    #[tokio::test]
    async fn alarm_id_and_video_path_are_built_from_the_control_code() {
        let dir = std::env::temp_dir().join(format!("ag_clip_test_{}", ag_core::Id::new()));
        let ctx = test_ctx(dir.to_str().unwrap()).await;
        let control = Arc::new(Control::new("cam1", "ZHOUJIERUQIN", "rtsp://x", false, None));
        let frame = Frame::packed(vec![0u8; 4 * 4 * 3], 4, 4).unwrap();

        let result = write_clip(
            &ctx,
            &control,
            std::slice::from_ref(&frame),
            25.0,
            4,
            4,
            "ZHOUJIERUQIN",
            &AlarmData::default(),
        )
        .await;

        // ffmpeg isn't guaranteed to be on the test host; only assert the
        // naming scheme, which is decided before ffmpeg is ever spawned.
        if let Err(ag_core::Error::Process(_)) = &result {
            return;
        }

        let alarms = AlarmRepository::new(ctx.db.pool())
            .list(10, 0)
            .await
            .unwrap();
        let alarm = alarms
            .into_iter()
            .next()
            .expect("clip writer should have recorded an alarm");
        assert!(
            alarm.alarm_id.starts_with("cam1_"),
            "alarm id must be keyed on the control code, not the behavior code: {}",
            alarm.alarm_id
        );
        assert!(
            alarm.video_path.starts_with("alarm_videos/cam1_")
                && alarm.video_path.ends_with("_annotated.mp4"),
            "video path must live under alarm_videos/ with an _annotated suffix: {}",
            alarm.video_path
        );
    }

    #[tokio::test]
    async fn run_always_clears_control_flags_even_on_failure() {
        let dir = std::env::temp_dir().join(format!("ag_clip_test_{}", ag_core::Id::new()));
        let ctx = test_ctx(dir.to_str().unwrap()).await;
        let control = Arc::new(Control::new("c1", "ZHOUJIERUQIN", "rtsp://x", false, None));
        control.clip_in_progress.store(true, Ordering::Release);
        control.clip_writer_active.store(true, Ordering::Release);

        // No frames -> write_clip fails fast, but the handshake flags must
        // still clear so the Detector can trigger again.
        run(
            Arc::clone(&control),
            ctx,
            vec![],
            25.0,
            4,
            4,
            "ZHOUJIERUQIN".to_string(),
            AlarmData::default(),
        )
        .await;

        assert!(!control.clip_in_progress.load(Ordering::Acquire));
        assert!(!control.clip_writer_active.load(Ordering::Acquire));
    }
}
