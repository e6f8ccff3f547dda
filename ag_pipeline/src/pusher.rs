//! ABOUTME: Pusher worker: republishes annotated frames to a media server via ffmpeg.
//! ABOUTME: RTSP and RTMP destinations get distinct command templates; anything else is fatal.

use crate::context::PipelineContext;
use crate::control::Control;
use crate::queue::FrameQueueReceiver;
use ag_core::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{info, instrument};

const ANN_RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// A destination for raw BGR24 frame bytes, abstracted so the Pusher loop
/// can be tested without spawning a real ffmpeg process.
#[async_trait]
pub trait FrameSink: Send {
    /// Start the sink now that dimensions and fps are known.
    async fn open(&mut self, width: u32, height: u32, fps: f64) -> Result<()>;

    /// Write one frame's raw bytes. An error means the sink is dead.
    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()>;

    /// True if the sink is known to have died since `open` (e.g. the
    /// child process exited). Checked once per loop iteration.
    fn is_alive(&mut self) -> bool;

    /// Close the sink, waiting briefly for a graceful exit.
    async fn close(&mut self);
}

/// Build the ffmpeg argument list for republishing raw BGR24 frames to
/// `push_stream_url`. Returns `None` for an unsupported scheme, which is
/// fatal at Pusher startup.
fn build_ffmpeg_push_args(push_stream_url: &str, width: u32, height: u32, fps: f64) -> Option<Vec<String>> {
    let fps = if fps > 0.0 { fps } else { 25.0 };
    let size = format!("{width}x{height}");
    let fps_str = format!("{fps}");

    let mut args: Vec<String> = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-vcodec".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "bgr24".to_string(),
        "-s".to_string(),
        size,
        "-r".to_string(),
        fps_str,
        "-i".to_string(),
        "-".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "ultrafast".to_string(),
        "-tune".to_string(),
        "zerolatency".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ];

    if push_stream_url.starts_with("rtsp://") {
        args.push("-rtsp_transport".to_string());
        args.push("tcp".to_string());
        args.push("-f".to_string());
        args.push("rtsp".to_string());
        args.push(push_stream_url.to_string());
    } else if push_stream_url.starts_with("rtmp://") {
        args.push("-f".to_string());
        args.push("flv".to_string());
        args.push(push_stream_url.to_string());
    } else {
        return None;
    }

    Some(args)
}

pub struct FfmpegFrameSink {
    push_stream_url: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl FfmpegFrameSink {
    pub fn new(push_stream_url: impl Into<String>) -> Self {
        Self {
            push_stream_url: push_stream_url.into(),
            child: None,
            stdin: None,
        }
    }
}

#[async_trait]
impl FrameSink for FfmpegFrameSink {
    async fn open(&mut self, width: u32, height: u32, fps: f64) -> Result<()> {
        let args = build_ffmpeg_push_args(&self.push_stream_url, width, height, fps).ok_or_else(|| {
            Error::Validation(format!(
                "unsupported push stream scheme: {}",
                self.push_stream_url
            ))
        })?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Process(format!("failed to spawn push ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Process("push ffmpeg child exposed no stdin pipe".to_string()))?;

        self.child = Some(child);
        self.stdin = Some(stdin);
        Ok(())
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Process("write_frame called before open".to_string()))?;
        stdin
            .write_all(bytes)
            .await
            .map_err(|e| Error::Process(format!("push ffmpeg stdin closed: {e}")))
    }

    fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(Some(_))),
            None => false,
        }
    }

    async fn close(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

/// Spawn the production Pusher for `control`. No-op if push was not
/// requested; the Manager only spawns this when `control.push_enabled`.
#[instrument(skip_all, fields(code = %control.code))]
pub async fn run(control: Arc<Control>, ann_rx: FrameQueueReceiver, ctx: Arc<PipelineContext>) {
    let Some(push_url) = control.push_stream_url.clone() else {
        control.fault("pusher started with push enabled but no push_stream_url configured");
        return;
    };
    run_with_sink(control, ann_rx, ctx, FfmpegFrameSink::new(push_url)).await
}

pub async fn run_with_sink<S: FrameSink>(
    control: Arc<Control>,
    mut ann_rx: FrameQueueReceiver,
    ctx: Arc<PipelineContext>,
    mut sink: S,
) {
    let join_timeout = Duration::from_secs(ctx.config.pipeline.join_timeout);
    let waited = std::time::Instant::now();
    while control.width() == 0 {
        if control.is_stopping() {
            return;
        }
        if waited.elapsed() > join_timeout {
            control.fault("pusher: timed out waiting for dimensions from puller");
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    if let Err(e) = sink
        .open(control.width(), control.height(), control.input_fps())
        .await
    {
        control.fault(format!("pusher failed to start: {e}"));
        return;
    }
    info!("pusher opened push destination");

    loop {
        if control.is_stopping() {
            break;
        }

        if !sink.is_alive() {
            control.fault("pusher: push ffmpeg process exited");
            break;
        }

        let envelope = match ann_rx.recv_timeout(ANN_RECV_TIMEOUT).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(()) => {
                control.fault("pusher: annotated queue producer disappeared");
                break;
            }
        };

        if let Err(e) = sink.write_frame(envelope.frame.as_bytes()).await {
            control.fault(format!("pusher write failed: {e}"));
            break;
        }
    }

    sink.close().await;
    info!("pusher stopped");
}
