//! ABOUTME: Puller worker: opens the input stream, republishes resolved
//! ABOUTME: dimensions/fps on the Control, and feeds RawQ with decoded frames.

use crate::context::PipelineContext;
use crate::control::Control;
use crate::queue::{FrameEnvelope, FrameQueue};
use ag_core::{Error, Frame, Result};
use ag_proc::{run, CommandSpec};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{info, instrument, warn};

const DEFAULT_INPUT_FPS: f64 = 25.0;

/// A source of decoded BGR24 frames, abstracted so the reconnect/backoff
/// loop can be exercised in tests without a real ffmpeg/ffprobe binary.
#[async_trait]
pub trait FrameSource: Send {
    /// Open the stream and resolve its dimensions and frame rate.
    async fn open(&mut self) -> Result<(u32, u32, f64)>;

    /// Read the next decoded frame. Any error is treated as a dropped
    /// connection: the caller closes and retries from `open`.
    async fn read_frame(&mut self) -> Result<Frame>;

    /// Release any resources held by an open connection.
    async fn close(&mut self);
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

fn parse_frame_rate(raw: &str) -> f64 {
    let mut parts = raw.split('/');
    let num: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let den: f64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1.0);
    if den <= 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Production [`FrameSource`]: an `ffprobe` one-shot to resolve dimensions
/// and fps, followed by a persistent `ffmpeg` child decoding raw BGR24
/// frames to stdout.
pub struct FfmpegFrameSource {
    input_url: String,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl FfmpegFrameSource {
    pub fn new(input_url: impl Into<String>) -> Self {
        Self {
            input_url: input_url.into(),
            width: 0,
            height: 0,
            child: None,
            stdout: None,
        }
    }

    async fn probe(&self) -> Result<(u32, u32, f64)> {
        let spec = CommandSpec::new("ffprobe".into())
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate",
                "-of",
                "json",
                self.input_url.as_str(),
            ])
            .timeout(Duration::from_secs(15));

        let result = run(spec).await?;
        if !result.success() {
            return Err(Error::External(format!(
                "ffprobe failed for {}: {}",
                self.input_url, result.stderr
            )));
        }

        let parsed: ProbeOutput = serde_json::from_str(&result.stdout)
            .map_err(|e| Error::External(format!("ffprobe output not parseable: {e}")))?;
        let stream = parsed
            .streams
            .first()
            .ok_or_else(|| Error::External(format!("no video stream found in {}", self.input_url)))?;

        let width = stream
            .width
            .ok_or_else(|| Error::External("ffprobe reported no width".to_string()))?;
        let height = stream
            .height
            .ok_or_else(|| Error::External("ffprobe reported no height".to_string()))?;
        let fps = stream
            .r_frame_rate
            .as_deref()
            .map(parse_frame_rate)
            .unwrap_or(0.0);

        Ok((width, height, fps))
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn open(&mut self) -> Result<(u32, u32, f64)> {
        let (width, height, fps) = self.probe().await?;
        self.width = width;
        self.height = height;

        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-rtsp_transport",
            "tcp",
            "-i",
            &self.input_url,
            "-an",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "bgr24",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Process(format!("failed to spawn ffmpeg for {}: {e}", self.input_url)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Process("ffmpeg child exposed no stdout pipe".to_string()))?;

        self.child = Some(child);
        self.stdout = Some(stdout);

        let fps = if fps > 0.0 { fps } else { DEFAULT_INPUT_FPS };
        Ok((width, height, fps))
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| Error::Process("read_frame called before open".to_string()))?;

        let expected = Frame::expected_byte_len(self.width, self.height);
        let mut buf = vec![0u8; expected];
        stdout
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::Process(format!("ffmpeg stdout closed: {e}")))?;

        Frame::packed(buf, self.width, self.height)
    }

    async fn close(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

/// Spawn the production Puller for `control`, using ffprobe/ffmpeg.
#[instrument(skip_all, fields(code = %control.code))]
pub async fn run(control: Arc<Control>, raw_tx: FrameQueue, ctx: Arc<PipelineContext>) {
    let url = control.input_stream_url.clone();
    run_with_source(control, raw_tx, ctx, FfmpegFrameSource::new(url)).await
}

/// The reconnect/backoff/publish loop, generic over any [`FrameSource`] so
/// it can be driven by a fake source in tests.
pub async fn run_with_source<S: FrameSource>(
    control: Arc<Control>,
    raw_tx: FrameQueue,
    ctx: Arc<PipelineContext>,
    mut source: S,
) {
    let reconnect_delay = Duration::from_secs(ctx.config.pipeline.reconnect_delay);

    'reconnect: loop {
        if control.is_stopping() {
            break;
        }

        let (width, height, fps) = match source.open().await {
            Ok(dims) => dims,
            Err(e) => {
                warn!(error = %e, "puller failed to open input, retrying");
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };

        control.publish_stream_properties(width, height, fps);
        info!(width, height, fps, "puller opened input stream");

        loop {
            if control.is_stopping() {
                source.close().await;
                break 'reconnect;
            }

            match source.read_frame().await {
                Ok(frame) => {
                    raw_tx.try_offer(FrameEnvelope {
                        frame,
                        capture_timestamp: SystemTime::now(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "puller lost input stream, reconnecting");
                    source.close().await;
                    tokio::time::sleep(reconnect_delay).await;
                    continue 'reconnect;
                }
            }
        }
    }

    info!("puller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ag_config::Config;
    use ag_db::Db;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    async fn test_ctx() -> Arc<PipelineContext> {
        let db = Db::new(&format!("test_puller_{}.db", ag_core::Id::new()))
            .await
            .unwrap();
        Arc::new(PipelineContext {
            config: Arc::new(Config::default()),
            db: Arc::new(db),
        })
    }

    struct FakeFrameSource {
        dims: (u32, u32, f64),
        frames: Mutex<VecDeque<Result<Frame>>>,
        open_failures_remaining: u32,
    }

    impl FakeFrameSource {
        fn new(dims: (u32, u32, f64), frames: Vec<Result<Frame>>) -> Self {
            Self {
                dims,
                frames: Mutex::new(frames.into()),
                open_failures_remaining: 0,
            }
        }

        fn with_open_failures(mut self, n: u32) -> Self {
            self.open_failures_remaining = n;
            self
        }
    }

    #[async_trait]
    impl FrameSource for FakeFrameSource {
        async fn open(&mut self) -> Result<(u32, u32, f64)> {
            if self.open_failures_remaining > 0 {
                self.open_failures_remaining -= 1;
                return Err(Error::External("fake open failure".to_string()));
            }
            Ok(self.dims)
        }

        async fn read_frame(&mut self) -> Result<Frame> {
            let mut frames = self.frames.lock().unwrap();
            match frames.pop_front() {
                Some(result) => result,
                None => Err(Error::External("fake source exhausted".to_string())),
            }
        }

        async fn close(&mut self) {}
    }

    fn frame() -> Frame {
        Frame::packed(vec![0u8; 4 * 4 * 3], 4, 4).unwrap()
    }

    #[test]
    fn parse_frame_rate_handles_fraction_and_whole() {
        assert_eq!(parse_frame_rate("30/1"), 30.0);
        assert_eq!(parse_frame_rate("25000/1001"), 25000.0 / 1001.0);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
    }

    #[tokio::test]
    async fn publishes_dimensions_and_forwards_frames() {
        let control = Arc::new(Control::new("c1", "RENSHUTONGJI", "rtsp://x", false, None));
        let (raw_tx, mut raw_rx) = crate::queue::frame_queue(4);
        let source = FakeFrameSource::new((4, 4, 10.0), vec![Ok(frame()), Ok(frame())]);
        let ctx = test_ctx().await;

        let control_clone = Arc::clone(&control);
        let handle = tokio::spawn(run_with_source(control_clone, raw_tx, ctx, source));

        let first = raw_rx
            .recv_timeout(Duration::from_millis(500))
            .await
            .unwrap();
        assert!(first.is_some());
        assert_eq!(control.width(), 4);
        assert_eq!(control.input_fps(), 10.0);

        control.stop.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn stop_signal_breaks_out_of_reconnect_retry() {
        let control = Arc::new(Control::new("c1", "RENSHUTONGJI", "rtsp://x", false, None));
        control.stop.cancel();
        let (raw_tx, _raw_rx) = crate::queue::frame_queue(4);
        let source = FakeFrameSource::new((4, 4, 10.0), vec![]).with_open_failures(1000);
        let ctx = test_ctx().await;

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            run_with_source(control, raw_tx, ctx, source),
        )
        .await;
        assert!(result.is_ok(), "puller must exit immediately when already stopped");
    }
}
