//! ABOUTME: Non-blocking bounded hand-off queues for RawQ and AnnotatedQ.
//! ABOUTME: Producers drop on full; consumers use a short timed take.

use ag_core::Frame;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;

/// A frame plus the wall-clock time it was captured. Used both for the
/// Puller-to-Detector raw queue and the Detector-to-Pusher annotated queue;
/// the two are logically distinct per §3 but share this shape.
#[derive(Debug, Clone)]
pub struct FrameEnvelope {
    pub frame: Frame,
    pub capture_timestamp: SystemTime,
}

pub struct FrameQueue {
    tx: mpsc::Sender<FrameEnvelope>,
}

pub struct FrameQueueReceiver {
    rx: mpsc::Receiver<FrameEnvelope>,
}

/// Build a bounded queue of the given capacity. Returns the producer half
/// (non-blocking offer) and consumer half (timed take).
pub fn frame_queue(capacity: usize) -> (FrameQueue, FrameQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FrameQueue { tx }, FrameQueueReceiver { rx })
}

impl FrameQueue {
    /// Offer a frame without blocking. Returns `true` if accepted, `false`
    /// if the queue was full and the frame was dropped -- the explicit
    /// backpressure policy (§5): prefer dropping over propagating a block.
    pub fn try_offer(&self, envelope: FrameEnvelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => false,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl FrameQueueReceiver {
    /// Wait up to `timeout` for the next frame. `Ok(None)` means the
    /// timeout elapsed with nothing available; `Err(())` means the
    /// producer half was dropped and the queue will never yield again.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<FrameEnvelope>, ()> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(envelope)) => Ok(Some(envelope)),
            Ok(None) => Err(()),
            Err(_elapsed) => Ok(None),
        }
    }

    /// Drain and discard every buffered entry without blocking, releasing
    /// held frame buffers on worker exit (§4.4, §4.5).
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}
