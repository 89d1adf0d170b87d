//! Seam between job orchestration and the transport.

use async_trait::async_trait;
use scanproto::{BroadcastSender, CancelToken, Frame, SendOutcome};

/// Anything that can carry a layer's frames to the scan card.
///
/// The job hands over one layer at a time and relies on the sink to poll
/// the cancel token between frames, so cancellation takes effect mid-layer
/// and not just at layer boundaries.
#[async_trait]
pub trait FrameSink: Send {
    /// Deliver `frames` in order, honoring `cancel`.
    async fn send_frames(&mut self, frames: &[Frame], cancel: &CancelToken) -> SendOutcome;
}

#[async_trait]
impl FrameSink for BroadcastSender {
    async fn send_frames(&mut self, frames: &[Frame], cancel: &CancelToken) -> SendOutcome {
        self.send(frames, cancel).await
    }
}
