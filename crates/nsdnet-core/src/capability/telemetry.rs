use nsdnet_api::{FrameBody, Pose2d};
use tokio::sync::watch;
use tracing::trace;

use super::{HandleFrame, Handled};

/// Caches the latest pose, overwritten wholesale on every update.
#[derive(Debug)]
pub struct TelemetryCell {
    pose: watch::Sender<Option<Pose2d>>,
}

impl TelemetryCell {
    pub(crate) fn new() -> (Self, watch::Receiver<Option<Pose2d>>) {
        let (pose, rx) = watch::channel(None);
        (Self { pose }, rx)
    }
}

impl HandleFrame for TelemetryCell {
    fn handle_frame(&self, body: FrameBody) -> Handled {
        match body {
            FrameBody::Telemetry(pose) => {
                trace!(x = pose.x, y = pose.y, yaw = pose.yaw, "pose updated");
                self.pose.send_replace(Some(pose));
                Handled::Applied
            }
            other => Handled::Declined(other),
        }
    }
}
