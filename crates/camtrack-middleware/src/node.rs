//! Tracker node: the bus-facing wrapper around [`PoseSmoother`].
//!
//! [`TrackerNode`] plays the role of a subscriber callback: observations are
//! handled one at a time, each one is fed to the smoother, and every filtered
//! pose the smoother emits is published on [`Topic::FilteredPoses`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use camtrack_perception::PoseSmoother;
use camtrack_types::{Event, EventPayload, FilteredPose, Pose};

use crate::bus::{EventBus, Topic, TopicReceiver};

/// Event source tag for filtered poses.
pub const SOURCE: &str = "camtrack-middleware::tracker";

/// Owns one [`PoseSmoother`] and connects it to the [`EventBus`].
#[derive(Debug)]
pub struct TrackerNode {
    smoother: PoseSmoother,
    bus: Arc<EventBus>,
}

impl TrackerNode {
    pub fn new(smoother: PoseSmoother, bus: Arc<EventBus>) -> Self {
        Self { smoother, bus }
    }

    /// Feed `pose` to the smoother and publish the filtered pose, if any.
    ///
    /// A publish with no subscribers is not an error here; the filtered pose
    /// is still returned to the caller.
    pub fn handle(&mut self, pose: Pose) -> Option<FilteredPose> {
        let filtered = self.smoother.update(pose)?;
        let event = Event::new(SOURCE, EventPayload::Filtered(filtered.clone()));
        match self.bus.publish_to(Topic::FilteredPoses, event) {
            Ok(n) => debug!(receivers = n, "published filtered pose"),
            Err(e) => debug!(error = %e, "filtered pose not delivered"),
        }
        Some(filtered)
    }

    /// Process observations from `rx` until `shutdown` resolves or the bus
    /// closes, then hand the smoother back.
    ///
    /// Events already buffered in `rx` are handled before `shutdown` is
    /// looked at. Non-observation payloads are ignored.
    pub async fn run_until<F>(mut self, mut rx: TopicReceiver, shutdown: F) -> PoseSmoother
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(topic = ?rx.topic(), "tracker node running");
        loop {
            tokio::select! {
                biased;
                result = rx.recv() => match result {
                    Ok(Event { payload: EventPayload::Observation(pose), .. }) => {
                        self.handle(pose);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged_by = n, "tracker node lagged; observations dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
                () = &mut shutdown => break,
            }
        }
        info!("tracker node stopped");
        self.smoother
    }

    pub fn smoother(&self) -> &PoseSmoother {
        &self.smoother
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}
