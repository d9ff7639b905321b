//! Windowed pose smoother.
//!
//! [`PoseSmoother`] keeps a bounded window of recent observations and, for
//! every new observation, emits the mean pose of the window as it stood
//! *before* that observation arrived. The triggering sample only influences
//! later outputs, so the output lags the input by one sample.
//!
//! # Example
//!
//! ```rust
//! use camtrack_perception::smoother::{PoseSmoother, SmootherConfig};
//! use camtrack_types::Pose;
//!
//! let initial = Pose::planar(0.0, 0.0, 0.0, "/camera");
//! let config = SmootherConfig::new(3, "/turtlebot_image_frame", initial);
//! let mut smoother = PoseSmoother::new(config).unwrap();
//!
//! assert!(smoother.update(Pose::planar(0.0, 0.0, 0.0, "/camera")).is_none());
//! assert!(smoother.update(Pose::planar(2.0, 0.0, 0.0, "/camera")).is_none());
//!
//! let filtered = smoother.update(Pose::planar(4.0, 0.0, 0.0, "/camera")).unwrap();
//! assert!((filtered.pose.position.x - 1.0).abs() < 1e-9);
//! ```

use chrono::Utc;
use tracing::{debug, info, warn};

use camtrack_types::{FilteredPose, Pose, Position, TrackError};

use crate::averaging::{AnchorPolicy, QuaternionAverager};
use crate::gate::{AcceptAll, OutlierGate};
use crate::history::PoseHistory;
use crate::stats::WindowStats;

/// Minimum window size for which statistics are computed.
pub const MIN_WINDOW: usize = 2;

/// Lifecycle state, derived from how many poses the history holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmootherState {
    /// No pose seen yet.
    Empty,
    /// One pose seen; not enough to average.
    Filling,
    /// Two or more poses held.
    Ready,
}

/// Construction parameters for [`PoseSmoother`].
#[derive(Debug, Clone, PartialEq)]
pub struct SmootherConfig {
    /// Window capacity; must be greater than zero.
    pub history_size: usize,
    /// Frame tag stamped on every emitted pose.
    pub output_frame_id: String,
    /// Starting context supplied by the caller. The averaging does not use it.
    pub initial_reference_pose: Pose,
}

impl SmootherConfig {
    pub fn new(
        history_size: usize,
        output_frame_id: impl Into<String>,
        initial_reference_pose: Pose,
    ) -> Self {
        Self {
            history_size,
            output_frame_id: output_frame_id.into(),
            initial_reference_pose,
        }
    }
}

/// Bounded-window mean filter over pose observations.
///
/// Single-writer: callers that share a smoother across threads must serialize
/// calls to [`PoseSmoother::update`] themselves.
#[derive(Debug)]
pub struct PoseSmoother {
    history: PoseHistory,
    output_frame_id: String,
    initial_reference_pose: Pose,
    averager: QuaternionAverager,
    gate: Box<dyn OutlierGate>,
    last_output: Option<FilteredPose>,
}

impl PoseSmoother {
    /// Create a smoother with the default anchor policy and an
    /// accept-everything gate.
    ///
    /// # Errors
    ///
    /// [`TrackError::InvalidConfiguration`] if `history_size` is zero.
    pub fn new(config: SmootherConfig) -> Result<Self, TrackError> {
        let history = PoseHistory::new(config.history_size)?;
        if config.history_size <= MIN_WINDOW {
            warn!(
                history_size = config.history_size,
                "history_size leaves fewer than {MIN_WINDOW} poses after eviction; no filtered pose will ever be emitted"
            );
        }
        Ok(Self {
            history,
            output_frame_id: config.output_frame_id,
            initial_reference_pose: config.initial_reference_pose,
            averager: QuaternionAverager::default(),
            gate: Box::new(AcceptAll),
            last_output: None,
        })
    }

    /// Replace the outlier gate.
    pub fn with_gate(mut self, gate: impl OutlierGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    /// Replace the hemisphere anchor policy.
    pub fn with_anchor(mut self, anchor: impl AnchorPolicy + 'static) -> Self {
        self.averager = QuaternionAverager::new(anchor);
        self
    }

    /// Feed one observation; returns the filtered pose when one is produced.
    ///
    /// The statistics come from the window as it stands before `observation`
    /// is inserted, with the entry that the insertion will evict already left
    /// out. `None` is returned while that window holds fewer than two poses,
    /// and when the gate rejects the observation (history is then unchanged).
    pub fn update(&mut self, observation: Pose) -> Option<FilteredPose> {
        let evicting = usize::from(self.history.is_full());
        let window_len = self.history.len() - evicting;

        if window_len < MIN_WINDOW {
            debug!(window_len, "window too small to average");
            self.history.push(observation);
            return None;
        }

        let previous_mean = self.last_output.as_ref().map(|f| f.pose.orientation);
        let stats = match WindowStats::compute(
            self.history.iter().skip(evicting),
            &self.averager,
            previous_mean.as_ref(),
        ) {
            Ok(stats) => stats,
            Err(e) => {
                // Unreachable with window_len >= MIN_WINDOW; keep the
                // observation rather than drop it.
                warn!(error = %e, "window statistics unavailable");
                self.history.push(observation);
                return None;
            }
        };
        debug!(
            count = stats.count,
            mean_x = stats.mean_x,
            mean_y = stats.mean_y,
            "averaged window"
        );

        if !self.gate.accept(&observation, &stats) {
            warn!(
                gate = self.gate.name(),
                x = observation.position.x,
                y = observation.position.y,
                "observation rejected as outlier"
            );
            return None;
        }

        self.history.push(observation);

        let filtered = FilteredPose {
            pose: Pose::new(
                Position::new(stats.mean_x, stats.mean_y, 0.0),
                stats.mean_orientation,
                self.output_frame_id.clone(),
                Utc::now(),
            ),
            window_len: stats.count,
        };
        info!(
            x = stats.mean_x,
            y = stats.mean_y,
            yaw = filtered.yaw(),
            "filtered pose"
        );
        self.last_output = Some(filtered.clone());
        Some(filtered)
    }

    /// The most recent raw observation.
    ///
    /// # Errors
    ///
    /// [`TrackError::EmptyHistory`] before the first [`PoseSmoother::update`].
    pub fn latest_observed(&self) -> Result<&Pose, TrackError> {
        self.history.latest()
    }

    pub fn state(&self) -> SmootherState {
        match self.history.len() {
            0 => SmootherState::Empty,
            1 => SmootherState::Filling,
            _ => SmootherState::Ready,
        }
    }

    pub fn history(&self) -> &PoseHistory {
        &self.history
    }

    pub fn output_frame_id(&self) -> &str {
        &self.output_frame_id
    }

    pub fn initial_reference_pose(&self) -> &Pose {
        &self.initial_reference_pose
    }

    /// The last pose emitted by [`PoseSmoother::update`].
    pub fn last_output(&self) -> Option<&FilteredPose> {
        self.last_output.as_ref()
    }
}
