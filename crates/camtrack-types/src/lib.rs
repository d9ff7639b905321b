use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Norm below which a quaternion is treated as zero and cannot be normalized.
pub const DEGENERATE_NORM: f64 = 1e-12;

/// A 3-D position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A rotation quaternion in ROS / tf2 component order (x, y, z, w).
///
/// Nothing here enforces unit length. Observations straight off a tracker and
/// averaged orientations are both allowed to drift from |q| = 1; call
/// [`Quaternion::normalized`] when a true unit quaternion is needed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Build a unit quaternion from fixed-axis roll, pitch and yaw (radians).
    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();
        Self::new(
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
            cr * cp * cy + sr * sp * sy,
        )
    }

    /// Four-component dot product.
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Flip the sign of every component.
    ///
    /// `-q` encodes the same rotation as `q`; this is not the inverse.
    pub fn negated(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, -self.w)
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Scale to unit length.
    ///
    /// # Errors
    ///
    /// [`TrackError::DegenerateQuaternion`] when the norm is (close to) zero.
    pub fn normalized(self) -> Result<Self, TrackError> {
        let n = self.norm();
        if !n.is_finite() || n < DEGENERATE_NORM {
            return Err(TrackError::DegenerateQuaternion);
        }
        Ok(Self::new(self.x / n, self.y / n, self.z / n, self.w / n))
    }

    /// Decompose into fixed-axis (roll, pitch, yaw) in radians.
    ///
    /// Every term is divided by the squared norm, so the result is the same
    /// for `q` and `s * q` with `s > 0`. An averaged, unnormalized quaternion
    /// therefore yields the angles of its normalized counterpart.
    pub fn to_rpy(&self) -> (f64, f64, f64) {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);
        let n2 = self.dot(self);
        if n2 < DEGENERATE_NORM * DEGENERATE_NORM {
            return (0.0, 0.0, 0.0);
        }
        let roll = (2.0 * (w * x + y * z)).atan2(w * w - x * x - y * y + z * z);
        let pitch = (2.0 * (w * y - x * z) / n2).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(w * w + x * x - y * y - z * z);
        (roll, pitch, yaw)
    }

    /// Heading about the vertical axis (radians).
    pub fn yaw(&self) -> f64 {
        self.to_rpy().2
    }
}

/// A timestamped, frame-tagged pose observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: Quaternion,
    /// Opaque coordinate-frame tag, e.g. `"/map"`.
    pub frame_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Pose {
    pub fn new(
        position: Position,
        orientation: Quaternion,
        frame_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            position,
            orientation,
            frame_id: frame_id.into(),
            timestamp,
        }
    }

    /// Planar pose `(x, y)` with heading `yaw`, stamped now.
    pub fn planar(x: f64, y: f64, yaw: f64, frame_id: impl Into<String>) -> Self {
        Self::new(
            Position::new(x, y, 0.0),
            Quaternion::from_rpy(0.0, 0.0, yaw),
            frame_id,
            Utc::now(),
        )
    }
}

/// The smoothed pose produced by the averaging engine.
///
/// `pose.orientation` is the component-wise mean of the hemisphere-aligned
/// window orientations. It is an approximation and is **not** guaranteed to
/// have unit norm; use [`FilteredPose::normalized`] to get one that does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredPose {
    pub pose: Pose,
    /// Number of observations the mean was taken over.
    pub window_len: usize,
}

impl FilteredPose {
    pub fn yaw(&self) -> f64 {
        self.pose.orientation.yaw()
    }

    /// Copy of the filtered pose with its orientation scaled to unit length.
    pub fn normalized(&self) -> Result<Pose, TrackError> {
        let mut pose = self.pose.clone();
        pose.orientation = pose.orientation.normalized()?;
        Ok(pose)
    }
}

/// Unified envelope for everything routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "camtrack-middleware::rosbridge"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped now.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A raw pose from the upstream tracker.
    Observation(Pose),
    /// A smoothed pose ready for downstream consumers.
    Filtered(FilteredPose),
}

/// Error type shared by every camtrack crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackError {
    #[error("Pose history is empty")]
    EmptyHistory,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Quaternion has zero norm and cannot be normalized")]
    DegenerateQuaternion,

    #[error("Message Parsing Error: {0}")]
    Parsing(String),

    #[error("Event Bus Error: {0}")]
    Channel(String),

    #[error("Config Error: {0}")]
    Config(String),
}
