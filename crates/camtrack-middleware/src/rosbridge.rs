//! rosbridge JSON conversion for `geometry_msgs/PoseStamped`.
//!
//! [`RosBridge`] sits between rosbridge-style JSON traffic and the internal
//! [`EventBus`]:
//!
//! * **Inbound** – a `PoseStamped` message, bare or wrapped in a
//!   `{"op": "publish", "topic": …, "msg": …}` envelope, is converted into a
//!   [`Pose`] and published on [`Topic::Observations`].
//! * **Outbound** – a [`FilteredPose`] is serialised as a publish envelope for
//!   the configured output topic.
//!
//! Both ROS 1 (`secs`/`nsecs`) and ROS 2 (`sec`/`nanosec`) header stamps are
//! accepted. A missing or all-zero stamp is "unset" in ROS and is replaced by
//! the time of arrival.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use camtrack_types::{Event, EventPayload, FilteredPose, Pose, Position, Quaternion, TrackError};

use crate::bus::{EventBus, Topic};

/// Event source tag for observations ingested through the bridge.
pub const SOURCE: &str = "camtrack-middleware::rosbridge";

/// Largest inbound message accepted, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuaternionMsg {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseMsg {
    pub position: PointMsg,
    pub orientation: QuaternionMsg,
}

/// Header stamp in either ROS 1 or ROS 2 spelling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StampMsg {
    Ros1 { secs: i64, nsecs: u32 },
    Ros2 { sec: i64, nanosec: u32 },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeaderMsg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<StampMsg>,
    #[serde(default)]
    pub frame_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseStampedMsg {
    #[serde(default)]
    pub header: HeaderMsg,
    pub pose: PoseMsg,
}

#[derive(Debug, Serialize)]
struct PublishEnvelope<'a> {
    op: &'static str,
    topic: &'a str,
    msg: PoseStampedMsg,
}

// ────────────────────────────────────────────────────────────────────────────
// Conversions
// ────────────────────────────────────────────────────────────────────────────

impl StampMsg {
    fn to_datetime(self) -> Result<Option<DateTime<Utc>>, TrackError> {
        let (secs, nanos) = match self {
            StampMsg::Ros1 { secs, nsecs } => (secs, nsecs),
            StampMsg::Ros2 { sec, nanosec } => (sec, nanosec),
        };
        if secs == 0 && nanos == 0 {
            return Ok(None);
        }
        DateTime::from_timestamp(secs, nanos)
            .map(Some)
            .ok_or_else(|| TrackError::Parsing(format!("stamp out of range: {secs}.{nanos:09}")))
    }
}

impl From<DateTime<Utc>> for StampMsg {
    fn from(t: DateTime<Utc>) -> Self {
        StampMsg::Ros1 {
            secs: t.timestamp(),
            nsecs: t.timestamp_subsec_nanos(),
        }
    }
}

impl TryFrom<PoseStampedMsg> for Pose {
    type Error = TrackError;

    fn try_from(msg: PoseStampedMsg) -> Result<Self, Self::Error> {
        let timestamp = match msg.header.stamp {
            Some(stamp) => stamp.to_datetime()?.unwrap_or_else(Utc::now),
            None => Utc::now(),
        };
        let p = msg.pose.position;
        let q = msg.pose.orientation;
        Ok(Pose::new(
            Position::new(p.x, p.y, p.z),
            Quaternion::new(q.x, q.y, q.z, q.w),
            msg.header.frame_id,
            timestamp,
        ))
    }
}

impl From<&Pose> for PoseStampedMsg {
    fn from(pose: &Pose) -> Self {
        let p = pose.position;
        let q = pose.orientation;
        Self {
            header: HeaderMsg {
                stamp: Some(pose.timestamp.into()),
                frame_id: pose.frame_id.clone(),
            },
            pose: PoseMsg {
                position: PointMsg { x: p.x, y: p.y, z: p.z },
                orientation: QuaternionMsg { x: q.x, y: q.y, z: q.z, w: q.w },
            },
        }
    }
}

/// Parse a rosbridge `PoseStamped`, bare or inside a publish envelope.
///
/// # Errors
///
/// [`TrackError::Parsing`] for oversized, malformed or incomplete messages.
pub fn parse_pose_stamped(text: &str) -> Result<Pose, TrackError> {
    if text.len() > MAX_MESSAGE_BYTES {
        return Err(TrackError::Parsing(format!(
            "message is {} bytes, exceeding the limit of {MAX_MESSAGE_BYTES}",
            text.len()
        )));
    }
    let mut json: Value =
        serde_json::from_str(text).map_err(|e| TrackError::Parsing(e.to_string()))?;

    if let Some(msg) = json.get_mut("msg").map(Value::take) {
        json = msg;
    }
    let msg: PoseStampedMsg =
        serde_json::from_value(json).map_err(|e| TrackError::Parsing(e.to_string()))?;
    Pose::try_from(msg)
}

/// Serialise `filtered` as a rosbridge publish envelope on `topic`.
///
/// # Errors
///
/// [`TrackError::Parsing`] if serialisation fails.
pub fn encode_filtered(topic: &str, filtered: &FilteredPose) -> Result<String, TrackError> {
    let envelope = PublishEnvelope {
        op: "publish",
        topic,
        msg: PoseStampedMsg::from(&filtered.pose),
    };
    serde_json::to_string(&envelope).map_err(|e| TrackError::Parsing(e.to_string()))
}

// ────────────────────────────────────────────────────────────────────────────
// RosBridge
// ────────────────────────────────────────────────────────────────────────────

/// Bridge between rosbridge JSON and the internal [`EventBus`].
#[derive(Clone)]
pub struct RosBridge {
    bus: Arc<EventBus>,
    output_topic: String,
}

impl RosBridge {
    /// `output_topic` is the ROS topic filtered poses are published to,
    /// e.g. `"turtlebot_pose"`.
    pub fn new(bus: Arc<EventBus>, output_topic: impl Into<String>) -> Self {
        Self {
            bus,
            output_topic: output_topic.into(),
        }
    }

    /// Parse an inbound `PoseStamped` and publish it on
    /// [`Topic::Observations`].
    pub fn ingest_pose_stamped(&self, text: &str) -> Result<usize, TrackError> {
        let pose = parse_pose_stamped(text)?;
        debug!(
            frame_id = %pose.frame_id,
            x = pose.position.x,
            y = pose.position.y,
            "ingested pose"
        );
        self.bus.publish_to(
            Topic::Observations,
            Event::new(SOURCE, EventPayload::Observation(pose)),
        )
    }

    /// Encode `filtered` for the configured output topic.
    pub fn encode(&self, filtered: &FilteredPose) -> Result<String, TrackError> {
        encode_filtered(&self.output_topic, filtered)
    }

    pub fn output_topic(&self) -> &str {
        &self.output_topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROS1_BARE: &str = r#"{
        "header": {"seq": 7, "stamp": {"secs": 1700000000, "nsecs": 500}, "frame_id": "/camera"},
        "pose": {
            "position": {"x": 1.5, "y": -2.0, "z": 0.1},
            "orientation": {"x": 0.0, "y": 0.0, "z": 0.0, "w": 1.0}
        }
    }"#;

    #[test]
    fn parses_bare_ros1_message() {
        let pose = parse_pose_stamped(ROS1_BARE).unwrap();
        assert_eq!(pose.frame_id, "/camera");
        assert!((pose.position.x - 1.5).abs() < 1e-12);
        assert!((pose.position.y + 2.0).abs() < 1e-12);
        assert_eq!(pose.orientation, Quaternion::identity());
        assert_eq!(pose.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(pose.timestamp.timestamp_subsec_nanos(), 500);
    }

    #[test]
    fn parses_enveloped_ros2_message() {
        let text = r#"{"op": "publish", "topic": "/psmove/pose", "msg": {
            "header": {"stamp": {"sec": 42, "nanosec": 7}, "frame_id": "map"},
            "pose": {"position": {"x": 0, "y": 1, "z": 2},
                     "orientation": {"x": 0, "y": 0, "z": 1, "w": 0}}
        }}"#;
        let pose = parse_pose_stamped(text).unwrap();
        assert_eq!(pose.frame_id, "map");
        assert_eq!(pose.timestamp.timestamp(), 42);
        assert!((pose.orientation.z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_or_missing_stamp_means_now() {
        let before = Utc::now();
        let zero = r#"{"header": {"stamp": {"secs": 0, "nsecs": 0}},
            "pose": {"position": {"x": 0, "y": 0, "z": 0},
                     "orientation": {"x": 0, "y": 0, "z": 0, "w": 1}}}"#;
        let missing = r#"{"pose": {"position": {"x": 0, "y": 0, "z": 0},
                     "orientation": {"x": 0, "y": 0, "z": 0, "w": 1}}}"#;
        let a = parse_pose_stamped(zero).unwrap();
        let b = parse_pose_stamped(missing).unwrap();
        assert!(a.timestamp >= before);
        assert!(b.timestamp >= before);
        assert_eq!(b.frame_id, "");
    }

    #[test]
    fn malformed_input_is_a_parsing_error() {
        for text in [
            "not json",
            r#"{"header": {}}"#,
            r#"{"pose": {"position": {"x": 0, "y": 0, "z": 0}}}"#,
            r#"{"op": "publish", "msg": 3}"#,
        ] {
            assert!(
                matches!(parse_pose_stamped(text), Err(TrackError::Parsing(_))),
                "expected parsing error for {text}"
            );
        }
    }

    #[test]
    fn oversized_input_is_rejected() {
        let text = " ".repeat(MAX_MESSAGE_BYTES + 1);
        assert!(matches!(parse_pose_stamped(&text), Err(TrackError::Parsing(_))));
    }

    #[test]
    fn encodes_publish_envelope() {
        let mut pose = Pose::planar(1.0, 2.0, 0.0, "/turtlebot_image_frame");
        pose.timestamp = DateTime::from_timestamp(10, 20).unwrap();
        let filtered = FilteredPose { pose, window_len: 3 };

        let text = encode_filtered("turtlebot_pose", &filtered).unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["op"], "publish");
        assert_eq!(json["topic"], "turtlebot_pose");
        assert_eq!(json["msg"]["header"]["frame_id"], "/turtlebot_image_frame");
        assert_eq!(json["msg"]["header"]["stamp"]["secs"], 10);
        assert_eq!(json["msg"]["header"]["stamp"]["nsecs"], 20);
        assert_eq!(json["msg"]["pose"]["position"]["x"], 1.0);
        assert_eq!(json["msg"]["pose"]["orientation"]["w"], 1.0);
    }

    #[test]
    fn encoded_output_parses_back() {
        let filtered = FilteredPose {
            pose: Pose::planar(3.0, 4.0, 0.5, "/turtlebot_image_frame"),
            window_len: 2,
        };
        let text = encode_filtered("turtlebot_pose", &filtered).unwrap();
        let pose = parse_pose_stamped(&text).unwrap();
        assert_eq!(pose.frame_id, filtered.pose.frame_id);
        assert!((pose.orientation.yaw() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ingest_publishes_observation() -> Result<(), Box<dyn std::error::Error>> {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe_to(Topic::Observations);
        let bridge = RosBridge::new(bus.clone(), "turtlebot_pose");

        assert_eq!(bridge.ingest_pose_stamped(ROS1_BARE)?, 1);
        let event = rx.recv().await?;
        assert_eq!(event.source, SOURCE);
        match event.payload {
            EventPayload::Observation(pose) => assert_eq!(pose.frame_id, "/camera"),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(bridge.output_topic(), "turtlebot_pose");
        Ok(())
    }
}
