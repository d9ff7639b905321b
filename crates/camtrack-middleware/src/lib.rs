//! `camtrack-middleware` – transport plumbing around the pose smoother.
//!
//! Moves pose observations in and filtered poses out without caring how the
//! averaging works.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`rosbridge`] – `geometry_msgs/PoseStamped` JSON conversion in rosbridge
//!   format, and the [`RosBridge`] ingest helper.
//! - [`node`] – [`TrackerNode`]: feeds observations from the bus into a
//!   [`PoseSmoother`][camtrack_perception::PoseSmoother] and publishes what it
//!   emits.

pub mod bus;
pub mod node;
pub mod rosbridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use node::TrackerNode;
pub use rosbridge::{MAX_MESSAGE_BYTES, RosBridge, encode_filtered, parse_pose_stamped};
