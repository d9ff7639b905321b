//! Fixed-capacity FIFO window of pose observations.

use std::collections::VecDeque;

use camtrack_types::{Pose, TrackError};

/// Bounded history of the most recent [`Pose`] observations.
///
/// Holds at most `capacity` poses; pushing into a full history evicts the
/// oldest entry first. The capacity never changes after construction.
#[derive(Debug, Clone)]
pub struct PoseHistory {
    capacity: usize,
    poses: VecDeque<Pose>,
}

impl PoseHistory {
    /// Create an empty history holding at most `capacity` poses.
    ///
    /// # Errors
    ///
    /// [`TrackError::InvalidConfiguration`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, TrackError> {
        if capacity == 0 {
            return Err(TrackError::InvalidConfiguration(
                "history_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            poses: VecDeque::with_capacity(capacity),
        })
    }

    /// Append `pose`, evicting and returning the oldest entry when full.
    pub fn push(&mut self, pose: Pose) -> Option<Pose> {
        let evicted = if self.is_full() {
            self.poses.pop_front()
        } else {
            None
        };
        self.poses.push_back(pose);
        evicted
    }

    /// The most recently pushed pose.
    ///
    /// # Errors
    ///
    /// [`TrackError::EmptyHistory`] if nothing has been pushed yet.
    pub fn latest(&self) -> Result<&Pose, TrackError> {
        self.poses.back().ok_or(TrackError::EmptyHistory)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.poses.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Pose> + Clone {
        self.poses.iter()
    }
}
