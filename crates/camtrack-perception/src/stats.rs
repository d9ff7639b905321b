//! Per-pass statistics over the pose window.

use camtrack_types::{Pose, Quaternion, TrackError};

use crate::averaging::{QuaternionAccumulator, QuaternionAverager, align_to};

/// Statistics of one window snapshot, computed from scratch on every update.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowStats {
    /// Number of poses in the window.
    pub count: usize,
    pub mean_x: f64,
    pub mean_y: f64,
    /// Hemisphere-aligned orientation sums for this pass.
    pub accumulator: QuaternionAccumulator,
    /// `accumulator` divided by `count`; not unit-norm in general.
    pub mean_orientation: Quaternion,
    /// Population standard deviation of `position.x`.
    pub std_x: f64,
    /// Population standard deviation of `position.y`.
    pub std_y: f64,
    /// Population standard deviation of each aligned quaternion component,
    /// in (x, y, z, w) order.
    pub std_orientation: [f64; 4],
}

impl WindowStats {
    /// Compute statistics over `window` (oldest first).
    ///
    /// # Errors
    ///
    /// [`TrackError::EmptyHistory`] if `window` yields no poses.
    pub fn compute<'a>(
        window: impl IntoIterator<Item = &'a Pose>,
        averager: &QuaternionAverager,
        previous_mean: Option<&Quaternion>,
    ) -> Result<Self, TrackError> {
        let window: Vec<&Pose> = window.into_iter().collect();
        let orientations: Vec<Quaternion> = window.iter().map(|p| p.orientation).collect();
        let accumulator = averager.accumulate(&orientations, previous_mean)?;
        let mean_orientation = accumulator.mean()?;

        let n = window.len() as f64;
        let mean_x = window.iter().map(|p| p.position.x).sum::<f64>() / n;
        let mean_y = window.iter().map(|p| p.position.y).sum::<f64>() / n;

        let std_x = population_std(window.iter().map(|p| p.position.x), mean_x, n);
        let std_y = population_std(window.iter().map(|p| p.position.y), mean_y, n);

        let reference = accumulator.reference();
        let aligned: Vec<Quaternion> = orientations
            .iter()
            .map(|q| align_to(*q, &reference))
            .collect();
        let std_orientation = [
            population_std(aligned.iter().map(|q| q.x), mean_orientation.x, n),
            population_std(aligned.iter().map(|q| q.y), mean_orientation.y, n),
            population_std(aligned.iter().map(|q| q.z), mean_orientation.z, n),
            population_std(aligned.iter().map(|q| q.w), mean_orientation.w, n),
        ];

        Ok(Self {
            count: window.len(),
            mean_x,
            mean_y,
            accumulator,
            mean_orientation,
            std_x,
            std_y,
            std_orientation,
        })
    }
}

fn population_std(values: impl Iterator<Item = f64>, mean: f64, n: f64) -> f64 {
    (values.map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
