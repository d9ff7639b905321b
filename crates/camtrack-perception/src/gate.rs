//! Outlier gating.
//!
//! An [`OutlierGate`] decides whether an incoming observation may join the
//! window. It is consulted with the statistics of the window *before* the
//! candidate is inserted and only returns a verdict; it never touches the
//! history.
//!
//! | Gate | Behaviour |
//! |---|---|
//! | [`AcceptAll`] | Accepts every observation (the default). |
//! | [`SigmaGate`] | Rejects observations more than `k · σ` from the window mean. |
//! | any `Fn(&Pose, &WindowStats) -> bool` | Custom predicate. |

use std::fmt;

use camtrack_types::{Pose, TrackError};

use crate::averaging::align_to;
use crate::stats::WindowStats;

/// Decides whether a candidate observation is admitted into the window.
pub trait OutlierGate: Send + Sync {
    /// Return `true` to admit `candidate`.
    fn accept(&self, candidate: &Pose, stats: &WindowStats) -> bool;

    /// Short name used in log output.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> OutlierGate for F
where
    F: Fn(&Pose, &WindowStats) -> bool + Send + Sync,
{
    fn accept(&self, candidate: &Pose, stats: &WindowStats) -> bool {
        self(candidate, stats)
    }
}

impl fmt::Debug for dyn OutlierGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutlierGate({})", self.name())
    }
}

/// Admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl OutlierGate for AcceptAll {
    fn accept(&self, _: &Pose, _: &WindowStats) -> bool {
        true
    }

    fn name(&self) -> &str {
        "accept_all"
    }
}

/// Per-axis standard-deviation gate.
///
/// A candidate is rejected when, on `x`, `y` or any quaternion component
/// (after hemisphere alignment to the window's anchor), it lies more than
/// `k · max(σ, floor)` from the window mean. `floor` keeps a perfectly still
/// window (σ = 0) from rejecting every new sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmaGate {
    k: f64,
    floor: f64,
}

impl SigmaGate {
    /// # Errors
    ///
    /// [`TrackError::InvalidConfiguration`] unless `k > 0` and `floor >= 0`,
    /// both finite.
    pub fn new(k: f64, floor: f64) -> Result<Self, TrackError> {
        if !(k.is_finite() && k > 0.0) {
            return Err(TrackError::InvalidConfiguration(format!(
                "sigma gate k must be positive, got {k}"
            )));
        }
        if !(floor.is_finite() && floor >= 0.0) {
            return Err(TrackError::InvalidConfiguration(format!(
                "sigma gate floor must be non-negative, got {floor}"
            )));
        }
        Ok(Self { k, floor })
    }

    fn within(&self, value: f64, mean: f64, sigma: f64) -> bool {
        (value - mean).abs() <= self.k * sigma.max(self.floor)
    }
}

impl OutlierGate for SigmaGate {
    fn accept(&self, candidate: &Pose, stats: &WindowStats) -> bool {
        let q = align_to(candidate.orientation, &stats.accumulator.reference());
        let m = stats.mean_orientation;
        let s = stats.std_orientation;

        self.within(candidate.position.x, stats.mean_x, stats.std_x)
            && self.within(candidate.position.y, stats.mean_y, stats.std_y)
            && self.within(q.x, m.x, s[0])
            && self.within(q.y, m.y, s[1])
            && self.within(q.z, m.z, s[2])
            && self.within(q.w, m.w, s[3])
    }

    fn name(&self) -> &str {
        "sigma"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::averaging::QuaternionAverager;

    fn window_stats(xs: &[f64]) -> WindowStats {
        let poses: Vec<Pose> = xs.iter().map(|&x| Pose::planar(x, 0.0, 0.0, "/camera")).collect();
        WindowStats::compute(&poses, &QuaternionAverager::default(), None).unwrap()
    }

    #[test]
    fn accept_all_accepts_anything() {
        let stats = window_stats(&[0.0, 0.0]);
        let far = Pose::planar(1e9, -1e9, 3.0, "/camera");
        assert!(AcceptAll.accept(&far, &stats));
    }

    #[test]
    fn closure_is_a_gate() {
        let gate = |p: &Pose, s: &WindowStats| (p.position.x - s.mean_x).abs() < 1.0;
        let stats = window_stats(&[0.0, 2.0]);
        assert!(gate.accept(&Pose::planar(1.5, 0.0, 0.0, "/camera"), &stats));
        assert!(!gate.accept(&Pose::planar(5.0, 0.0, 0.0, "/camera"), &stats));
    }

    #[test]
    fn sigma_gate_rejects_far_position() {
        // mean 1.0, sigma 1.0
        let stats = window_stats(&[0.0, 2.0]);
        let gate = SigmaGate::new(2.0, 0.0).unwrap();
        assert!(gate.accept(&Pose::planar(2.9, 0.0, 0.0, "/camera"), &stats));
        assert!(!gate.accept(&Pose::planar(3.1, 0.0, 0.0, "/camera"), &stats));
    }

    #[test]
    fn sigma_gate_rejects_far_heading() {
        let stats = window_stats(&[0.0, 0.0, 0.0]);
        let gate = SigmaGate::new(3.0, 0.01).unwrap();
        assert!(gate.accept(&Pose::planar(0.0, 0.0, 0.01, "/camera"), &stats));
        assert!(!gate.accept(&Pose::planar(0.0, 0.0, 1.0, "/camera"), &stats));
    }

    #[test]
    fn sigma_gate_ignores_quaternion_sign() {
        let stats = window_stats(&[0.0, 0.0]);
        let gate = SigmaGate::new(3.0, 0.01).unwrap();
        let mut flipped = Pose::planar(0.0, 0.0, 0.0, "/camera");
        flipped.orientation = flipped.orientation.negated();
        assert!(gate.accept(&flipped, &stats));
    }

    #[test]
    fn sigma_gate_floor_applies_to_still_window() {
        let stats = window_stats(&[1.0, 1.0]);
        let strict = SigmaGate::new(2.0, 0.0).unwrap();
        let floored = SigmaGate::new(2.0, 0.05).unwrap();
        let nudged = Pose::planar(1.05, 0.0, 0.0, "/camera");
        assert!(!strict.accept(&nudged, &stats));
        assert!(floored.accept(&nudged, &stats));
    }

    #[test]
    fn sigma_gate_validates_parameters() {
        assert!(SigmaGate::new(0.0, 0.0).is_err());
        assert!(SigmaGate::new(-1.0, 0.0).is_err());
        assert!(SigmaGate::new(f64::NAN, 0.0).is_err());
        assert!(SigmaGate::new(2.0, -0.1).is_err());
    }
}
