//! Hemisphere-corrected quaternion averaging.
//!
//! `q` and `-q` encode the same rotation, so a plain component-wise mean of a
//! set of orientations can cancel itself out. Before each quaternion is added
//! to the running sum it is compared against a *reference* quaternion and
//! sign-flipped when the two lie in opposite hemispheres (negative dot
//! product). The mean of the aligned sum is a good approximation of the true
//! rotational mean as long as the samples are closely clustered.
//!
//! The result is deliberately **not** renormalized.
//!
//! # Example
//!
//! ```rust
//! use camtrack_perception::averaging::QuaternionAverager;
//! use camtrack_types::Quaternion;
//!
//! let q = Quaternion::from_rpy(0.0, 0.0, 0.4);
//! let window = [q, q.negated(), q];
//!
//! let acc = QuaternionAverager::default().accumulate(&window, None).unwrap();
//! let mean = acc.mean().unwrap();
//! assert!((mean.yaw() - 0.4).abs() < 1e-9);
//! ```

use std::fmt;

use camtrack_types::{Quaternion, TrackError};

// ────────────────────────────────────────────────────────────────────────────
// Accumulator
// ────────────────────────────────────────────────────────────────────────────

/// Running sums of hemisphere-aligned quaternion components.
///
/// Created fresh for each pass over the window and discarded afterwards;
/// nothing is carried over between passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuaternionAccumulator {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
    terms: usize,
    reference: Quaternion,
}

impl QuaternionAccumulator {
    /// Zeroed accumulator that aligns every term against `reference`.
    pub fn new(reference: Quaternion) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 0.0,
            terms: 0,
            reference,
        }
    }

    /// Add `q` to the sums after hemisphere alignment; returns the aligned `q`.
    pub fn fold(&mut self, q: Quaternion) -> Quaternion {
        let aligned = align_to(q, &self.reference);
        self.x += aligned.x;
        self.y += aligned.y;
        self.z += aligned.z;
        self.w += aligned.w;
        self.terms += 1;
        aligned
    }

    /// Number of quaternions folded in so far.
    pub fn terms(&self) -> usize {
        self.terms
    }

    /// The hemisphere anchor used for this pass.
    pub fn reference(&self) -> Quaternion {
        self.reference
    }

    /// The raw component sums.
    pub fn sum(&self) -> Quaternion {
        Quaternion::new(self.x, self.y, self.z, self.w)
    }

    /// Component-wise mean, `sum / terms`. Not renormalized.
    ///
    /// # Errors
    ///
    /// [`TrackError::EmptyHistory`] if nothing has been folded in.
    pub fn mean(&self) -> Result<Quaternion, TrackError> {
        if self.terms == 0 {
            return Err(TrackError::EmptyHistory);
        }
        let n = self.terms as f64;
        Ok(Quaternion::new(self.x / n, self.y / n, self.z / n, self.w / n))
    }
}

/// Return `q` or `-q`, whichever lies in the same hemisphere as `reference`.
pub fn align_to(q: Quaternion, reference: &Quaternion) -> Quaternion {
    if q.dot(reference) < 0.0 {
        q.negated()
    } else {
        q
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Anchor policies
// ────────────────────────────────────────────────────────────────────────────

/// Chooses the reference quaternion for one averaging pass.
pub trait AnchorPolicy: fmt::Debug + Send + Sync {
    /// Pick the anchor for `window` (oldest first).
    ///
    /// `previous_mean` is the orientation emitted by the last pass, if any.
    /// Returns `None` only when `window` is empty.
    fn reference(
        &self,
        window: &[Quaternion],
        previous_mean: Option<&Quaternion>,
    ) -> Option<Quaternion>;
}

/// Anchor on the oldest orientation in the window.
///
/// Because the window slides, the anchor changes from pass to pass. If the
/// oldest sample is itself an outlier every other sample is aligned against
/// a bad reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstInWindow;

impl AnchorPolicy for FirstInWindow {
    fn reference(&self, window: &[Quaternion], _: Option<&Quaternion>) -> Option<Quaternion> {
        window.first().copied()
    }
}

/// Anchor on the previously emitted mean; falls back to [`FirstInWindow`]
/// until something has been emitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreviousMean;

impl AnchorPolicy for PreviousMean {
    fn reference(
        &self,
        window: &[Quaternion],
        previous_mean: Option<&Quaternion>,
    ) -> Option<Quaternion> {
        let first = window.first()?;
        Some(previous_mean.copied().unwrap_or(*first))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// QuaternionAverager
// ────────────────────────────────────────────────────────────────────────────

/// Folds a window of orientations into a [`QuaternionAccumulator`] using a
/// pluggable [`AnchorPolicy`].
#[derive(Debug)]
pub struct QuaternionAverager {
    anchor: Box<dyn AnchorPolicy>,
}

impl Default for QuaternionAverager {
    fn default() -> Self {
        Self::new(FirstInWindow)
    }
}

impl QuaternionAverager {
    pub fn new(anchor: impl AnchorPolicy + 'static) -> Self {
        Self {
            anchor: Box::new(anchor),
        }
    }

    /// Run one full pass over `window`.
    ///
    /// # Errors
    ///
    /// [`TrackError::EmptyHistory`] if `window` is empty.
    pub fn accumulate(
        &self,
        window: &[Quaternion],
        previous_mean: Option<&Quaternion>,
    ) -> Result<QuaternionAccumulator, TrackError> {
        let reference = self
            .anchor
            .reference(window, previous_mean)
            .ok_or(TrackError::EmptyHistory)?;

        let mut acc = QuaternionAccumulator::new(reference);
        for q in window {
            acc.fold(*q);
        }
        Ok(acc)
    }
}
