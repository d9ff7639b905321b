//! `camtrack-perception` – the pose averaging engine.
//!
//! Turns a noisy stream of tracker pose observations into a smoothed pose by
//! averaging over a bounded window of recent samples.
//!
//! # Modules
//!
//! - [`history`] – [`PoseHistory`][history::PoseHistory]: fixed-capacity FIFO
//!   window of observations.
//! - [`averaging`] – [`QuaternionAverager`][averaging::QuaternionAverager]:
//!   hemisphere-corrected quaternion mean with a pluggable
//!   [`AnchorPolicy`][averaging::AnchorPolicy].
//! - [`stats`] – [`WindowStats`][stats::WindowStats]: per-update means and
//!   spreads, recomputed from scratch over the window.
//! - [`gate`] – [`OutlierGate`][gate::OutlierGate]: predicate that may keep an
//!   observation out of the window.
//! - [`smoother`] – [`PoseSmoother`][smoother::PoseSmoother]: ties the above
//!   together and emits [`FilteredPose`][camtrack_types::FilteredPose]s.

pub mod averaging;
pub mod gate;
pub mod history;
pub mod smoother;
pub mod stats;

pub use averaging::{
    AnchorPolicy, FirstInWindow, PreviousMean, QuaternionAccumulator, QuaternionAverager,
};
pub use gate::{AcceptAll, OutlierGate, SigmaGate};
pub use history::PoseHistory;
pub use smoother::{PoseSmoother, SmootherConfig, SmootherState};
pub use stats::WindowStats;
