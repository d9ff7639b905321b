//! Configuration – reads/writes `~/.camtrack/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use camtrack_perception::{PoseSmoother, PreviousMean, SigmaGate, SmootherConfig};
use camtrack_types::{Pose, TrackError};

/// Hemisphere anchor used by the quaternion averager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    #[default]
    FirstInWindow,
    PreviousMean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    #[default]
    AcceptAll,
    Sigma,
}

/// `[gate]` table. `k` and `floor` are required when `kind = "sigma"`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub kind: GateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<f64>,
}

/// `[initial_pose]` table: the planar starting pose handed to the smoother.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialPose {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default = "default_input_frame")]
    pub frame_id: String,
}

impl Default for InitialPose {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            yaw: 0.0,
            frame_id: default_input_frame(),
        }
    }
}

/// Persisted configuration stored in `~/.camtrack/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Number of observations kept in the averaging window.
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Frame tag stamped on every filtered pose.
    #[serde(default = "default_output_frame")]
    pub output_frame_id: String,

    /// ROS topic the filtered poses are published to.
    #[serde(default = "default_output_topic")]
    pub output_topic: String,

    /// Per-topic event bus buffer.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    #[serde(default)]
    pub anchor: AnchorKind,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub initial_pose: InitialPose,
}

fn default_history_size() -> usize {
    20
}
fn default_output_frame() -> String {
    "/turtlebot_image_frame".to_string()
}
fn default_output_topic() -> String {
    "turtlebot_pose".to_string()
}
fn default_bus_capacity() -> usize {
    256
}
fn default_input_frame() -> String {
    "/camera".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            output_frame_id: default_output_frame(),
            output_topic: default_output_topic(),
            bus_capacity: default_bus_capacity(),
            anchor: AnchorKind::default(),
            gate: GateConfig::default(),
            initial_pose: InitialPose::default(),
        }
    }
}

impl Config {
    /// Validate the config and build the smoother it describes.
    ///
    /// # Errors
    ///
    /// [`TrackError::InvalidConfiguration`] for a zero `history_size` or an
    /// incomplete / out-of-range `[gate]` table.
    pub fn build_smoother(&self) -> Result<PoseSmoother, TrackError> {
        let p = &self.initial_pose;
        let mut initial = Pose::planar(p.x, p.y, p.yaw, p.frame_id.clone());
        initial.position.z = p.z;

        let mut smoother = PoseSmoother::new(SmootherConfig::new(
            self.history_size,
            self.output_frame_id.clone(),
            initial,
        ))?;

        if self.anchor == AnchorKind::PreviousMean {
            smoother = smoother.with_anchor(PreviousMean);
        }

        if self.gate.kind == GateKind::Sigma {
            let (Some(k), Some(floor)) = (self.gate.k, self.gate.floor) else {
                return Err(TrackError::InvalidConfiguration(
                    "gate kind \"sigma\" requires both `k` and `floor`".to_string(),
                ));
            };
            smoother = smoother.with_gate(SigmaGate::new(k, floor)?);
        }
        Ok(smoother)
    }
}

/// Return the config path: `$CAMTRACK_CONFIG` if set, else
/// `~/.camtrack/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("CAMTRACK_CONFIG") {
        return PathBuf::from(p);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".camtrack").join("config.toml")
}

/// Load the config from `path`, applying env overrides. `None` if the file
/// does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, TrackError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        TrackError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| TrackError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `CAMTRACK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CAMTRACK_HISTORY_SIZE` | `history_size` |
/// | `CAMTRACK_OUTPUT_FRAME` | `output_frame_id` |
/// | `CAMTRACK_OUTPUT_TOPIC` | `output_topic` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("CAMTRACK_HISTORY_SIZE")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.history_size = n;
    }
    if let Ok(v) = std::env::var("CAMTRACK_OUTPUT_FRAME") {
        cfg.output_frame_id = v;
    }
    if let Ok(v) = std::env::var("CAMTRACK_OUTPUT_TOPIC") {
        cfg.output_topic = v;
    }
}

/// Write `cfg` to `path`, creating parent directories as needed.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), TrackError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| TrackError::Config(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| TrackError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        TrackError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}

/// Serializes tests that touch process environment variables.
///
/// Every test that sets, removes or reads (through [`load_from`] or
/// [`apply_env_overrides`]) a variable holds this guard.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camtrack_perception::SmootherState;

    #[test]
    fn defaults_match_tracker_node() {
        let cfg = Config::default();
        assert_eq!(cfg.history_size, 20);
        assert_eq!(cfg.output_frame_id, "/turtlebot_image_frame");
        assert_eq!(cfg.output_topic, "turtlebot_pose");
        assert_eq!(cfg.anchor, AnchorKind::FirstInWindow);
        assert_eq!(cfg.gate.kind, GateKind::AcceptAll);
    }

    #[test]
    fn config_path_points_to_camtrack_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".camtrack"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn roundtrip_config() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.history_size = 7;
        cfg.anchor = AnchorKind::PreviousMean;
        cfg.gate = GateConfig {
            kind: GateKind::Sigma,
            k: Some(2.0),
            floor: Some(0.05),
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.anchor, AnchorKind::PreviousMean);
        assert_eq!(loaded.gate, cfg.gate);
        assert_eq!(loaded.initial_pose, cfg.initial_pose);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "output_topic = \"filtered\"\n[gate]\nkind = \"accept_all\"\n",
        )
        .unwrap();

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.output_topic, "filtered");
        assert_eq!(cfg.bus_capacity, 256);
        assert_eq!(cfg.initial_pose.frame_id, "/camera");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_size = \"many\"").unwrap();
        assert!(matches!(load_from(&path), Err(TrackError::Config(_))));
    }

    #[test]
    fn build_smoother_rejects_zero_history() {
        let mut cfg = Config::default();
        cfg.history_size = 0;
        assert!(matches!(
            cfg.build_smoother(),
            Err(TrackError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn build_smoother_requires_sigma_parameters() {
        let mut cfg = Config::default();
        cfg.gate = GateConfig {
            kind: GateKind::Sigma,
            k: Some(2.0),
            floor: None,
        };
        assert!(matches!(
            cfg.build_smoother(),
            Err(TrackError::InvalidConfiguration(_))
        ));

        cfg.gate.floor = Some(0.01);
        assert!(cfg.build_smoother().is_ok());
    }

    #[test]
    fn build_smoother_carries_initial_pose() {
        let mut cfg = Config::default();
        cfg.initial_pose = InitialPose {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            yaw: 0.5,
            frame_id: "/map".into(),
        };
        let smoother = cfg.build_smoother().unwrap();
        let initial = smoother.initial_reference_pose();
        assert!((initial.position.z - 3.0).abs() < 1e-12);
        assert!((initial.orientation.yaw() - 0.5).abs() < 1e-9);
        assert_eq!(initial.frame_id, "/map");
        assert_eq!(smoother.state(), SmootherState::Empty);
        assert_eq!(smoother.history().capacity(), 20);
    }

    #[test]
    fn apply_env_overrides_history_size() {
        let _env = env_lock();
        // SAFETY: env access in tests is serialized by `env_lock`.
        unsafe { std::env::set_var("CAMTRACK_HISTORY_SIZE", "12") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.history_size, 12);

        unsafe { std::env::set_var("CAMTRACK_HISTORY_SIZE", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.history_size, 20, "invalid numbers are ignored");
        unsafe { std::env::remove_var("CAMTRACK_HISTORY_SIZE") };
    }

    #[test]
    fn apply_env_overrides_changes_output_frame() {
        let _env = env_lock();
        // SAFETY: env access in tests is serialized by `env_lock`.
        unsafe { std::env::set_var("CAMTRACK_OUTPUT_FRAME", "/map") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.output_frame_id, "/map");
        unsafe { std::env::remove_var("CAMTRACK_OUTPUT_FRAME") };
    }

    #[test]
    fn apply_env_overrides_changes_output_topic() {
        let _env = env_lock();
        // SAFETY: env access in tests is serialized by `env_lock`.
        unsafe { std::env::set_var("CAMTRACK_OUTPUT_TOPIC", "camera_pose_filtered") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.output_topic, "camera_pose_filtered");
        assert_eq!(cfg.output_frame_id, "/turtlebot_image_frame");
        unsafe { std::env::remove_var("CAMTRACK_OUTPUT_TOPIC") };
    }

    #[test]
    fn env_overrides_apply_on_top_of_config_file() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "output_topic = \"from_file\"\n").unwrap();

        // SAFETY: env access in tests is serialized by `env_lock`.
        unsafe { std::env::set_var("CAMTRACK_OUTPUT_TOPIC", "from_env") };
        let cfg = load_from(&path).expect("load ok").expect("some");
        unsafe { std::env::remove_var("CAMTRACK_OUTPUT_TOPIC") };
        assert_eq!(cfg.output_topic, "from_env");
    }
}
