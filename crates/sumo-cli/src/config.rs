//! Configuration – reads/writes `~/.sumo/config.toml`.
//!
//! Every field has a default, so a missing file or a partial one is fine.
//! After parsing, a handful of `SUMO_*` environment variables override the
//! file, and the result is validated before anything is built from it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sumo_hal::MAX_EMISSION_RATE_HZ;
use sumo_runtime::{ArbiterConfig, ControlLoopConfig};
use sumo_types::SumoError;
use tracing::{debug, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[control]` – loop timing and failure handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    pub tick_period_ms: u64,
    /// Motion primitive emission rate.
    pub emission_rate_hz: f32,
    pub max_consecutive_actuation_failures: usize,
    /// Age after which a sensor stream is logged as stale.
    pub stream_timeout_ms: u64,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            tick_period_ms: 20,
            emission_rate_hz: 40.0,
            max_consecutive_actuation_failures: 5,
            stream_timeout_ms: 500,
        }
    }
}

impl ControlSection {
    pub fn loop_config(&self) -> ControlLoopConfig {
        ControlLoopConfig {
            tick_period: Duration::from_millis(self.tick_period_ms),
            max_consecutive_actuation_failures: self.max_consecutive_actuation_failures,
            stream_timeout: Duration::from_millis(self.stream_timeout_ms),
        }
    }
}

/// `[safety]` – velocity caps enforced on every outgoing command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySection {
    pub max_linear_speed: f32,
    pub max_angular_speed: f32,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            max_linear_speed: 1.0,
            max_angular_speed: 2.0,
        }
    }
}

/// Persisted configuration stored in `~/.sumo/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fixed seed for strategy selection.  Unset means a fresh seed per run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub control: ControlSection,
    pub arbiter: ArbiterConfig,
    pub safety: SafetySection,
}

impl Config {
    /// Reject values the control stack cannot run with.
    pub fn validate(&self) -> Result<(), SumoError> {
        let c = &self.control;
        if c.tick_period_ms == 0 {
            return Err(SumoError::Config("control.tick_period_ms must be positive".to_string()));
        }
        if !c.emission_rate_hz.is_finite()
            || c.emission_rate_hz <= 0.0
            || c.emission_rate_hz > MAX_EMISSION_RATE_HZ
        {
            return Err(SumoError::Config(format!(
                "control.emission_rate_hz must be in (0, {MAX_EMISSION_RATE_HZ}], got {}",
                c.emission_rate_hz
            )));
        }
        if c.max_consecutive_actuation_failures == 0 {
            return Err(SumoError::Config(
                "control.max_consecutive_actuation_failures must be positive".to_string(),
            ));
        }
        if c.stream_timeout_ms == 0 {
            return Err(SumoError::Config("control.stream_timeout_ms must be positive".to_string()));
        }
        for (name, cap) in [
            ("safety.max_linear_speed", self.safety.max_linear_speed),
            ("safety.max_angular_speed", self.safety.max_angular_speed),
        ] {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(SumoError::Config(format!("{name} must be positive, got {cap}")));
            }
        }
        self.arbiter.validate()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────────────────

/// `$SUMO_CONFIG` if set, otherwise `~/.sumo/config.toml`.
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    resolve_config_path(std::env::var("SUMO_CONFIG").ok(), &home)
}

/// Pure part of [`config_path`], testable without touching the environment.
pub(crate) fn resolve_config_path(explicit: Option<String>, home: &str) -> PathBuf {
    match explicit {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(home).join(".sumo").join("config.toml"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Load / save
// ─────────────────────────────────────────────────────────────────────────────

/// Load the effective configuration: file (or defaults), then environment
/// overrides, then validation.
pub fn load() -> Result<Config, SumoError> {
    let path = config_path();
    let mut cfg = match load_from(&path)? {
        Some(cfg) => {
            debug!(path = %path.display(), "config loaded");
            cfg
        }
        None => {
            debug!(path = %path.display(), "no config file; using defaults");
            Config::default()
        }
    };
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Parse the config at `path`.  Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, SumoError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        SumoError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| SumoError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `SUMO_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SUMO_WALL_THRESHOLD` | `arbiter.wall_distance_threshold` |
/// | `SUMO_PROXIMITY_AREA` | `arbiter.proximity_area_threshold` |
/// | `SUMO_TICK_MS` | `control.tick_period_ms` |
/// | `SUMO_SEED` | `seed` |
///
/// Values that do not parse are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = env_parse::<f32>("SUMO_WALL_THRESHOLD") {
        cfg.arbiter.wall_distance_threshold = v;
    }
    if let Some(v) = env_parse::<f32>("SUMO_PROXIMITY_AREA") {
        cfg.arbiter.proximity_area_threshold = v;
    }
    if let Some(v) = env_parse::<u64>("SUMO_TICK_MS") {
        cfg.control.tick_period_ms = v;
    }
    if let Some(v) = env_parse::<u64>("SUMO_SEED") {
        cfg.seed = Some(v);
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparsable override");
            None
        }
    }
}

/// Write `cfg` to `path`, creating the parent directory if necessary.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), SumoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| SumoError::Config(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| SumoError::Config(format!("failed to serialize config: {e}")))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| {
                SumoError::Config(format!("failed to write config at {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| {
        SumoError::Config(format!("failed to write config at {}: {e}", path.display()))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sumo_runtime::{CloseRangeManeuver, InvalidationPolicy};
    use sumo_types::Direction;

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.control.tick_period_ms, 20);
        assert_eq!(cfg.control.emission_rate_hz, 40.0);
        assert_eq!(cfg.control.max_consecutive_actuation_failures, 5);
        assert_eq!(cfg.arbiter.wall_distance_threshold, 0.25);
        assert_eq!(cfg.arbiter.proximity_area_threshold, 8000.0);
        assert_eq!(cfg.arbiter.boundary_scan_order, Direction::ALL.to_vec());
        assert!(cfg.seed.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(
            &dir,
            r#"
seed = 42

[control]
tick_period_ms = 10

[arbiter]
wall_distance_threshold = 0.3
boundary_scan_order = ["left", "right", "front", "back"]
invalidation_policy = "resume"
close_range_maneuver = "defensive"

[arbiter.strategies]
direct_speed = 0.7
"#,
        );
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.seed, Some(42));
        assert_eq!(cfg.control.tick_period_ms, 10);
        assert_eq!(cfg.control.emission_rate_hz, 40.0);
        assert_eq!(cfg.arbiter.wall_distance_threshold, 0.3);
        assert_eq!(cfg.arbiter.boundary_scan_order[0], Direction::Left);
        assert_eq!(cfg.arbiter.invalidation_policy, InvalidationPolicy::Resume);
        assert_eq!(cfg.arbiter.close_range_maneuver, CloseRangeManeuver::Defensive);
        assert_eq!(cfg.arbiter.strategies.direct_speed, 0.7);
        assert_eq!(cfg.arbiter.strategies.zigzag_speed, 0.4);
        assert_eq!(cfg.safety, SafetySection::default());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "[control\ntick_period_ms = ");
        assert!(matches!(load_from(&path), Err(SumoError::Config(_))));
    }

    #[test]
    fn unknown_direction_is_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "[arbiter]\nboundary_scan_order = [\"up\"]\n");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn incomplete_scan_order_fails_validation() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = write(&dir, "[arbiter]\nboundary_scan_order = [\"front\", \"back\"]\n");
        let cfg = load_from(&path).expect("parses").expect("some");
        assert!(matches!(cfg.validate(), Err(SumoError::Config(_))));
    }

    #[test]
    fn validation_rejects_non_positive_timing() {
        let mut cfg = Config::default();
        cfg.control.tick_period_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.control.emission_rate_hz = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.safety.max_angular_speed = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_emission_rate_above_sink_limit() {
        let mut cfg = Config::default();
        cfg.control.emission_rate_hz = 1.0e7;
        assert!(matches!(cfg.validate(), Err(SumoError::Config(_))));

        cfg.control.emission_rate_hz = 40.0;
        assert!(cfg.validate().is_ok());
        cfg.control.emission_rate_hz = 20.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn roundtrip_through_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.seed = Some(7);
        cfg.arbiter.boundary_scan_order.reverse();

        save_to(&cfg, &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        save_to(&Config::default(), &path).expect("save");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("absent.toml");
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn config_path_prefers_explicit_override() {
        let p = resolve_config_path(Some("/etc/sumo.toml".to_string()), "/home/robot");
        assert_eq!(p, PathBuf::from("/etc/sumo.toml"));

        let p = resolve_config_path(None, "/home/robot");
        assert_eq!(p, PathBuf::from("/home/robot/.sumo/config.toml"));

        let p = resolve_config_path(Some("  ".to_string()), "/home/robot");
        assert!(p.ends_with(".sumo/config.toml"));
    }

    // Each env test owns a distinct variable so parallel tests cannot race.

    #[test]
    fn env_override_wall_threshold() {
        // SAFETY: no other test sets SUMO_WALL_THRESHOLD.
        unsafe { std::env::set_var("SUMO_WALL_THRESHOLD", "0.4") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.arbiter.wall_distance_threshold, 0.4);
        unsafe { std::env::remove_var("SUMO_WALL_THRESHOLD") };
    }

    #[test]
    fn env_override_seed() {
        // SAFETY: no other test sets SUMO_SEED.
        unsafe { std::env::set_var("SUMO_SEED", "1234") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.seed, Some(1234));
        unsafe { std::env::remove_var("SUMO_SEED") };
    }

    #[test]
    fn env_override_ignores_unparsable_tick() {
        // SAFETY: no other test sets SUMO_TICK_MS.
        unsafe { std::env::set_var("SUMO_TICK_MS", "fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control.tick_period_ms, 20);
        unsafe { std::env::remove_var("SUMO_TICK_MS") };
    }

    #[test]
    fn loop_config_converts_millis() {
        let section = ControlSection {
            tick_period_ms: 15,
            stream_timeout_ms: 250,
            ..ControlSection::default()
        };
        let lc = section.loop_config();
        assert_eq!(lc.tick_period, Duration::from_millis(15));
        assert_eq!(lc.stream_timeout, Duration::from_millis(250));
        assert_eq!(lc.max_consecutive_actuation_failures, 5);
    }
}
