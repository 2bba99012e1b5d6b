//! Engine settings – reads/writes `~/.tread/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tread_perception::{CalibrationConfig, CameraCalibration, WarpModel};
use tread_runtime::{EngineConfig, ReactionConfig};

/// Persisted settings stored in `~/.tread/config.toml`.
///
/// Every field has a default, so a partial file (or none) is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Basestation tick period.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Length of the simulated run; 0 runs until Ctrl-C.
    #[serde(default = "default_sim_ticks")]
    pub sim_ticks: u64,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub camera: CameraCalibration,

    /// Trigger → behavior wiring. Empty uses the stock reactions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<ReactionConfig>,
}

fn default_tick_interval_ms() -> u64 {
    60
}
fn default_sim_ticks() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            sim_ticks: default_sim_ticks(),
            calibration: CalibrationConfig::default(),
            camera: CameraCalibration::default(),
            reactions: Vec::new(),
        }
    }
}

impl Config {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            calibration: self.calibration.clone(),
            camera: self.camera.clone(),
            reactions: self.reactions.clone(),
        }
    }
}

/// Return the path to `~/.tread/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tread").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.calibration
        .validate()
        .map_err(|e| format!("Invalid calibration in {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `TREAD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TREAD_TICK_INTERVAL_MS` | `tick_interval_ms` |
/// | `TREAD_SIM_TICKS` | `sim_ticks` |
/// | `TREAD_NUM_DIVISIONS` | `calibration.num_divisions` |
/// | `TREAD_WARP_MODEL` | `calibration.warp_model` (`projective` / `pixel_shift`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(ms) = env_parse::<u64>("TREAD_TICK_INTERVAL_MS") {
        cfg.tick_interval_ms = ms;
    }
    if let Some(ticks) = env_parse::<u64>("TREAD_SIM_TICKS") {
        cfg.sim_ticks = ticks;
    }
    if let Some(n) = env_parse::<usize>("TREAD_NUM_DIVISIONS") {
        cfg.calibration.num_divisions = n;
    }
    if let Ok(v) = std::env::var("TREAD_WARP_MODEL") {
        match v.trim() {
            "projective" => cfg.calibration.warp_model = WarpModel::Projective,
            "pixel_shift" => cfg.calibration.warp_model = WarpModel::PixelShift,
            _ => {}
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.tread/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
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
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tread_types::ReactionTrigger;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.tick_interval_ms, 60);
        assert_eq!(loaded.calibration.num_divisions, 10);
        assert_eq!(loaded.camera.width, 320);
        assert!(loaded.reactions.is_empty());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
sim_ticks = 10

[calibration]
warp_model = "pixel_shift"

[[reactions]]
trigger = "CliffDetected"
behavior = "ReactToCliff"
"#,
        )
        .unwrap();

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.sim_ticks, 10);
        assert_eq!(cfg.tick_interval_ms, 60);
        assert_eq!(cfg.calibration.warp_model, WarpModel::PixelShift);
        assert_eq!(cfg.calibration.image_timestamp_offset_ms, 55);
        assert_eq!(cfg.reactions.len(), 1);
        assert_eq!(cfg.reactions[0].trigger, ReactionTrigger::CliffDetected);
    }

    #[test]
    fn invalid_calibration_is_reported() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[calibration]\nnum_divisions = 0\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Invalid calibration"), "{err}");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "tick_interval_ms = \"fast\"").unwrap();
        assert!(load_from(&path).unwrap_err().starts_with("Failed to parse config"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_tread_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".tread"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_tick_interval() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("TREAD_TICK_INTERVAL_MS", "33") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tick_interval_ms, 33);
        unsafe { std::env::remove_var("TREAD_TICK_INTERVAL_MS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_values() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe {
            std::env::set_var("TREAD_NUM_DIVISIONS", "many");
            std::env::set_var("TREAD_WARP_MODEL", "affine");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.calibration, CalibrationConfig::default());
        unsafe {
            std::env::remove_var("TREAD_NUM_DIVISIONS");
            std::env::remove_var("TREAD_WARP_MODEL");
        }
    }

    #[test]
    fn engine_config_carries_settings() {
        let mut cfg = Config::default();
        cfg.calibration.num_divisions = 4;
        let engine = cfg.engine_config();
        assert_eq!(engine.calibration.num_divisions, 4);
        assert_eq!(engine.camera, CameraCalibration::default());
    }
}
