use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runner configuration: defaults, then an optional TOML file, then
/// `PRESENCE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the template store and attendance log.
    pub data_dir: PathBuf,
    /// Template store JSON (default: `<data_dir>/face_db.json`).
    pub templates_path: Option<PathBuf>,
    /// Attendance log, JSON lines (default: `<data_dir>/attendance.jsonl`).
    pub attendance_path: Option<PathBuf>,
    /// Side length of the square face patch fed to the descriptor.
    pub patch_size: u32,
    /// Samples averaged per enrollment.
    pub target_count: usize,
    /// Cosine similarity needed for a positive identification.
    pub match_threshold: f32,
    /// Minimum seconds between two attendance events for one identity.
    pub cooldown_secs: f64,
    /// Process every Nth frame.
    pub frame_stride: u32,
    /// Histogram-equalize each frame before cropping. On by default so
    /// descriptors match templates imported from `face_db.json` files.
    pub equalize: bool,
    /// Fraction of near-black pixels above which a frame is skipped.
    pub dark_threshold_pct: f32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("presence");

        Self {
            data_dir,
            templates_path: None,
            attendance_path: None,
            patch_size: presence_core::DEFAULT_PATCH_SIZE,
            target_count: 20,
            match_threshold: presence_core::DEFAULT_MATCH_THRESHOLD,
            cooldown_secs: presence_core::DEFAULT_COOLDOWN.as_secs_f64(),
            frame_stride: 1,
            equalize: true,
            dark_threshold_pct: 0.95,
        }
    }
}

impl Config {
    /// Load from an optional TOML file plus the process environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text)?
            }
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `PRESENCE_*` overrides from `lookup`. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("PRESENCE_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("PRESENCE_TEMPLATES_PATH") {
            self.templates_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PRESENCE_ATTENDANCE_PATH") {
            self.attendance_path = Some(PathBuf::from(v));
        }
        override_parsed(&lookup, "PRESENCE_PATCH_SIZE", &mut self.patch_size);
        override_parsed(&lookup, "PRESENCE_TARGET_COUNT", &mut self.target_count);
        override_parsed(&lookup, "PRESENCE_MATCH_THRESHOLD", &mut self.match_threshold);
        override_parsed(&lookup, "PRESENCE_COOLDOWN_SECS", &mut self.cooldown_secs);
        override_parsed(&lookup, "PRESENCE_FRAME_STRIDE", &mut self.frame_stride);
        override_parsed(&lookup, "PRESENCE_DARK_THRESHOLD_PCT", &mut self.dark_threshold_pct);
        if let Some(v) = lookup("PRESENCE_EQUALIZE") {
            self.equalize = v != "0" && !v.eq_ignore_ascii_case("false");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.patch_size < 3 {
            return Err(invalid(
                "patch_size",
                format!("must be at least 3, got {}", self.patch_size),
            ));
        }
        if self.target_count < 1 {
            return Err(invalid("target_count", "must be at least 1".into()));
        }
        if !self.match_threshold.is_finite() {
            return Err(invalid("match_threshold", "must be a finite number".into()));
        }
        if Duration::try_from_secs_f64(self.cooldown_secs).is_err() {
            return Err(invalid(
                "cooldown_secs",
                format!("must be a non-negative number, got {}", self.cooldown_secs),
            ));
        }
        if self.frame_stride < 1 {
            return Err(invalid("frame_stride", "must be at least 1".into()));
        }
        Ok(())
    }

    /// Cooldown as a `Duration`; values `validate` would reject saturate.
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_secs).unwrap_or(Duration::MAX)
    }

    pub fn templates_path(&self) -> PathBuf {
        self.templates_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("face_db.json"))
    }

    pub fn attendance_path(&self) -> PathBuf {
        self.attendance_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("attendance.jsonl"))
    }
}

fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { key, reason }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(v) = lookup(key) {
        match v.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(key, value = %v, "ignoring unparseable override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.patch_size, 100);
        assert_eq!(c.match_threshold, 0.9);
        assert_eq!(c.cooldown(), Duration::from_secs(10));
        assert!(c.equalize);
        assert!(c.validate().is_ok());
        assert!(c.templates_path().ends_with("presence/face_db.json"));
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presence.toml");
        std::fs::write(
            &path,
            "data_dir = \"/srv/presence\"\nmatch_threshold = 0.85\ncooldown_secs = 2.5\n",
        )
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let c: Config = toml::from_str(&text).unwrap();
        assert_eq!(c.match_threshold, 0.85);
        assert_eq!(c.cooldown(), Duration::from_millis(2500));
        assert_eq!(c.target_count, 20);
        assert_eq!(c.attendance_path(), PathBuf::from("/srv/presence/attendance.jsonl"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<Config>("threshhold = 0.5").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut c = Config::default();
        c.apply_overrides(lookup(&[
            ("PRESENCE_TARGET_COUNT", "5"),
            ("PRESENCE_EQUALIZE", "false"),
            ("PRESENCE_TEMPLATES_PATH", "/tmp/db.json"),
            ("PRESENCE_FRAME_STRIDE", "nope"),
        ]));
        assert_eq!(c.target_count, 5);
        assert!(!c.equalize);
        assert_eq!(c.templates_path(), PathBuf::from("/tmp/db.json"));
        assert_eq!(c.frame_stride, 1);
    }

    #[test]
    fn test_validation() {
        let mut c = Config::default();
        c.target_count = 0;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { key: "target_count", .. })
        ));

        let mut c = Config::default();
        c.cooldown_secs = -1.0;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.patch_size = 2;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.cooldown_secs = f64::NAN;
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.cooldown_secs = 0.0;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_cooldown_beyond_duration_range_rejected() {
        let mut c = Config::default();
        c.apply_overrides(lookup(&[("PRESENCE_COOLDOWN_SECS", "1e20")]));
        assert_eq!(c.cooldown_secs, 1e20);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { key: "cooldown_secs", .. })
        ));
        assert_eq!(c.cooldown(), Duration::MAX);
    }
}
