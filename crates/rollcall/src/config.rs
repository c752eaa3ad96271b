use rollcall_core::MatchPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime configuration.
///
/// Layered: built-in defaults, then an optional TOML file, then `ROLLCALL_*`
/// environment variables, then command-line flags (applied by `main`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of `<roll>_<prn>_<first>_<last>_<division>.jpg` reference images.
    pub reference_dir: PathBuf,
    /// Shared attendance CSV.
    pub attendance_file: PathBuf,
    /// Classroom label written into every row.
    pub classroom: String,
    /// Directory containing det_10g.onnx and w600k_r50.onnx.
    pub model_dir: PathBuf,
    /// Cosine similarity a face must reach to count as a match.
    pub similarity_threshold: f32,
    /// Tie-break between several identities above the threshold.
    pub match_policy: MatchPolicy,
    /// Downscale factor applied before recognition (display stays full size).
    pub frame_scale: f32,
    /// Snapshot URL of the networked camera.
    pub camera_url: String,
    /// V4L2 device path of the local webcam.
    pub camera_device: String,
    pub http_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Run without a preview window.
    pub headless: bool,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference_dir: PathBuf::from("known_faces"),
            attendance_file: PathBuf::from("attendance.csv"),
            classroom: "A101".to_string(),
            model_dir: rollcall_core::default_model_dir(),
            similarity_threshold: 0.40,
            match_policy: MatchPolicy::First,
            frame_scale: 0.5,
            camera_url: "http://192.168.14.244/capture".to_string(),
            camera_device: "/dev/video0".to_string(),
            http_timeout_secs: 5,
            backoff_base_ms: 250,
            backoff_max_ms: 8000,
            headless: false,
            max_frames: None,
        }
    }
}

impl Config {
    /// Defaults, overlaid with `path` (if any) and then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `ROLLCALL_*` variables. Unparsable values are logged and ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("ROLLCALL_REFERENCE_DIR") {
            self.reference_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_ATTENDANCE_FILE") {
            self.attendance_file = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_CLASSROOM") {
            self.classroom = v;
        }
        if let Some(v) = var("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = var("ROLLCALL_CAMERA_URL") {
            self.camera_url = v;
        }
        if let Some(v) = var("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        env_parse(&var, "ROLLCALL_SIMILARITY_THRESHOLD", &mut self.similarity_threshold);
        env_parse(&var, "ROLLCALL_MATCH_POLICY", &mut self.match_policy);
        env_parse(&var, "ROLLCALL_FRAME_SCALE", &mut self.frame_scale);
        env_parse(&var, "ROLLCALL_HTTP_TIMEOUT_SECS", &mut self.http_timeout_secs);
        env_parse(&var, "ROLLCALL_BACKOFF_BASE_MS", &mut self.backoff_base_ms);
        env_parse(&var, "ROLLCALL_BACKOFF_MAX_MS", &mut self.backoff_max_ms);
        if let Some(v) = var("ROLLCALL_HEADLESS") {
            self.headless = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        let mut max_frames = 0u64;
        if env_parse(&var, "ROLLCALL_MAX_FRAMES", &mut max_frames) {
            self.max_frames = Some(max_frames);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::Invalid {
                key: "similarity_threshold",
                reason: format!("{} is outside [-1, 1]", self.similarity_threshold),
            });
        }
        if !(self.frame_scale > 0.0 && self.frame_scale <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "frame_scale",
                reason: format!("{} is outside (0, 1]", self.frame_scale),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "http_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_frames == Some(0) {
            return Err(ConfigError::Invalid {
                key: "max_frames",
                reason: "must be at least 1 when set".into(),
            });
        }
        if self.classroom.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "classroom",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Parse `key` into `slot` if set and valid. Returns whether `slot` changed.
fn env_parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) -> bool {
    let Some(raw) = var(key) else {
        return false;
    };
    match raw.trim().parse() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.classroom, "A101");
        assert_eq!(config.match_policy, MatchPolicy::First);
        assert_eq!(config.max_frames, None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("ROLLCALL_CLASSROOM", "B202"),
            ("ROLLCALL_SIMILARITY_THRESHOLD", "0.55"),
            ("ROLLCALL_MATCH_POLICY", "best"),
            ("ROLLCALL_HEADLESS", "1"),
            ("ROLLCALL_MAX_FRAMES", "30"),
            ("ROLLCALL_ATTENDANCE_FILE", "/srv/attendance.csv"),
        ]));
        assert_eq!(config.classroom, "B202");
        assert!((config.similarity_threshold - 0.55).abs() < 1e-6);
        assert_eq!(config.match_policy, MatchPolicy::Best);
        assert!(config.headless);
        assert_eq!(config.max_frames, Some(30));
        assert_eq!(config.attendance_file, PathBuf::from("/srv/attendance.csv"));
    }

    #[test]
    fn test_bad_env_value_keeps_previous() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("ROLLCALL_FRAME_SCALE", "half"),
            ("ROLLCALL_MAX_FRAMES", "-3"),
        ]));
        assert_eq!(config.frame_scale, 0.5);
        assert_eq!(config.max_frames, None);
    }

    #[test]
    fn test_toml_file_with_partial_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(
            &path,
            "classroom = \"Lab 2\"\nmatch_policy = \"best\"\nmax_frames = 100\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.classroom, "Lab 2");
        assert_eq!(config.match_policy, MatchPolicy::Best);
        assert_eq!(config.max_frames, Some(100));
        assert_eq!(config.frame_scale, 0.5);
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "clasroom = \"typo\"\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = Config {
            frame_scale: 0.0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "frame_scale", .. })
        ));

        let config = Config {
            similarity_threshold: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_frames() {
        let config = Config {
            max_frames: Some(0),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "max_frames", .. })
        ));

        let config = Config {
            max_frames: Some(1),
            ..Config::default()
        };
        config.validate().unwrap();
    }
}
