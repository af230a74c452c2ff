use rollcall_core::MatchPolicy;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration: optional TOML file, overridden by environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP listen address (default: 0.0.0.0:5000).
    pub bind_addr: SocketAddr,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Run the live capture loop at all.
    pub camera_enabled: bool,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Enrollment photos and their index.
    pub gallery_dir: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub match_threshold: f32,
    /// Distance at which confidence reaches zero.
    pub distance_scale: f32,
    /// Timeout in seconds for frame submission, enrollment and reload.
    pub request_timeout_secs: u64,
    /// Number of warmup frames to discard when the camera starts (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// JPEG quality for the live view.
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        let policy = MatchPolicy::default();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            camera_device: "/dev/video0".to_string(),
            camera_enabled: true,
            model_dir: rollcall_core::default_model_dir(),
            gallery_dir: rollcall_core::data_dir().join("known_faces"),
            match_threshold: policy.threshold,
            distance_scale: policy.distance_scale,
            request_timeout_secs: 10,
            warmup_frames: 4,
            jpeg_quality: 80,
        }
    }
}

impl Config {
    /// Load `ROLLCALL_CONFIG` (if set) then apply `ROLLCALL_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = match lookup("ROLLCALL_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(lookup);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_from(&lookup, "ROLLCALL_BIND_ADDR", &mut self.bind_addr);
        if let Some(device) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        if let Some(enabled) = lookup("ROLLCALL_CAMERA_ENABLED") {
            self.camera_enabled = !matches!(enabled.as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(dir) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("ROLLCALL_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(dir);
        }
        override_from(&lookup, "ROLLCALL_MATCH_THRESHOLD", &mut self.match_threshold);
        override_from(&lookup, "ROLLCALL_DISTANCE_SCALE", &mut self.distance_scale);
        override_from(&lookup, "ROLLCALL_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        override_from(&lookup, "ROLLCALL_WARMUP_FRAMES", &mut self.warmup_frames);
        override_from(&lookup, "ROLLCALL_JPEG_QUALITY", &mut self.jpeg_quality);
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            threshold: self.match_threshold,
            distance_scale: self.distance_scale,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Unparseable values keep the previous setting.
fn override_from<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable setting"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.camera_device, "/dev/video0");
        assert!(config.camera_enabled);
        assert!(config.gallery_dir.ends_with("rollcall/known_faces"));
        assert_eq!(config.gallery_dir.parent(), config.model_dir.parent());
        assert_eq!(config.match_threshold, 1.10);
        assert_eq!(config.distance_scale, 2.0);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.warmup_frames, 4);
        assert_eq!(config.jpeg_quality, 80);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("ROLLCALL_BIND_ADDR", "127.0.0.1:8080"),
            ("ROLLCALL_CAMERA_ENABLED", "0"),
            ("ROLLCALL_GALLERY_DIR", "/srv/faces"),
            ("ROLLCALL_MATCH_THRESHOLD", "0.9"),
            ("ROLLCALL_JPEG_QUALITY", "60"),
        ]));
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert!(!config.camera_enabled);
        assert_eq!(config.gallery_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.match_policy().threshold, 0.9);
        assert_eq!(config.jpeg_quality, 60);
    }

    #[test]
    fn test_bad_env_value_keeps_previous() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("ROLLCALL_WARMUP_FRAMES", "lots"),
            ("ROLLCALL_JPEG_QUALITY", "900"),
        ]));
        assert_eq!(config.warmup_frames, 4);
        assert_eq!(config.jpeg_quality, 80);
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(
            &path,
            "camera_device = \"/dev/video2\"\nmatch_threshold = 0.8\nrequest_timeout_secs = 3\n",
        )
        .unwrap();

        let mut config = Config::from_file(&path).unwrap();
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.match_threshold, 0.8);
        assert_eq!(config.request_timeout_secs, 3);
        assert_eq!(config.warmup_frames, 4);

        config.apply_env(env(&[("ROLLCALL_CAMERA_DEVICE", "/dev/video4")]));
        assert_eq!(config.camera_device, "/dev/video4");
        assert_eq!(config.match_threshold, 0.8);
    }

    #[test]
    fn test_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "no_such_key = 1\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));
    }
}
