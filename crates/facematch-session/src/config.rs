use crate::session::SessionSettings;
use facematch_core::{QualityConfig, DEFAULT_MATCH_THRESHOLD};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite identity database.
    pub db_path: PathBuf,
    /// Euclidean distance threshold for a positive match.
    pub match_threshold: f32,
    /// Recognition results kept in the rolling history.
    pub history_limit: usize,
    /// Quality-gated samples averaged per registration.
    pub samples_per_enroll: usize,
    /// Interval between recognition passes on a live feed.
    pub recognition_interval: Duration,
    /// Capture quality thresholds, optionally read from a TOML file.
    pub quality: QualityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_data_dir().join("identities.db"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            history_limit: 10,
            samples_per_enroll: 3,
            recognition_interval: Duration::from_millis(1000),
            quality: QualityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let db_path = std::env::var("FACEMATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let quality = std::env::var("FACEMATCH_QUALITY_FILE")
            .ok()
            .and_then(|path| load_quality_file(Path::new(&path)))
            .unwrap_or(defaults.quality);

        Self {
            db_path,
            match_threshold: env_f32("FACEMATCH_MATCH_THRESHOLD", defaults.match_threshold),
            history_limit: env_usize("FACEMATCH_HISTORY_LIMIT", defaults.history_limit),
            samples_per_enroll: env_usize("FACEMATCH_SAMPLES_PER_ENROLL", defaults.samples_per_enroll),
            recognition_interval: Duration::from_millis(env_u64(
                "FACEMATCH_RECOGNITION_INTERVAL_MS",
                defaults.recognition_interval.as_millis() as u64,
            )),
            quality,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            match_threshold: self.match_threshold,
            history_limit: self.history_limit,
            samples_per_enroll: self.samples_per_enroll,
            quality: self.quality.clone(),
        }
    }
}

/// Parse a quality TOML file. Unreadable or malformed files are logged
/// and ignored so the defaults apply.
pub fn load_quality_file(path: &Path) -> Option<QualityConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read quality config; using defaults");
            return None;
        }
    };
    match toml::from_str::<QualityConfig>(&text) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "bad quality config; using defaults");
            None
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!((config.match_threshold - 0.6).abs() < 1e-6);
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.quality.min_overall_score, 60);
        assert!(config.db_path.ends_with("facematch/identities.db"));
    }

    #[test]
    fn test_session_settings_carry_over() {
        let config = Config {
            match_threshold: 0.45,
            samples_per_enroll: 5,
            ..Config::default()
        };
        let settings = config.session_settings();
        assert!((settings.match_threshold - 0.45).abs() < 1e-6);
        assert_eq!(settings.samples_per_enroll, 5);
    }

    #[test]
    fn test_load_quality_file() {
        let path = std::env::temp_dir().join(format!("facematch-quality-{}.toml", std::process::id()));
        std::fs::write(&path, "min_overall_score = 80\nmin_brightness = 40.0\n").unwrap();
        let config = load_quality_file(&path).unwrap();
        assert_eq!(config.min_overall_score, 80);
        assert!((config.min_brightness - 40.0).abs() < 1e-6);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_quality_file_malformed() {
        let path = std::env::temp_dir().join(format!("facematch-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "min_overall_score = \"high\"").unwrap();
        assert!(load_quality_file(&path).is_none());
        let _ = std::fs::remove_file(&path);
        assert!(load_quality_file(&path).is_none());
    }
}
