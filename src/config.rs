use std::time::Duration;

use serde::Deserialize;
use tracing::Level;

use crate::error::ConfigError;

const CONFIG_FILE: &str = "posture-watch";
const ENV_PREFIX: &str = "POSTURE_WATCH";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub backend: BackendSettings,
    pub camera: CameraSettings,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraSettings {
    /// A v4l2 device path, or `test-pattern` for the synthetic source.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub jpeg_quality: u8,
}

impl CameraSettings {
    /// Bytes in one rgb24 frame, or `None` when the size does not fit in memory.
    pub fn frame_len(&self) -> Option<usize> {
        let width = usize::try_from(self.width).ok()?;
        let height = usize::try_from(self.height).ok()?;
        width.checked_mul(height)?.checked_mul(3)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendSettings {
                base_url: "http://localhost:5000".to_string(),
                request_timeout_secs: 10,
            },
            camera: CameraSettings {
                device: "/dev/video0".to_string(),
                width: 640,
                height: 480,
                framerate: 15,
                jpeg_quality: 92,
            },
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then `posture-watch.toml` if present, then `POSTURE_WATCH__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let settings: Settings = config::Config::builder()
            .set_default("backend.base_url", defaults.backend.base_url)?
            .set_default(
                "backend.request_timeout_secs",
                defaults.backend.request_timeout_secs as i64,
            )?
            .set_default("camera.device", defaults.camera.device)?
            .set_default("camera.width", i64::from(defaults.camera.width))?
            .set_default("camera.height", i64::from(defaults.camera.height))?
            .set_default("camera.framerate", i64::from(defaults.camera.framerate))?
            .set_default("camera.jpeg_quality", i64::from(defaults.camera.jpeg_quality))?
            .set_default("log_level", defaults.log_level)?
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "backend.base_url",
                "must not be empty".to_string(),
            ));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "backend.request_timeout_secs",
                "must be greater than zero".to_string(),
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 || self.camera.frame_len().is_none() {
            return Err(ConfigError::Invalid(
                "camera",
                format!("{}x{} is not a usable frame size", self.camera.width, self.camera.height),
            ));
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(ConfigError::Invalid(
                "camera.jpeg_quality",
                format!("{} is outside 1..=100", self.camera.jpeg_quality),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    // Unknown levels fall back to INFO.
    pub fn log_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_empty_base_url() {
        let mut settings = Settings::default();
        settings.backend.base_url = "  ".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid("backend.base_url", _))
        ));
    }

    #[test]
    fn rejects_zero_request_timeout() {
        let mut settings = Settings::default();
        settings.backend.request_timeout_secs = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid("backend.request_timeout_secs", _))
        ));
    }

    #[test]
    fn rejects_frame_sizes_that_overflow() {
        let mut settings = Settings::default();
        settings.camera.width = u32::MAX;
        settings.camera.height = u32::MAX;
        assert!(settings.camera.frame_len().is_none());
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid("camera", _))));
    }

    #[test]
    fn frame_len_counts_three_bytes_per_pixel() {
        assert_eq!(Settings::default().camera.frame_len(), Some(640 * 480 * 3));
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let mut settings = Settings::default();
        settings.camera.jpeg_quality = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let mut settings = Settings::default();
        settings.log_level = "chatty".to_string();
        assert_eq!(settings.log_level(), Level::INFO);
        settings.log_level = "debug".to_string();
        assert_eq!(settings.log_level(), Level::DEBUG);
    }
}
