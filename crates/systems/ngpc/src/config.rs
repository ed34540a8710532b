//! Core options
//!
//! Hosts either hand over a JSON document or the key/value pairs their
//! option system stores. Unknown keys are logged and ignored so that an
//! older core accepts a newer host's option set.

use emu_core::frameskip::{FrameSkipMode, SkipPolicy, DEFAULT_SKIP_THRESHOLD};
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest accepted darkness filter level (percent)
pub const MAX_DARK_FILTER: u8 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value {value:?} for option {key}")]
    InvalidValue { key: String, value: String },

    #[error("option {key} is out of range ({value})")]
    OutOfRange { key: &'static str, value: u32 },
}

/// System language reported to games through the BIOS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Japanese,
}

impl Language {
    /// Value the BIOS stores at 0x6F87
    pub fn bios_code(self) -> u8 {
        match self {
            Language::Japanese => 0,
            Language::English => 1,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "english" | "en" => Some(Language::English),
            "japanese" | "ja" | "jp" => Some(Language::Japanese),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub language: Language,
    /// Percentage the finished frame is darkened by
    pub dark_filter_level: u8,
    pub frameskip: FrameSkipMode,
    /// Buffer occupancy (percent) under which manual frame skip kicks in
    pub frameskip_threshold: u8,
    pub sample_rate: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            language: Language::English,
            dark_filter_level: 0,
            frameskip: FrameSkipMode::Off,
            frameskip_threshold: DEFAULT_SKIP_THRESHOLD,
            sample_rate: 44_100,
        }
    }
}

impl CoreConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from host option pairs such as `("ngpc_language", "japanese")`.
    pub fn from_options<'a, I>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in options {
            let invalid = || ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            };
            match key {
                "ngpc_language" => config.language = Language::from_str(value).ok_or_else(invalid)?,
                "ngpc_dark_filter_level" => config.dark_filter_level = value.parse().map_err(|_| invalid())?,
                "ngpc_frameskip" => config.frameskip = FrameSkipMode::from_str(value).ok_or_else(invalid)?,
                "ngpc_frameskip_threshold" => {
                    config.frameskip_threshold = value.parse().map_err(|_| invalid())?
                }
                "ngpc_sample_rate" => config.sample_rate = value.parse().map_err(|_| invalid())?,
                _ => log(LogCategory::Stubs, LogLevel::Info, || {
                    format!("ignoring unknown option {key}")
                }),
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dark_filter_level > MAX_DARK_FILTER {
            return Err(ConfigError::OutOfRange {
                key: "dark_filter_level",
                value: self.dark_filter_level as u32,
            });
        }
        if self.frameskip_threshold > 100 {
            return Err(ConfigError::OutOfRange {
                key: "frameskip_threshold",
                value: self.frameskip_threshold as u32,
            });
        }
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(ConfigError::OutOfRange {
                key: "sample_rate",
                value: self.sample_rate,
            });
        }
        Ok(())
    }

    pub fn skip_policy(&self) -> SkipPolicy {
        SkipPolicy {
            mode: self.frameskip,
            threshold: self.frameskip_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.language, Language::English);
        assert_eq!(config.language.bios_code(), 1);
        assert_eq!(config.skip_policy(), SkipPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = CoreConfig::from_json(r#"{"language": "japanese", "frameskip": "auto"}"#).unwrap();
        assert_eq!(config.language, Language::Japanese);
        assert_eq!(config.frameskip, FrameSkipMode::Auto);
        assert_eq!(config.sample_rate, 44_100);
    }

    #[test]
    fn test_options() {
        let config = CoreConfig::from_options([
            ("ngpc_language", "Japanese"),
            ("ngpc_dark_filter_level", "25"),
            ("ngpc_frameskip", "manual"),
            ("ngpc_frameskip_threshold", "50"),
            ("some_future_option", "x"),
        ])
        .unwrap();
        assert_eq!(config.language.bios_code(), 0);
        assert_eq!(config.dark_filter_level, 25);
        assert_eq!(config.skip_policy().mode, FrameSkipMode::Manual);
        assert_eq!(config.skip_policy().threshold, 50);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            CoreConfig::from_options([("ngpc_language", "klingon")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            CoreConfig::from_options([("ngpc_dark_filter_level", "150")]),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(CoreConfig::from_json("{"), Err(ConfigError::Json(_))));
    }
}
