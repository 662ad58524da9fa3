//! Renderer configuration.
//!
//! Configuration is read from a TOML file. Every field has a default, so an
//! empty file (or no file at all, via [`RendererConfig::load_or_default`])
//! yields a working setup: an 800x600 window cleared to a dark red under
//! FIFO presentation with two swapchain images requested.

use ash::vk;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    FileReadError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    pub window: WindowConfig,
    pub swapchain: SwapchainConfig,
    /// RGBA clear color written at the start of every render pass.
    pub clear_color: [f32; 4],
    /// Enables `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
    /// Stop after this many frames; `None` runs until the window closes.
    pub frame_limit: Option<u64>,
    /// Without shaders the loop only clears; with them it also draws.
    pub shaders: Option<ShaderPaths>,
    pub logging: LoggingConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            swapchain: SwapchainConfig::default(),
            clear_color: [0.2, 0.1, 0.1, 1.0],
            validation: cfg!(debug_assertions),
            frame_limit: None,
            shaders: None,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "ren".to_string(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwapchainConfig {
    /// Lower bound requested from the driver. The driver may hand back more.
    pub min_image_count: u32,
    pub present_mode: PresentMode,
}

impl Default for SwapchainConfig {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            present_mode: PresentMode::Fifo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    #[default]
    Fifo,
    FifoRelaxed,
    Mailbox,
    Immediate,
}

impl From<PresentMode> for vk::PresentModeKHR {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of "trace", "debug", "info", "warn", "error".
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl RendererConfig {
    /// Parses and validates TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RendererConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`. A missing file is an error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Loads configuration from `path`, falling back to defaults when no path
    /// is given or the file does not exist. Parse errors still propagate.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        match Self::load_from_path(path) {
            Ok(config) => Ok(config),
            Err(ConfigError::FileNotFound(missing)) => {
                tracing::warn!("Configuration file {:?} not found, using defaults.", missing);
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.swapchain.min_image_count == 0 {
            return Err(ConfigError::Invalid(
                "swapchain.min_image_count must be at least 1".to_string(),
            ));
        }
        if let Some(c) = self.clear_color.iter().find(|c| !(0.0..=1.0).contains(*c)) {
            return Err(ConfigError::Invalid(format!(
                "clear_color components must lie in [0, 1], got {}",
                c
            )));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level: {}",
                self.logging.level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.swapchain.min_image_count, 2);
        assert_eq!(config.swapchain.present_mode, PresentMode::Fifo);
        assert_eq!(config.clear_color, [0.2, 0.1, 0.1, 1.0]);
    }

    #[test]
    fn parses_full_document() {
        let config = RendererConfig::from_toml_str(
            r#"
            clear_color = [0.0, 0.5, 1.0, 1.0]
            validation = false
            frame_limit = 120

            [window]
            title = "triangle"
            width = 1024
            height = 768

            [swapchain]
            min_image_count = 3
            present_mode = "mailbox"

            [shaders]
            vertex = "shaders/triangle.vert.spv"
            fragment = "shaders/triangle.frag.spv"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.title, "triangle");
        assert_eq!(config.swapchain.min_image_count, 3);
        assert_eq!(config.swapchain.present_mode, PresentMode::Mailbox);
        assert_eq!(config.frame_limit, Some(120));
        assert_eq!(
            config.shaders,
            Some(ShaderPaths {
                vertex: PathBuf::from("shaders/triangle.vert.spv"),
                fragment: PathBuf::from("shaders/triangle.frag.spv"),
            })
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            RendererConfig::from_toml_str("[window]\nwidth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("[swapchain]\nmin_image_count = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("clear_color = [1.5, 0.0, 0.0, 1.0]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("[logging]\nlevel = \"loud\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RendererConfig::from_toml_str("unknown_key = 1"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("ren.toml");

        assert!(matches!(
            RendererConfig::load_from_path(&missing),
            Err(ConfigError::FileNotFound(_))
        ));
        assert_eq!(
            RendererConfig::load_or_default(Some(&missing)).unwrap(),
            RendererConfig::default()
        );
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window]\ntitle = \"from-file\"").unwrap();

        let config = RendererConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.window.title, "from-file");
        assert_eq!(config.window.width, 800);
    }

    #[test]
    fn present_mode_maps_to_vulkan() {
        assert_eq!(vk::PresentModeKHR::from(PresentMode::Fifo), vk::PresentModeKHR::FIFO);
        assert_eq!(
            vk::PresentModeKHR::from(PresentMode::Immediate),
            vk::PresentModeKHR::IMMEDIATE
        );
    }
}
