//! Code for the configuration of the application.

use std::{net::Ipv4Addr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The configuration of the application.
#[derive(Default, Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Toolpath processing settings.
    pub pipeline: PipelineConfig,

    /// Broadcast transport settings.
    pub transport: TransportConfig,

    /// Frame header bits for the two laser channels.
    pub channels: ChannelConfig,

    /// Pause for operator confirmation after every layer but the last.
    pub confirm_layers: bool,

    /// Where per-layer artifacts are written. When unset, each job writes
    /// into a fresh directory under the system temp dir.
    pub artifact_dir: Option<PathBuf>,
}

/// Toolpath processing settings.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Resampling step distance, in millimeters.
    pub resolution: f64,

    /// Compression of the galvo swing toward center.
    pub scale: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resolution: crate::resample::DEFAULT_RESOLUTION,
            scale: crate::galvo::DEFAULT_SCALE,
        }
    }
}

/// Broadcast transport settings.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// UDP port the scan card listens on.
    pub port: u16,

    /// Pause between frames, in milliseconds.
    pub pacing_ms: u64,

    /// Send to this address instead of the discovered broadcast address.
    pub target: Option<Ipv4Addr>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: scanproto::DEFAULT_PORT,
            pacing_ms: scanproto::DEFAULT_PACING.as_millis() as u64,
            target: None,
        }
    }
}

impl TransportConfig {
    /// The inter-frame pause as a duration.
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Frame header bits for the two laser channels.
#[derive(Default, Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Header for laser channel A, 11 bits.
    pub header_a: u16,

    /// Header for laser channel B, 11 bits.
    pub header_b: u16,
}

impl Config {
    /// Parse the configuration from a file on disk, falling back to the
    /// defaults when the file does not exist.
    pub fn load(path: &str) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read config file {}", path)),
        }
    }

    /// Parse the configuration.
    pub fn from_str(config: &str) -> Result<Self> {
        let config: Config = toml::from_str(config)?;
        Ok(config)
    }

    /// Check that the settings can drive a job before one starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.pipeline.resolution.is_finite() && self.pipeline.resolution > 0.0) {
            anyhow::bail!(
                "pipeline.resolution must be a positive distance, got {}",
                self.pipeline.resolution
            );
        }
        if !(self.pipeline.scale.is_finite() && self.pipeline.scale > 0.0) {
            anyhow::bail!("pipeline.scale must be positive, got {}", self.pipeline.scale);
        }
        for (name, header) in [("a", self.channels.header_a), ("b", self.channels.header_b)] {
            if header > scanproto::MAX_HEADER {
                anyhow::bail!("channels.header_{} {:#x} does not fit in 11 bits", name, header);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_str_empty_uses_defaults() {
        let config = Config::from_str("").unwrap();

        assert_eq!(config.pipeline.resolution, 0.3);
        assert_eq!(config.pipeline.scale, 2.0);
        assert_eq!(config.transport.port, 5005);
        assert_eq!(config.transport.pacing(), Duration::from_millis(20));
        assert_eq!(config.transport.target, None);
        assert_eq!(config.channels.header_a, 0);
        assert_eq!(config.channels.header_b, 0);
        assert!(!config.confirm_layers);
        assert_eq!(config.artifact_dir, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_from_str_full() {
        let config = Config::from_str(
            r#"
confirm_layers = true
artifact_dir = "/var/lib/scancast/layers"

[pipeline]
resolution = 0.5
scale = 1.0

[transport]
port = 6000
pacing_ms = 5
target = "192.168.1.255"

[channels]
header_a = 1
header_b = 2
"#,
        )
        .unwrap();

        assert!(config.confirm_layers);
        assert_eq!(
            config.artifact_dir,
            Some(PathBuf::from("/var/lib/scancast/layers"))
        );
        assert_eq!(config.pipeline.resolution, 0.5);
        assert_eq!(config.pipeline.scale, 1.0);
        assert_eq!(config.transport.port, 6000);
        assert_eq!(config.transport.pacing(), Duration::from_millis(5));
        assert_eq!(config.transport.target, Some(Ipv4Addr::new(192, 168, 1, 255)));
        assert_eq!(config.channels.header_a, 1);
        assert_eq!(config.channels.header_b, 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_from_str_partial_override() {
        let config = Config::from_str(
            r#"
[pipeline]
resolution = 1.5
"#,
        )
        .unwrap();

        assert_eq!(config.pipeline.resolution, 1.5);
        assert_eq!(config.pipeline.scale, 2.0);
        assert_eq!(config.transport.port, 5005);
    }

    #[test]
    fn test_config_validate_rejects_zero_resolution() {
        let config = Config::from_str("[pipeline]\nresolution = 0.0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_rejects_negative_scale() {
        let config = Config::from_str("[pipeline]\nscale = -2.0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_rejects_oversized_headers() {
        let config = Config::from_str("[channels]\nheader_a = 2048").unwrap();
        assert!(config.validate().is_err());
    }
}
