//! Configuration management for Joybridge
//!
//! Handles loading, validating and saving the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::input::joystick::{DeviceId, GilrsSettings, VirtualDeviceSpec};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_scan_ms")]
    pub scan_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Devices registered at startup
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    /// Enumeration of the virtual backend
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_devices: Vec<VirtualDeviceSpec>,
}

/// Native subsystem implementation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Gilrs,
    Virtual,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Gilrs => write!(f, "gilrs"),
            Backend::Virtual => write!(f, "virtual"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Also write a daily rolling log file into the logs directory
    #[serde(default)]
    pub file_output: bool,
}

/// One device to register at startup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub id: DeviceId,
    /// Owner name of the joystick object
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            scan_ms: default_scan_ms(),
            poll_ms: default_poll_ms(),
            report_interval_ms: default_report_interval_ms(),
            logging: LoggingConfig::default(),
            devices: Vec::new(),
            virtual_devices: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path).await
    }

    /// Save configuration to file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.report_interval_ms == 0 {
            anyhow::bail!("report_interval_ms must be greater than 0");
        }
        if self.backend == Backend::Gilrs && self.poll_ms == 0 {
            anyhow::bail!("poll_ms must be greater than 0");
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for (idx, device) in self.devices.iter().enumerate() {
            if device.name.trim().is_empty() {
                anyhow::bail!("Device {} name cannot be empty", idx);
            }
            if !ids.insert(device.id) {
                anyhow::bail!("Device id {} is listed more than once", device.id.0);
            }
            if !names.insert(device.name.as_str()) {
                anyhow::bail!("Device name '{}' is used more than once", device.name);
            }
            if self.backend == Backend::Virtual && device.id.index() >= self.virtual_devices.len() {
                anyhow::bail!(
                    "Device '{}' uses id {} but only {} virtual device(s) are defined",
                    device.name,
                    device.id.0,
                    self.virtual_devices.len()
                );
            }
        }

        for (idx, spec) in self.virtual_devices.iter().enumerate() {
            if spec.name.trim().is_empty() {
                anyhow::bail!("Virtual device {} name cannot be empty", idx);
            }
        }

        Ok(())
    }

    /// Replace the startup device list with ids given on the command line
    pub fn override_devices(&mut self, ids: &[u32]) {
        self.devices = ids
            .iter()
            .map(|&id| DeviceConfig {
                id: DeviceId(id),
                name: format!("joystick{}", id),
            })
            .collect();
    }

    pub fn gilrs_settings(&self) -> GilrsSettings {
        GilrsSettings {
            scan: Duration::from_millis(self.scan_ms),
            poll: Duration::from_millis(self.poll_ms),
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}

// Default value functions
fn default_scan_ms() -> u64 { 1500 }
fn default_poll_ms() -> u64 { 50 }
fn default_report_interval_ms() -> u64 { 250 }
