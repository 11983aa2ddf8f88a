//! Connection and speed configuration for the arm and gripper.
//!
//! Values are validated before any device interaction; an out-of-range
//! speed never reaches the serial port.

use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

/// Default serial device on the Raspberry Pi carrier board.
pub const PI_PORT: &str = "/dev/ttyAMA0";
pub const PI_BAUD: u32 = 1_000_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error while accessing configuration")]
    IoError(#[from] std::io::Error),
    #[error("error while parsing json")]
    JsonError(#[from] serde_json::Error),
    #[error("error while parsing yaml")]
    YamlError(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArmConfig {
    pub port: String,
    pub baud: u32,
    /// Motion speed percentage used for every move command
    #[serde(default = "default_arm_speed")]
    pub default_speed: u8,
}

fn default_arm_speed() -> u8 {
    20
}

impl Default for ArmConfig {
    fn default() -> ArmConfig {
        ArmConfig {
            port: PI_PORT.to_owned(),
            baud: PI_BAUD,
            default_speed: default_arm_speed(),
        }
    }
}

impl ArmConfig {
    /// Configuration packaged with the binary
    pub fn included() -> ArmConfig {
        let json = include_str!("../config/mantis.json");
        ArmConfig::parse_json(json).expect("packaged config must parse")
    }

    pub fn parse_json(text: &str) -> Result<ArmConfig> {
        let config: ArmConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse_yaml(text: &str) -> Result<ArmConfig> {
        let config: ArmConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_json(path: &str) -> Result<ArmConfig> {
        let text = fs::read_to_string(path)?;
        ArmConfig::parse_json(&text)
    }

    pub fn load_yaml(path: &str) -> Result<ArmConfig> {
        let text = fs::read_to_string(path)?;
        ArmConfig::parse_yaml(&text)
    }

    pub fn save_json(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_speed(self.default_speed)?;
        if self.baud == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "baud rate must be positive".to_owned(),
            ));
        }
        if self.port.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "port must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GripperConfig {
    /// Speed percentage for gripper open and close
    #[serde(default = "default_gripper_speed")]
    pub default_speed: u8,
}

fn default_gripper_speed() -> u8 {
    50
}

impl Default for GripperConfig {
    fn default() -> GripperConfig {
        GripperConfig {
            default_speed: default_gripper_speed(),
        }
    }
}

impl GripperConfig {
    pub fn validate(&self) -> Result<()> {
        validate_speed(self.default_speed)
    }
}

fn validate_speed(speed: u8) -> Result<()> {
    if speed == 0 || speed > 100 {
        return Err(ConfigError::InvalidConfiguration(format!(
            "speed {} outside 1-100",
            speed
        )));
    }
    Ok(())
}
