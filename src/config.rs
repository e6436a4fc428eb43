use crate::collectors::ina219::{Calibration, Gain};
use crate::cycle::CycleSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default = "default_i2c_device")]
    pub i2c_device: String,
    #[serde(default)]
    pub ups: UpsConfig,
    #[serde(default)]
    pub power_monitors: PowerMonitorsConfig,
    #[serde(default)]
    pub display: ScreenConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CycleConfig {
    #[serde(default = "default_tick_interval", with = "humantime_duration")]
    pub tick_interval: Duration,
    #[serde(default = "default_page_switch_threshold")]
    pub page_switch_threshold: u32,
    #[serde(default = "default_cycle_length")]
    pub cycle_length: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_temperature_sensor")]
    pub temperature_sensor: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpsConfig {
    #[serde(default = "default_ups_address")]
    pub address: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PowerMonitorsConfig {
    #[serde(default = "default_host_monitor")]
    pub host: MonitorConfig,
    #[serde(default = "default_battery_monitor")]
    pub battery: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    pub address: u8,
    pub shunt_ohms: f64,
    #[serde(default = "default_gain_mv")]
    pub gain_mv: u16,
    #[serde(default)]
    pub max_expected_amps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    Ssd1306,
    Log,
}

impl FromStr for DisplayBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssd1306" => Ok(DisplayBackend::Ssd1306),
            "log" => Ok(DisplayBackend::Log),
            other => Err(format!("unknown display backend '{other}' (expected ssd1306 or log)")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScreenConfig {
    #[serde(default = "default_display_backend")]
    pub backend: DisplayBackend,
    #[serde(default = "default_display_address")]
    pub address: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cycle: CycleConfig::default(),
            host: HostConfig::default(),
            i2c_device: default_i2c_device(),
            ups: UpsConfig::default(),
            power_monitors: PowerMonitorsConfig::default(),
            display: ScreenConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            page_switch_threshold: default_page_switch_threshold(),
            cycle_length: default_cycle_length(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            temperature_sensor: default_temperature_sensor(),
        }
    }
}

impl Default for UpsConfig {
    fn default() -> Self {
        Self {
            address: default_ups_address(),
        }
    }
}

impl Default for PowerMonitorsConfig {
    fn default() -> Self {
        Self {
            host: default_host_monitor(),
            battery: default_battery_monitor(),
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            backend: default_display_backend(),
            address: default_display_address(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            listen: default_listen(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_cycle(&self.cycle)?;

        if self.host.interface.trim().is_empty() {
            return Err(ConfigError::Validation(
                "host.interface must not be empty".to_string(),
            ));
        }
        if self.host.temperature_sensor.trim().is_empty() {
            return Err(ConfigError::Validation(
                "host.temperature_sensor must not be empty".to_string(),
            ));
        }
        if self.i2c_device.trim().is_empty() {
            return Err(ConfigError::Validation(
                "i2c_device must not be empty".to_string(),
            ));
        }

        validate_address("ups.address", self.ups.address)?;
        validate_address("display.address", self.display.address)?;
        validate_monitor("power_monitors.host", &self.power_monitors.host)?;
        validate_monitor("power_monitors.battery", &self.power_monitors.battery)?;

        let mut addresses = vec![
            self.ups.address,
            self.power_monitors.host.address,
            self.power_monitors.battery.address,
        ];
        if self.display.backend == DisplayBackend::Ssd1306 {
            addresses.push(self.display.address);
        }
        let count = addresses.len();
        addresses.sort_unstable();
        addresses.dedup();
        if addresses.len() != count {
            return Err(ConfigError::Validation(
                "I2C addresses of ups, power monitors and display must be distinct".to_string(),
            ));
        }

        if self.http.enabled && SocketAddr::from_str(&self.http.listen).is_err() {
            return Err(ConfigError::Validation(
                "http.listen must be a valid host:port address".to_string(),
            ));
        }

        Ok(())
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            tick_interval: self.cycle.tick_interval,
            page_switch_threshold: self.cycle.page_switch_threshold,
            cycle_length: self.cycle.cycle_length,
        }
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

impl MonitorConfig {
    pub fn gain(&self) -> Option<Gain> {
        Gain::from_millivolts(self.gain_mv)
    }

    pub fn calibration(&self) -> Option<Calibration> {
        Calibration::compute(self.shunt_ohms, self.gain()?, self.max_expected_amps)
    }
}

fn validate_cycle(cfg: &CycleConfig) -> Result<(), ConfigError> {
    if cfg.tick_interval < Duration::from_millis(10) {
        return Err(ConfigError::Validation(
            "cycle.tick_interval must be >= 10ms".to_string(),
        ));
    }
    if cfg.cycle_length < 1 {
        return Err(ConfigError::Validation(
            "cycle.cycle_length must be >= 1".to_string(),
        ));
    }
    if cfg.page_switch_threshold < 1 || cfg.page_switch_threshold > cfg.cycle_length {
        return Err(ConfigError::Validation(format!(
            "cycle.page_switch_threshold must be in 1..={}",
            cfg.cycle_length
        )));
    }
    Ok(())
}

fn validate_address(field: &str, address: u8) -> Result<(), ConfigError> {
    // 7-bit addresses outside the reserved ranges
    if !(0x08..=0x77).contains(&address) {
        return Err(ConfigError::Validation(format!(
            "{field} 0x{address:02x} is not a valid 7-bit I2C address"
        )));
    }
    Ok(())
}

fn validate_monitor(field: &str, cfg: &MonitorConfig) -> Result<(), ConfigError> {
    validate_address(&format!("{field}.address"), cfg.address)?;
    if !(cfg.shunt_ohms.is_finite() && cfg.shunt_ohms > 0.0) {
        return Err(ConfigError::Validation(format!(
            "{field}.shunt_ohms must be > 0"
        )));
    }
    if cfg.gain().is_none() {
        return Err(ConfigError::Validation(format!(
            "{field}.gain_mv must be one of 40, 80, 160, 320"
        )));
    }
    if let Some(amps) = cfg.max_expected_amps {
        if !(amps.is_finite() && amps > 0.0) {
            return Err(ConfigError::Validation(format!(
                "{field}.max_expected_amps must be > 0"
            )));
        }
    }
    if cfg.calibration().is_none() {
        return Err(ConfigError::Validation(format!(
            "{field}: shunt_ohms and max_expected_amps give a calibration outside 2..=0xFFFE"
        )));
    }
    Ok(())
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_page_switch_threshold() -> u32 {
    3
}

const fn default_cycle_length() -> u32 {
    6
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_temperature_sensor() -> String {
    "cpu_thermal".to_string()
}

fn default_i2c_device() -> String {
    "/dev/i2c-1".to_string()
}

const fn default_ups_address() -> u8 {
    0x17
}

const fn default_gain_mv() -> u16 {
    320
}

fn default_host_monitor() -> MonitorConfig {
    MonitorConfig {
        address: 0x40,
        shunt_ohms: 0.00725,
        gain_mv: default_gain_mv(),
        max_expected_amps: None,
    }
}

fn default_battery_monitor() -> MonitorConfig {
    MonitorConfig {
        address: 0x45,
        shunt_ohms: 0.005,
        gain_mv: default_gain_mv(),
        max_expected_amps: None,
    }
}

const fn default_display_backend() -> DisplayBackend {
    DisplayBackend::Ssd1306
}

const fn default_display_address() -> u8 {
    0x3C
}

const fn default_http_enabled() -> bool {
    true
}

fn default_listen() -> String {
    "127.0.0.1:9109".to_string()
}
