use crate::address::NodeAddress;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MeshConfig {
    pub node: NodeConfig,
    pub radio: RadioConfig,
    pub watchdog: WatchdogConfig,
    pub retry: RetryConfig,
    pub timing: TimingConfig,
    pub battery: BatteryConfig,
    pub hub: HubConfig,
}

/// Role a node plays in the mesh
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Coordinator,
    Camera,
    Router,
    Sensor,
    Remote,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleKind::Coordinator => "coordinator",
            RoleKind::Camera => "camera",
            RoleKind::Router => "router",
            RoleKind::Sensor => "sensor",
            RoleKind::Remote => "remote",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for RoleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coordinator" => Ok(RoleKind::Coordinator),
            "camera" => Ok(RoleKind::Camera),
            "router" => Ok(RoleKind::Router),
            "sensor" => Ok(RoleKind::Sensor),
            "remote" => Ok(RoleKind::Remote),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// How `send_confirmed` decides that a reply acknowledges a transmission
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Any frame from the destination address counts as acknowledgement
    AnyFromSender,
    /// Only frames from the destination shaped as an acknowledgement reply count
    ExactReply,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    /// Role of this node
    #[serde(default = "default_role")]
    pub role: RoleKind,

    /// Node identifier used in reports (the radio's node name)
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Hardware address of this node
    #[serde(default = "default_coordinator_address")]
    pub address: NodeAddress,

    /// Hardware address of the coordinator
    #[serde(default = "default_coordinator_address")]
    pub coordinator: NodeAddress,

    /// Peer device this node talks to (camera for routers, sensors and remotes)
    #[serde(default)]
    pub peer: Option<NodeAddress>,

    /// Named command targets selectable on a remote control
    #[serde(default)]
    pub targets: Vec<NamedTarget>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NamedTarget {
    pub name: String,
    pub address: NodeAddress,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RadioConfig {
    /// Local UDP endpoint of the simulated radio
    #[serde(default = "default_radio_bind")]
    pub bind: String,

    /// Largest payload accepted for one frame
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,

    /// Static routing table of reachable nodes
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PeerConfig {
    pub address: NodeAddress,
    pub endpoint: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchdogConfig {
    /// Start the watchdog at boot
    #[serde(default = "default_watchdog_enabled")]
    pub enabled: bool,

    /// Reset timeout in milliseconds
    #[serde(default = "default_watchdog_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    /// Attempts per logical send
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Time spent listening for a reply after each transmit
    #[serde(default = "default_hearing_window_ms")]
    pub hearing_window_ms: u64,

    /// Poll interval inside every wait loop
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Acknowledgement matching strictness
    #[serde(default = "default_ack_mode")]
    pub ack_mode: AckMode,

    /// Frames kept for later processing while waiting for an acknowledgement
    #[serde(default = "default_backlog_capacity")]
    pub backlog_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TimingConfig {
    /// Settling time after boot before the first transmission
    #[serde(default = "default_stabilization_ms")]
    pub stabilization_ms: u64,

    /// Length of one idle/sleep cycle
    #[serde(default = "default_sleep_cycle_ms")]
    pub sleep_cycle_ms: u64,

    /// Time spent in the Error state before restarting
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Minimum time between repeated sensor notifications
    #[serde(default = "default_sensor_debounce_ms")]
    pub sensor_debounce_ms: u64,

    /// Minimum time between repeats of the same remote-control button
    #[serde(default = "default_button_debounce_ms")]
    pub button_debounce_ms: u64,

    /// Sensor re-check period while a sensor stays active
    #[serde(default = "default_sensor_check_interval_ms")]
    pub sensor_check_interval_ms: u64,

    /// How long a sensor-activated camera stays on
    #[serde(default = "default_camera_on_duration_ms")]
    pub camera_on_duration_ms: u64,

    /// Interval between background retries to an unreachable coordinator
    #[serde(default = "default_coordinator_retry_interval_ms")]
    pub coordinator_retry_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatteryConfig {
    /// ADC reference voltage
    #[serde(default = "default_reference_volts")]
    pub reference_volts: f32,

    /// Full-scale ADC reading
    #[serde(default = "default_adc_max")]
    pub adc_max: u16,

    /// Voltage divider ratio in front of the ADC pin
    #[serde(default = "default_divider_ratio")]
    pub divider_ratio: f32,

    /// Per-board correction factor
    #[serde(default = "default_scaling_factor")]
    pub scaling_factor: f32,

    /// Raw ADC value reported by the simulated gauge
    #[serde(default = "default_simulated_raw")]
    pub simulated_raw: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HubConfig {
    /// Bridge hub lines over stdin/stdout (coordinator only)
    #[serde(default = "default_hub_enabled")]
    pub enabled: bool,
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn hearing_window(&self) -> Duration {
        Duration::from_millis(self.hearing_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TimingConfig {
    pub fn stabilization(&self) -> Duration {
        Duration::from_millis(self.stabilization_ms)
    }

    pub fn sleep_cycle(&self) -> Duration {
        Duration::from_millis(self.sleep_cycle_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn sensor_debounce(&self) -> Duration {
        Duration::from_millis(self.sensor_debounce_ms)
    }

    pub fn button_debounce(&self) -> Duration {
        Duration::from_millis(self.button_debounce_ms)
    }

    pub fn sensor_check_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_check_interval_ms)
    }

    pub fn camera_on_duration(&self) -> Duration {
        Duration::from_millis(self.camera_on_duration_ms)
    }

    pub fn coordinator_retry_interval(&self) -> Duration {
        Duration::from_millis(self.coordinator_retry_interval_ms)
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl MeshConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("meshnode.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("node.role", default_role().to_string())?
            .set_default("node.node_id", default_node_id())?
            .set_default("node.address", default_coordinator_address().to_string())?
            .set_default("node.coordinator", default_coordinator_address().to_string())?
            .set_default("radio.bind", default_radio_bind())?
            .set_default("radio.max_payload", default_max_payload() as i64)?
            .set_default("watchdog.enabled", default_watchdog_enabled())?
            .set_default("watchdog.timeout_ms", default_watchdog_timeout_ms() as i64)?
            .set_default("retry.max_attempts", default_max_attempts() as i64)?
            .set_default("retry.retry_delay_ms", default_retry_delay_ms() as i64)?
            .set_default("retry.hearing_window_ms", default_hearing_window_ms() as i64)?
            .set_default("retry.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("retry.ack_mode", "any_from_sender")?
            .set_default("retry.backlog_capacity", default_backlog_capacity() as i64)?
            .set_default("timing.stabilization_ms", default_stabilization_ms() as i64)?
            .set_default("timing.sleep_cycle_ms", default_sleep_cycle_ms() as i64)?
            .set_default("timing.error_backoff_ms", default_error_backoff_ms() as i64)?
            .set_default("timing.sensor_debounce_ms", default_sensor_debounce_ms() as i64)?
            .set_default("timing.button_debounce_ms", default_button_debounce_ms() as i64)?
            .set_default(
                "timing.sensor_check_interval_ms",
                default_sensor_check_interval_ms() as i64,
            )?
            .set_default(
                "timing.camera_on_duration_ms",
                default_camera_on_duration_ms() as i64,
            )?
            .set_default(
                "timing.coordinator_retry_interval_ms",
                default_coordinator_retry_interval_ms() as i64,
            )?
            .set_default("battery.reference_volts", default_reference_volts() as f64)?
            .set_default("battery.adc_max", default_adc_max() as i64)?
            .set_default("battery.divider_ratio", default_divider_ratio() as f64)?
            .set_default("battery.scaling_factor", default_scaling_factor() as f64)?
            .set_default("battery.simulated_raw", default_simulated_raw() as i64)?
            .set_default("hub.enabled", default_hub_enabled())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. MESHNODE_NODE__ROLE=camera
            .add_source(
                Environment::with_prefix("MESHNODE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: MeshConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let node_id = &self.node.node_id;
        if node_id.is_empty() || node_id.contains([':', ';']) {
            return Err(ConfigError::Message(format!(
                "Node id '{}' must be non-empty and contain no ':' or ';'",
                node_id
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "Retry max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.hearing_window_ms == 0 || self.retry.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Retry hearing_window_ms and poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.watchdog.timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Watchdog timeout_ms must be greater than 0".to_string(),
            ));
        }

        // Every wait loop feeds the watchdog once per poll interval
        if self.retry.poll_interval_ms >= self.watchdog.timeout_ms {
            return Err(ConfigError::Message(format!(
                "Poll interval ({} ms) must be shorter than the watchdog timeout ({} ms)",
                self.retry.poll_interval_ms, self.watchdog.timeout_ms
            )));
        }

        if self.timing.sleep_cycle_ms == 0 || self.timing.sensor_check_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Timing sleep_cycle_ms and sensor_check_interval_ms must be greater than 0"
                    .to_string(),
            ));
        }

        if self.timing.coordinator_retry_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Timing coordinator_retry_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.battery.adc_max == 0 {
            return Err(ConfigError::Message(
                "Battery adc_max must be greater than 0".to_string(),
            ));
        }

        if self.radio.max_payload == 0 {
            return Err(ConfigError::Message(
                "Radio max_payload must be greater than 0".to_string(),
            ));
        }

        match self.node.role {
            RoleKind::Router if self.node.peer.is_none() => {
                return Err(ConfigError::Message(
                    "Router role requires node.peer (camera to notify)".to_string(),
                ));
            }
            RoleKind::Remote if self.node.peer.is_none() && self.node.targets.is_empty() => {
                return Err(ConfigError::Message(
                    "Remote role requires node.peer or node.targets".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }

    /// Serialize the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                role: default_role(),
                node_id: default_node_id(),
                address: default_coordinator_address(),
                coordinator: default_coordinator_address(),
                peer: None,
                targets: Vec::new(),
            },
            radio: RadioConfig {
                bind: default_radio_bind(),
                max_payload: default_max_payload(),
                peers: Vec::new(),
            },
            watchdog: WatchdogConfig {
                enabled: default_watchdog_enabled(),
                timeout_ms: default_watchdog_timeout_ms(),
            },
            retry: RetryConfig {
                max_attempts: default_max_attempts(),
                retry_delay_ms: default_retry_delay_ms(),
                hearing_window_ms: default_hearing_window_ms(),
                poll_interval_ms: default_poll_interval_ms(),
                ack_mode: default_ack_mode(),
                backlog_capacity: default_backlog_capacity(),
            },
            timing: TimingConfig {
                stabilization_ms: default_stabilization_ms(),
                sleep_cycle_ms: default_sleep_cycle_ms(),
                error_backoff_ms: default_error_backoff_ms(),
                sensor_debounce_ms: default_sensor_debounce_ms(),
                button_debounce_ms: default_button_debounce_ms(),
                sensor_check_interval_ms: default_sensor_check_interval_ms(),
                camera_on_duration_ms: default_camera_on_duration_ms(),
                coordinator_retry_interval_ms: default_coordinator_retry_interval_ms(),
            },
            battery: BatteryConfig {
                reference_volts: default_reference_volts(),
                adc_max: default_adc_max(),
                divider_ratio: default_divider_ratio(),
                scaling_factor: default_scaling_factor(),
                simulated_raw: default_simulated_raw(),
            },
            hub: HubConfig {
                enabled: default_hub_enabled(),
            },
        }
    }
}

// Default value functions
fn default_role() -> RoleKind {
    RoleKind::Coordinator
}
fn default_node_id() -> String {
    "XBEE_COORD".to_string()
}
fn default_coordinator_address() -> NodeAddress {
    NodeAddress::new([0x00, 0x13, 0xA2, 0x00, 0x42, 0x3D, 0x8B, 0x99])
}

fn default_radio_bind() -> String {
    "127.0.0.1:47000".to_string()
}
fn default_max_payload() -> usize {
    256
}

fn default_watchdog_enabled() -> bool {
    true
}
fn default_watchdog_timeout_ms() -> u64 {
    120_000
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_hearing_window_ms() -> u64 {
    3000
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_ack_mode() -> AckMode {
    AckMode::AnyFromSender
}
fn default_backlog_capacity() -> usize {
    16
}

fn default_stabilization_ms() -> u64 {
    5000
}
fn default_sleep_cycle_ms() -> u64 {
    20_000
}
fn default_error_backoff_ms() -> u64 {
    5000
}
fn default_sensor_debounce_ms() -> u64 {
    30_000
}
fn default_button_debounce_ms() -> u64 {
    4000
}
fn default_sensor_check_interval_ms() -> u64 {
    1000
}
fn default_camera_on_duration_ms() -> u64 {
    60_000
}
fn default_coordinator_retry_interval_ms() -> u64 {
    43_200_000 // 12 hours
}

fn default_reference_volts() -> f32 {
    2.5
}
fn default_adc_max() -> u16 {
    4095
}
fn default_divider_ratio() -> f32 {
    12.0 / 3.3
}
fn default_scaling_factor() -> f32 {
    2.9
}
fn default_simulated_raw() -> u16 {
    1500
}

fn default_hub_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MeshConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.node.role, RoleKind::Coordinator);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.timing.coordinator_retry_interval(), Duration::from_secs(12 * 3600));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[node]
role = "router"
node_id = "XBEE_ROUTER"
address = "0013A200423D8D6E"
peer = "0013A200423D8AAC"

[retry]
max_attempts = 5
ack_mode = "exact_reply"

[[radio.peers]]
address = "0013A200423D8AAC"
endpoint = "127.0.0.1:47001"
"#
        )
        .unwrap();

        let config = MeshConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.node.role, RoleKind::Router);
        assert_eq!(config.node.node_id, "XBEE_ROUTER");
        assert_eq!(
            config.node.peer,
            Some("0013A200423D8AAC".parse().unwrap())
        );
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.ack_mode, AckMode::ExactReply);
        assert_eq!(config.retry.hearing_window_ms, 3000);
        assert_eq!(config.radio.peers.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = MeshConfig::default();

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry.max_attempts = 3;

        config.retry.poll_interval_ms = config.watchdog.timeout_ms;
        assert!(config.validate().is_err());
        config.retry.poll_interval_ms = 100;

        config.node.node_id = "BAD:ID".to_string();
        assert!(config.validate().is_err());
        config.node.node_id = "GOOD".to_string();

        config.node.role = RoleKind::Router;
        assert!(config.validate().is_err());
        config.node.peer = Some(NodeAddress::new([1; 8]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_serializes() {
        let text = MeshConfig::default().to_toml().unwrap();
        assert!(text.contains("[retry]"));
        assert!(text.contains("ack_mode = \"any_from_sender\""));
        assert!(text.contains("0013A200423D8B99"));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("Camera".parse::<RoleKind>().unwrap(), RoleKind::Camera);
        assert!("toaster".parse::<RoleKind>().is_err());
    }
}
