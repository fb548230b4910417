//! Local hardware collaborators: sensor pins, buttons, the camera output and
//! the battery ADC. Host builds use [`SimulatedPanel`] and [`FixedBattery`].

use crate::config::BatteryConfig;
use crate::error::{MeshError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub trait SensorInput: Send {
    /// True while any sensor line is active
    fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    On,
    Off,
    Report,
    /// Cycle the selected target
    Next,
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Button::On => "ON",
            Button::Off => "OFF",
            Button::Report => "REPORT",
            Button::Next => "NEXT",
        };
        f.write_str(name)
    }
}

pub trait ButtonPad: Send {
    /// Next button press not yet consumed
    fn poll_pressed(&mut self) -> Option<Button>;
}

pub trait Actuator: Send {
    fn set(&mut self, on: bool);
    fn is_on(&self) -> bool;
}

pub trait BatteryGauge: Send {
    fn read_raw(&mut self) -> Result<u16>;
}

/// Conversion from raw ADC counts to battery volts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryCalibration {
    pub reference_volts: f32,
    pub adc_max: u16,
    pub divider_ratio: f32,
    pub scaling_factor: f32,
}

impl BatteryCalibration {
    pub fn volts(&self, raw: u16) -> f32 {
        if self.adc_max == 0 {
            return 0.0;
        }
        let pin_volts = raw as f32 / self.adc_max as f32 * self.reference_volts;
        pin_volts * self.divider_ratio * self.scaling_factor
    }
}

impl From<&BatteryConfig> for BatteryCalibration {
    fn from(config: &BatteryConfig) -> Self {
        Self {
            reference_volts: config.reference_volts,
            adc_max: config.adc_max,
            divider_ratio: config.divider_ratio,
            scaling_factor: config.scaling_factor,
        }
    }
}

/// Battery gauge with its per-node calibration
pub struct Battery {
    gauge: Box<dyn BatteryGauge>,
    calibration: BatteryCalibration,
}

impl Battery {
    pub fn new(gauge: Box<dyn BatteryGauge>, calibration: BatteryCalibration) -> Self {
        Self { gauge, calibration }
    }

    /// Battery voltage, or 0.0 when the gauge cannot be read
    pub fn read_volts(&mut self) -> f32 {
        match self.gauge.read_raw() {
            Ok(raw) => self.calibration.volts(raw),
            Err(e) => {
                warn!("Battery read failed: {}", e);
                0.0
            }
        }
    }
}

/// Gauge returning a fixed raw value, or failing when unset
#[derive(Debug, Clone, Copy)]
pub struct FixedBattery {
    raw: Option<u16>,
}

impl FixedBattery {
    pub fn new(raw: u16) -> Self {
        Self { raw: Some(raw) }
    }

    pub fn failing() -> Self {
        Self { raw: None }
    }
}

impl BatteryGauge for FixedBattery {
    fn read_raw(&mut self) -> Result<u16> {
        self.raw
            .ok_or_else(|| MeshError::component("battery", "ADC not available"))
    }
}

#[derive(Debug, Default)]
struct PanelState {
    sensor_active: bool,
    pressed: VecDeque<Button>,
    output_on: bool,
}

/// Simulated front panel: sensor lines, buttons and the camera output
///
/// Clones share state so the keyboard driver or a test can operate the panel
/// the node reads from.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPanel {
    state: Arc<Mutex<PanelState>>,
}

impl SimulatedPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sensor(&self, active: bool) {
        self.state.lock().sensor_active = active;
    }

    pub fn toggle_sensor(&self) -> bool {
        let mut state = self.state.lock();
        state.sensor_active = !state.sensor_active;
        state.sensor_active
    }

    pub fn press(&self, button: Button) {
        self.state.lock().pressed.push_back(button);
    }

    pub fn output_on(&self) -> bool {
        self.state.lock().output_on
    }
}

impl SensorInput for SimulatedPanel {
    fn is_active(&self) -> bool {
        self.state.lock().sensor_active
    }
}

impl ButtonPad for SimulatedPanel {
    fn poll_pressed(&mut self) -> Option<Button> {
        self.state.lock().pressed.pop_front()
    }
}

impl Actuator for SimulatedPanel {
    fn set(&mut self, on: bool) {
        self.state.lock().output_on = on;
    }

    fn is_on(&self) -> bool {
        self.state.lock().output_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> BatteryCalibration {
        BatteryCalibration {
            reference_volts: 2.5,
            adc_max: 4095,
            divider_ratio: 12.0 / 3.3,
            scaling_factor: 2.9,
        }
    }

    #[test]
    fn test_battery_calibration() {
        let calibration = calibration();
        assert_eq!(calibration.volts(0), 0.0);

        let expected = 2.5 * (12.0 / 3.3) * 2.9;
        assert!((calibration.volts(4095) - expected).abs() < 1e-4);

        let half = calibration.volts(2048);
        assert!(half > expected * 0.49 && half < expected * 0.51);
    }

    #[test]
    fn test_battery_read_failure_is_zero() {
        let mut battery = Battery::new(Box::new(FixedBattery::failing()), calibration());
        assert_eq!(battery.read_volts(), 0.0);

        let mut battery = Battery::new(Box::new(FixedBattery::new(4095)), calibration());
        assert!(battery.read_volts() > 26.0);
    }

    #[test]
    fn test_panel_shares_state() {
        let panel = SimulatedPanel::new();
        let mut node_side = panel.clone();

        panel.press(Button::On);
        panel.press(Button::Next);
        assert!(panel.toggle_sensor());

        assert!(node_side.is_active());
        assert_eq!(node_side.poll_pressed(), Some(Button::On));
        assert_eq!(node_side.poll_pressed(), Some(Button::Next));
        assert_eq!(node_side.poll_pressed(), None);

        node_side.set(true);
        assert!(panel.output_on());
    }
}
