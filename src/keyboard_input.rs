use crate::error::Result;
use crate::inputs::{Button, SimulatedPanel};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press does to the simulated panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    ToggleSensor,
    Press(Button),
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') | KeyCode::Char(' ') => Some(KeyAction::ToggleSensor),
            KeyCode::Char('1') => Some(KeyAction::Press(Button::On)),
            KeyCode::Char('0') => Some(KeyAction::Press(Button::Off)),
            KeyCode::Char('r') => Some(KeyAction::Press(Button::Report)),
            KeyCode::Char('n') => Some(KeyAction::Press(Button::Next)),
            KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
            _ => None,
        }
    }
}

/// Keyboard driver for the simulated sensor lines and buttons
pub struct KeyboardInputHandler {
    panel: SimulatedPanel,
    shutdown: CancellationToken,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    /// `shutdown` is cancelled when the quit key is pressed
    pub fn new(panel: SimulatedPanel, shutdown: CancellationToken) -> Self {
        Self {
            panel,
            shutdown,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Keyboard panel active: s=sensor 1=ON 0=OFF r=REPORT n=NEXT q=quit");

        let panel = self.panel.clone();
        let shutdown = self.shutdown.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        match KeyAction::from_key(key_event.code) {
                            Some(action) => {
                                if Self::apply(&panel, action) {
                                    info!("Quit key pressed - requesting shutdown");
                                    shutdown.cancel();
                                    break;
                                }
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Apply a key action to the panel, returning true for quit
    fn apply(panel: &SimulatedPanel, action: KeyAction) -> bool {
        match action {
            KeyAction::ToggleSensor => {
                let active = panel.toggle_sensor();
                info!("Sensor {}", if active { "active" } else { "cleared" });
                false
            }
            KeyAction::Press(button) => {
                info!("Button {} pressed", button);
                panel.press(button);
                false
            }
            KeyAction::Quit => true,
        }
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::{ButtonPad, SensorInput};

    #[test]
    fn test_key_mapping() {
        assert_eq!(
            KeyAction::from_key(KeyCode::Char('s')),
            Some(KeyAction::ToggleSensor)
        );
        assert_eq!(
            KeyAction::from_key(KeyCode::Char('n')),
            Some(KeyAction::Press(Button::Next))
        );
        assert_eq!(KeyAction::from_key(KeyCode::Esc), Some(KeyAction::Quit));
        assert_eq!(KeyAction::from_key(KeyCode::Char('x')), None);
    }

    #[test]
    fn test_actions_drive_panel() {
        let panel = SimulatedPanel::new();
        let mut reader = panel.clone();

        assert!(!KeyboardInputHandler::apply(&panel, KeyAction::ToggleSensor));
        assert!(!KeyboardInputHandler::apply(
            &panel,
            KeyAction::Press(Button::Report)
        ));
        assert!(KeyboardInputHandler::apply(&panel, KeyAction::Quit));

        assert!(reader.is_active());
        assert_eq!(reader.poll_pressed(), Some(Button::Report));
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let handler = KeyboardInputHandler::new(SimulatedPanel::new(), CancellationToken::new());
        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
        assert!(!handler.shutdown.is_cancelled());
    }
}
