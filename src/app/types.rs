use std::fmt;

/// Why the node process is stopping
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
    /// The software watchdog was starved
    WatchdogReset,
    /// The node loop halted on a non-recoverable error
    Halted(String),
}

impl ShutdownReason {
    /// Process exit code for this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) | ShutdownReason::UserRequest => 0,
            ShutdownReason::WatchdogReset | ShutdownReason::Halted(_) => 1,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal {}", name),
            ShutdownReason::UserRequest => f.write_str("user request"),
            ShutdownReason::WatchdogReset => f.write_str("watchdog reset"),
            ShutdownReason::Halted(details) => write!(f, "halted: {}", details),
        }
    }
}
