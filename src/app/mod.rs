mod orchestrator;
mod runtime;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::NodeOrchestrator;
pub use types::ShutdownReason;
