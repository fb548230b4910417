use super::HubLink;
use crate::error::HubError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
struct MemoryHubState {
    published: Vec<String>,
    commands: VecDeque<String>,
    failing_publishes: u32,
}

/// In-memory hub for tests; clones share state
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<MemoryHubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command line as if sent by the backend
    pub fn push_command(&self, line: &str) {
        self.state.lock().commands.push_back(line.to_string());
    }

    pub fn fail_next_publishes(&self, count: u32) {
        self.state.lock().failing_publishes = count;
    }

    pub fn published(&self) -> Vec<String> {
        self.state.lock().published.clone()
    }

    pub fn clear_published(&self) {
        self.state.lock().published.clear();
    }
}

#[async_trait]
impl HubLink for MemoryHub {
    async fn publish(&mut self, line: &str) -> Result<(), HubError> {
        let mut state = self.state.lock();
        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(HubError::Publish {
                details: "memory hub publish failure".to_string(),
            });
        }
        state.published.push(line.to_string());
        Ok(())
    }

    async fn poll_command(&mut self) -> Result<Option<String>, HubError> {
        Ok(self.state.lock().commands.pop_front())
    }
}
