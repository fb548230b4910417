//! Coordinator directory of remote nodes, rebuilt from reports after restart.

use crate::address::NodeAddress;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub node_id: String,
    pub last_battery: f32,
    /// Monotonic time of the latest report
    pub last_report_time: Instant,
    /// Wall-clock time of the latest report, for operators
    pub last_seen: DateTime<Utc>,
    pub report_count: u64,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: HashMap<NodeAddress, RegistryEntry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert on first sight, otherwise update the entry in place
    pub fn record_report(
        &mut self,
        address: NodeAddress,
        node_id: &str,
        battery: f32,
    ) -> &RegistryEntry {
        let now = Instant::now();
        let seen = Utc::now();

        let entry = self
            .entries
            .entry(address)
            .and_modify(|entry| {
                entry.node_id = node_id.to_string();
                entry.last_battery = battery;
                entry.last_report_time = entry.last_report_time.max(now);
                entry.last_seen = seen;
                entry.report_count += 1;
            })
            .or_insert_with(|| {
                info!("New device registered: {} ({})", node_id, address);
                RegistryEntry {
                    node_id: node_id.to_string(),
                    last_battery: battery,
                    last_report_time: now,
                    last_seen: seen,
                    report_count: 1,
                }
            });

        debug!(
            "Device {} ({}) battery {:.2} V, {} reports",
            entry.node_id, address, entry.last_battery, entry.report_count
        );
        entry
    }

    pub fn find_by_node_id(&self, node_id: &str) -> Option<NodeAddress> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.node_id == node_id)
            .map(|(address, _)| *address)
    }

    /// Resolve a hub target: a literal 16-hex address, or a registered node id
    pub fn resolve(&self, target: &str) -> Option<NodeAddress> {
        let target = target.trim();
        if NodeAddress::is_address_literal(target) {
            return target.parse().ok();
        }
        self.find_by_node_id(target)
    }

    pub fn get(&self, address: &NodeAddress) -> Option<&RegistryEntry> {
        self.entries.get(address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeAddress, &RegistryEntry)> {
        self.entries.iter()
    }
}
