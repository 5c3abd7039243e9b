use crate::domain::{PacketFilter, PortRule, ToolError};
use std::sync::Mutex;

/// In-process rule table.
///
/// Behaves like a single iptables chain (insert at the head, delete one
/// matching instance, duplicates allowed) without touching the host. Used
/// for dry runs and tests.
#[derive(Default)]
pub struct MemoryPacketFilter {
    // ---
    rules: Mutex<Vec<PortRule>>,
}

impl MemoryPacketFilter {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing rule table, duplicates and drift included.
    pub fn with_rules(rules: Vec<PortRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }

    /// Snapshot of the current table.
    pub fn rules(&self) -> Vec<PortRule> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PortRule>> {
        // A poisoned table is still a valid table.
        self.rules.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl PacketFilter for MemoryPacketFilter {
    // ---
    async fn list(&self) -> Result<Vec<PortRule>, ToolError> {
        Ok(self.rules())
    }

    async fn insert(&self, rule: &PortRule) -> Result<(), ToolError> {
        self.lock().insert(0, *rule);
        Ok(())
    }

    async fn delete(&self, rule: &PortRule) -> Result<(), ToolError> {
        // ---
        let mut rules = self.lock();
        match rules.iter().position(|r| r == rule) {
            Some(idx) => {
                rules.remove(idx);
                Ok(())
            }
            None => Err(ToolError::Failed {
                program: "memory-filter".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("no such rule: {rule}"),
            }),
        }
    }
}
