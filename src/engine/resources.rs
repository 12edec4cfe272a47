//! System resource introspection.
//!
//! Engine selection depends on current memory headroom, which must be
//! re-read on every selection call and never cached across documents. The
//! trait keeps the source injectable so tests can pin the headroom.

use std::sync::Mutex;

use sysinfo::System;

/// Source of current system resource headroom.
pub trait SystemResources: Send + Sync {
    /// Currently available system memory, in GiB.
    fn available_memory_gb(&self) -> f64;
}

/// Live memory readings via `sysinfo`.
///
/// The inner `System` is refreshed on every call, per the no-caching rule.
pub struct SystemMemory {
    system: Mutex<System>,
}

impl SystemMemory {
    /// Create a live memory source.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemResources for SystemMemory {
    fn available_memory_gb(&self) -> f64 {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_memory();
        system.available_memory() as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Fixed headroom, for tests and for deployments with a configured memory
/// budget.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemory(pub f64);

impl SystemResources for FixedMemory {
    fn available_memory_gb(&self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_memory_reports_configured_value() {
        let mem = FixedMemory(7.5);
        assert_eq!(mem.available_memory_gb(), 7.5);
    }

    #[test]
    fn test_system_memory_is_non_negative() {
        let mem = SystemMemory::new();
        assert!(mem.available_memory_gb() >= 0.0);
    }
}
