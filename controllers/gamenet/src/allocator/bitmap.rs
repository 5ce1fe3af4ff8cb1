//! Per-load-balancer port bitmap
//!
//! Tracks which ports of `[min_port, max_port)` are booked on one load
//! balancer. Permanently blocked ports are booked at construction and
//! survive every release.

use std::collections::BTreeSet;

use crate::config::AllocatorConfig;

/// Booked/free ports of one load balancer.
#[derive(Debug, Clone)]
pub struct PortBitmap {
    min_port: i32,
    max_port: i32,
    /// Booked ports; blocked ports are always members
    booked: BTreeSet<i32>,
    /// Permanently blocked ports within range
    blocked: BTreeSet<i32>,
}

impl PortBitmap {
    /// Creates a bitmap with the configured blocked ports pre-booked.
    #[must_use]
    pub fn new(config: &AllocatorConfig) -> Self {
        let blocked: BTreeSet<i32> = config
            .blocked_ports
            .iter()
            .copied()
            .filter(|p| (config.min_port..config.max_port).contains(p))
            .collect();
        Self {
            min_port: config.min_port,
            max_port: config.max_port,
            booked: blocked.clone(),
            blocked,
        }
    }

    /// Books the first `count` free ports in ascending order.
    ///
    /// Fails atomically: the scan collects candidates first and commits only
    /// when enough were found, so a failed call books nothing.
    pub fn try_allocate(&mut self, count: usize) -> Option<Vec<i32>> {
        let free: Vec<i32> = (self.min_port..self.max_port)
            .filter(|p| !self.booked.contains(p))
            .take(count)
            .collect();
        if free.len() < count {
            return None;
        }
        for port in &free {
            self.booked.insert(*port);
        }
        Some(free)
    }

    /// Books one specific port (cold-start replay). Out-of-range ports are
    /// ignored; booking a booked port is a no-op.
    pub fn book(&mut self, port: i32) {
        if (self.min_port..self.max_port).contains(&port) {
            self.booked.insert(port);
        }
    }

    /// Frees the given ports, then re-books any permanently blocked port.
    pub fn release(&mut self, ports: &[i32]) {
        for port in ports {
            self.booked.remove(port);
        }
        for port in &self.blocked {
            self.booked.insert(*port);
        }
    }

    /// Free, non-blocked ports remaining in range.
    #[must_use]
    pub fn free_count(&self) -> usize {
        (self.max_port - self.min_port) as usize - self.booked.len()
    }

    /// Whether the port is currently booked (or blocked).
    #[must_use]
    pub fn is_booked(&self, port: i32) -> bool {
        self.booked.contains(&port)
    }

    /// Booked ports that are not permanently blocked.
    #[must_use]
    pub fn booked_ports(&self) -> Vec<i32> {
        self.booked
            .iter()
            .copied()
            .filter(|p| !self.blocked.contains(p))
            .collect()
    }
}
