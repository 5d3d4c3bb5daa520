//! Server registry and health tracking.
//!
//! Configuration records stay immutable after load; runtime health lives in
//! a parallel per-server status record with atomic fields. Reads may observe
//! either the prior or the new value of a concurrent health flip.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::McpServerConfig;

/// Mutable runtime state for one server.
pub struct ServerStatus {
    healthy: AtomicBool,
    last_health_check: RwLock<Option<Instant>>,
}

impl ServerStatus {
    fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            last_health_check: RwLock::new(None),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn last_health_check(&self) -> Option<Instant> {
        *self.last_health_check.read()
    }
}

/// A configured server paired with its runtime status.
pub struct ServerEntry {
    pub config: McpServerConfig,
    pub status: ServerStatus,
}

/// Holds the `name -> server` mapping. All mutations are concurrency-safe.
pub struct ServerRegistry {
    servers: DashMap<String, Arc<ServerEntry>>,
}

impl ServerRegistry {
    pub fn new(configs: Vec<McpServerConfig>) -> Self {
        let servers = DashMap::new();
        for config in configs {
            servers.insert(
                config.name.clone(),
                Arc::new(ServerEntry {
                    config,
                    status: ServerStatus::new(),
                }),
            );
        }
        Self { servers }
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServerEntry>> {
        self.servers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Servers that are enabled and currently pass health checks.
    pub fn enabled_healthy(&self) -> Vec<Arc<ServerEntry>> {
        self.servers
            .iter()
            .filter(|entry| entry.value().config.enabled && entry.value().status.is_healthy())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.servers.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn mark_healthy(&self, name: &str) {
        if let Some(entry) = self.servers.get(name) {
            entry.status.healthy.store(true, Ordering::Relaxed);
            *entry.status.last_health_check.write() = Some(Instant::now());
        }
    }

    pub fn mark_unhealthy(&self, name: &str) {
        if let Some(entry) = self.servers.get(name) {
            if entry.status.healthy.swap(false, Ordering::Relaxed) {
                debug!("Server '{}' transitioned to unhealthy", name);
            }
            *entry.status.last_health_check.write() = Some(Instant::now());
        }
    }
}
