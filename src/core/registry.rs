// src/core/registry.rs

//! The concurrency-safe map from connection identifier to live connection handle.

use super::errors::BridgeError;
use super::events::ConnectionId;
use crate::connection::ConnectionHandle;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Tracks every open connection under its identifier.
///
/// Only insert, lookup and remove are offered. Each operation touches a single
/// shard lock of the underlying `DashMap` and releases it before returning, so
/// no caller ever holds registry state across socket I/O. Lookups hand out an
/// `Arc` clone of the handle rather than a map guard for the same reason.
#[derive(Debug)]
pub struct ConnectionRegistry<H = ConnectionHandle> {
    connections: DashMap<ConnectionId, Arc<H>>,
}

impl<H> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ConnectionRegistry<H> {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Registers `handle` under `id`. Fails if the identifier is already live.
    pub fn insert(&self, id: ConnectionId, handle: Arc<H>) -> Result<(), BridgeError> {
        match self.connections.entry(id) {
            Entry::Occupied(entry) => Err(BridgeError::DuplicateIdentifier(
                entry.key().to_string(),
            )),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Returns the handle registered under `id`, if any.
    pub fn lookup(&self, id: &str) -> Option<Arc<H>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes `id`. Removing an absent identifier is a no-op.
    pub fn remove(&self, id: &str) -> Option<Arc<H>> {
        self.connections.remove(id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
