//! Unit registry - the live set of connected signal units
//!
//! Connection handlers insert and remove entries; the coordinator only ever
//! reads an independent snapshot. Every operation takes the same lock once,
//! and the lock is never held across an `.await`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

use crate::link::UnitLink;

/// Unique handle of one accepted connection
///
/// Identifiers are self-reported and may repeat; this handle never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registered signal unit
#[derive(Clone)]
pub struct Unit {
    conn_id: ConnId,
    identifier: String,
    link: Arc<dyn UnitLink>,
}

impl Unit {
    pub fn new(conn_id: ConnId, identifier: impl Into<String>, link: Arc<dyn UnitLink>) -> Self {
        Self {
            conn_id,
            identifier: identifier.into(),
            link,
        }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn link(&self) -> &dyn UnitLink {
        self.link.as_ref()
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("conn_id", &self.conn_id)
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

/// Lock-guarded, insertion-ordered collection of units
#[derive(Default)]
pub struct Registry {
    units: Mutex<Vec<Unit>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Unit>> {
        // Entries are only ever pushed or retained whole, so a poisoned list is still consistent
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a unit
    ///
    /// Returns false, leaving the registry unchanged, if its handle is already present.
    pub fn register(&self, unit: Unit) -> bool {
        let mut units = self.lock();
        if units.iter().any(|u| u.conn_id == unit.conn_id) {
            debug!(conn_id = %unit.conn_id, "Registry::register: handle already registered");
            return false;
        }
        debug!(conn_id = %unit.conn_id, identifier = %unit.identifier, "Registry::register: added");
        units.push(unit);
        true
    }

    /// Remove every entry with this handle
    ///
    /// Idempotent. Returns whether anything was removed.
    pub fn deregister(&self, conn_id: ConnId) -> bool {
        let mut units = self.lock();
        let before = units.len();
        units.retain(|u| u.conn_id != conn_id);
        let removed = units.len() != before;
        debug!(%conn_id, removed, "Registry::deregister: called");
        removed
    }

    /// Point-in-time copy of the current entries, in registration order
    pub fn snapshot(&self) -> Vec<Unit> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
