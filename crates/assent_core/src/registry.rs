//! PIN → connection registry
//!
//! The binding table is the only state shared between connections. All
//! mutations go through one mutex and never hold it across an await, so a
//! `resolve` sees either the whole registration or none of it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::directory::PatientDirectory;
use crate::id::{ConnectionId, Pin};

/// Outcome of a `register` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationResult {
    /// The connection is now bound to the PIN. `replaced` holds the previous
    /// connection when this registration displaced one (last one wins, the
    /// displaced connection is not told).
    Registered { replaced: Option<ConnectionId> },
    /// The directory does not know this PIN; nothing was bound
    NotFound,
}

impl RegistrationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }
}

#[derive(Debug, Default)]
struct Bindings {
    by_pin: HashMap<Pin, ConnectionId>,
    by_connection: HashMap<ConnectionId, Vec<Pin>>,
}

impl Bindings {
    fn bind(&mut self, pin: Pin, connection: ConnectionId) -> Option<ConnectionId> {
        let previous = self.by_pin.insert(pin.clone(), connection);
        if let Some(old) = previous {
            if old != connection {
                self.unlink(old, &pin);
            }
        }
        let pins = self.by_connection.entry(connection).or_default();
        if !pins.contains(&pin) {
            pins.push(pin);
        }
        previous.filter(|old| *old != connection)
    }

    fn unlink(&mut self, connection: ConnectionId, pin: &Pin) {
        if let Some(pins) = self.by_connection.get_mut(&connection) {
            pins.retain(|p| p != pin);
            if pins.is_empty() {
                self.by_connection.remove(&connection);
            }
        }
    }
}

/// Maps each patient PIN to at most one live connection
pub struct ConnectionRegistry {
    directory: Arc<dyn PatientDirectory>,
    bindings: Mutex<Bindings>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("bindings", &self.bindings.lock().by_pin.len())
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new(directory: Arc<dyn PatientDirectory>) -> Self {
        Self {
            directory,
            bindings: Mutex::new(Bindings::default()),
        }
    }

    pub fn directory(&self) -> &Arc<dyn PatientDirectory> {
        &self.directory
    }

    /// Bind `connection` to `pin` if the directory knows the PIN
    pub async fn register(&self, pin: &Pin, connection: ConnectionId) -> RegistrationResult {
        if !self.directory.is_known(pin).await {
            warn!("Invalid PIN registration attempt: {}", pin);
            return RegistrationResult::NotFound;
        }

        let replaced = self.bindings.lock().bind(pin.clone(), connection);
        match replaced {
            Some(old) => info!(
                "Patient registered with PIN {} on {} (replaced {})",
                pin, connection, old
            ),
            None => info!("Patient registered with PIN {} on {}", pin, connection),
        }
        RegistrationResult::Registered { replaced }
    }

    pub fn resolve(&self, pin: &Pin) -> Option<ConnectionId> {
        self.bindings.lock().by_pin.get(pin).copied()
    }

    /// Drop every binding currently held by `connection`, returning the PINs
    /// that were released
    pub fn release(&self, connection: ConnectionId) -> Vec<Pin> {
        let mut bindings = self.bindings.lock();
        let pins = bindings
            .by_connection
            .remove(&connection)
            .unwrap_or_default();
        for pin in &pins {
            if bindings.by_pin.get(pin) == Some(&connection) {
                bindings.by_pin.remove(pin);
            }
        }
        drop(bindings);

        for pin in &pins {
            info!("Patient with PIN {} disconnected", pin);
        }
        if pins.is_empty() {
            debug!("Released {} with no bindings", connection);
        }
        pins
    }

    pub fn len(&self) -> usize {
        self.bindings.lock().by_pin.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
