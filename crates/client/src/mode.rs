//! Application mode flag.
//!
//! The app runs either as a regular shopper or in admin mode, which unlocks
//! market/shop management surfaces. The flag is durable so a relaunch keeps
//! the chosen mode.

use crate::events::{EventBus, StoreEvent};
use crate::storage::{SharedStorage, StorageError};

/// Storage key holding the mode flag.
pub const MODE_KEY: &str = "app.mode";

/// Stored value marking admin mode. Any other value (or absence) is user
/// mode.
const ADMIN_VALUE: &str = "admin";

/// The mode the app runs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppMode {
    /// Regular shopper.
    #[default]
    User,
    /// Market/shop management surfaces unlocked.
    Admin,
}

impl AppMode {
    /// The other mode.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::User => Self::Admin,
            Self::Admin => Self::User,
        }
    }
}

/// Durable store for the app mode.
#[derive(Clone)]
pub struct ModeStore {
    storage: SharedStorage,
    events: EventBus,
}

impl ModeStore {
    pub fn new(storage: SharedStorage, events: EventBus) -> Self {
        Self { storage, events }
    }

    /// The current mode. Absence of the flag means [`AppMode::User`].
    ///
    /// # Errors
    ///
    /// Returns an error when the storage read fails.
    pub fn current(&self) -> Result<AppMode, StorageError> {
        Ok(match self.storage.get(MODE_KEY)?.as_deref() {
            Some(ADMIN_VALUE) => AppMode::Admin,
            _ => AppMode::User,
        })
    }

    /// Set the mode and publish [`StoreEvent::ModeChanged`].
    ///
    /// # Errors
    ///
    /// Returns an error when the storage write fails.
    pub fn set(&self, mode: AppMode) -> Result<(), StorageError> {
        match mode {
            AppMode::Admin => self.storage.set(MODE_KEY, ADMIN_VALUE)?,
            AppMode::User => self.storage.remove(MODE_KEY)?,
        }
        self.events.publish(StoreEvent::ModeChanged);
        Ok(())
    }

    /// Flip between user and admin mode, returning the new mode.
    ///
    /// # Errors
    ///
    /// Returns an error when storage fails.
    pub fn toggle(&self) -> Result<AppMode, StorageError> {
        let next = self.current()?.toggled();
        self.set(next)?;
        Ok(next)
    }
}
