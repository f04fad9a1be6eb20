//! Safe-zone store
//!
//! Durable, insertion-ordered collection of the user's declared safe zones.
//! Zones are append-only in the current design: no update or delete
//! operation exists, so a zone id stays stable for the lifetime of the
//! store file.

use crate::domain::alert::SafeZone;
use crate::domain::error::{StoreError, StoreOpError, ValidationError};
use crate::domain::geo::GeoPoint;
use crate::domain::types::{new_id, ZoneId};
use crate::io::store::JsonStore;
use parking_lot::Mutex;
use std::path::Path;
use tracing::info;

const ZONES_FILE: &str = "safe_zones.json";

pub struct SafeZoneStore {
    store: JsonStore,
    zones: Mutex<Vec<SafeZone>>,
}

impl SafeZoneStore {
    /// Open the store, loading any persisted zones
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let store = JsonStore::new(dir, ZONES_FILE);
        let zones = store.load()?;
        Ok(Self { store, zones: Mutex::new(zones) })
    }

    /// Add a new zone, assigning it a fresh id.
    ///
    /// Rejects a non-positive (or NaN) radius and an empty name before
    /// anything touches disk.
    pub fn add(
        &self,
        name: &str,
        center: GeoPoint,
        radius_m: f64,
    ) -> Result<SafeZone, StoreOpError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if !(radius_m > 0.0) {
            return Err(ValidationError::NonPositiveRadius.into());
        }

        let zone = SafeZone {
            id: ZoneId(new_id()),
            name: name.trim().to_string(),
            center,
            radius_m,
        };

        let mut zones = self.zones.lock();
        zones.push(zone.clone());
        self.store.persist(&zones).map_err(StoreOpError::Storage)?;

        info!(zone_id = %zone.id, name = %zone.name, radius_m = %zone.radius_m, "safe_zone_added");
        Ok(zone)
    }

    /// All zones in insertion order
    pub fn list(&self) -> Vec<SafeZone> {
        self.zones.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.zones.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.lock().is_empty()
    }
}
