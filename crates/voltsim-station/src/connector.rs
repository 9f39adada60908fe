//! Connector ledger: canonical per-connector runtime state.
//!
//! Connectors form a fixed arena indexed `0..=N`; index 0 is the station
//! itself and carries station-wide reservations and profiles. The ledger
//! never emits protocol messages and its mutators are total: unknown
//! connector ids are ignored, so callers pre-validate ids where the
//! distinction matters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use voltsim_types::v16::{AvailabilityType, ChargePointStatus, ChargingProfile};

/// A connector hold for a specific id tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub reservation_id: i32,
    pub connector_id: u32,
    pub id_tag: String,
    pub expiry_date: DateTime<Utc>,
}

impl Reservation {
    /// A reservation whose expiry has passed never matches anything.
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date <= now
    }
}

/// Runtime state of one connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorState {
    pub status: ChargePointStatus,
    pub availability: AvailabilityType,
    /// Availability change deferred until the running transaction ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_availability: Option<AvailabilityType>,
    pub transaction_started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    /// Energy register at transaction start, in Wh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_meter_start: Option<f64>,
    /// Lifetime energy accumulator in Wh; never decreases.
    pub energy_active_import_register: f64,
    /// Energy accumulated by the running transaction, in Wh.
    pub transaction_energy_active_import_register: f64,
    /// Installed profiles in insertion order; identity is
    /// `chargingProfileId` or the `(stackLevel, purpose)` pair.
    #[serde(default)]
    pub charging_profiles: Vec<ChargingProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
}

impl Default for ConnectorState {
    fn default() -> Self {
        Self {
            status: ChargePointStatus::Available,
            availability: AvailabilityType::Operative,
            scheduled_availability: None,
            transaction_started: false,
            transaction_id: None,
            id_tag: None,
            transaction_meter_start: None,
            energy_active_import_register: 0.0,
            transaction_energy_active_import_register: 0.0,
            charging_profiles: Vec::new(),
            reservation: None,
        }
    }
}

/// Filter for clearing charging profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProfileFilter {
    pub id: Option<i32>,
    pub purpose: Option<voltsim_types::v16::ChargingProfilePurpose>,
    pub stack_level: Option<i32>,
}

impl ProfileFilter {
    /// A profile is cleared iff its id equals the filter id, or the
    /// present subset of `(purpose, stackLevel)` matches. An empty filter
    /// matches everything.
    fn matches(&self, profile: &ChargingProfile) -> bool {
        if let Some(id) = self.id {
            if profile.charging_profile_id == id {
                return true;
            }
        }
        match (self.purpose, self.stack_level) {
            (None, None) => self.id.is_none(),
            (None, Some(level)) => profile.stack_level == level,
            (Some(purpose), None) => profile.charging_profile_purpose == purpose,
            (Some(purpose), Some(level)) => {
                profile.charging_profile_purpose == purpose && profile.stack_level == level
            }
        }
    }
}

/// Fixed arena of connector state, index 0 included.
#[derive(Debug, Clone)]
pub struct ConnectorLedger {
    connectors: Vec<ConnectorState>,
}

impl ConnectorLedger {
    /// Arena for `connector_count` physical connectors plus index 0.
    pub fn new(connector_count: u32) -> Self {
        Self {
            connectors: (0..=connector_count).map(|_| ConnectorState::default()).collect(),
        }
    }

    /// Number of physical connectors (index 0 excluded).
    pub fn connector_count(&self) -> u32 {
        (self.connectors.len() - 1) as u32
    }

    /// Ids of the physical connectors, `1..=N`.
    pub fn connector_ids(&self) -> impl Iterator<Item = u32> + '_ {
        1..=self.connector_count()
    }

    pub fn contains(&self, connector_id: u32) -> bool {
        (connector_id as usize) < self.connectors.len()
    }

    pub fn get(&self, connector_id: u32) -> Option<&ConnectorState> {
        self.connectors.get(connector_id as usize)
    }

    pub fn get_mut(&mut self, connector_id: u32) -> Option<&mut ConnectorState> {
        self.connectors.get_mut(connector_id as usize)
    }

    /// Snapshot of the whole arena, for persistence.
    pub fn snapshot(&self) -> &[ConnectorState] {
        &self.connectors
    }

    /// Restore a previously persisted arena when the shape still matches.
    pub fn restore(&mut self, snapshot: Vec<ConnectorState>) {
        if snapshot.len() == self.connectors.len() {
            self.connectors = snapshot;
        } else {
            warn!(
                expected = self.connectors.len(),
                got = snapshot.len(),
                "discarding connector snapshot with mismatched arena size"
            );
        }
    }

    pub fn set_status(&mut self, connector_id: u32, status: ChargePointStatus) {
        if let Some(connector) = self.get_mut(connector_id) {
            if connector.status != status {
                debug!(connector_id, from = ?connector.status, to = ?status, "connector status change");
            }
            connector.status = status;
        }
    }

    /// Record a transaction start; resets the transaction energy register
    /// and snapshots the lifetime register as the meter start.
    pub fn begin_transaction(&mut self, connector_id: u32, transaction_id: i32, id_tag: &str) {
        if let Some(connector) = self.get_mut(connector_id) {
            connector.transaction_started = true;
            connector.transaction_id = Some(transaction_id);
            connector.id_tag = Some(id_tag.to_string());
            connector.transaction_meter_start = Some(connector.energy_active_import_register);
            connector.transaction_energy_active_import_register = 0.0;
            connector.reservation = None;
        }
    }

    /// Close the transaction and apply any scheduled availability change.
    /// Returns the availability that was applied, if one was pending.
    pub fn end_transaction(&mut self, connector_id: u32) -> Option<AvailabilityType> {
        let connector = self.get_mut(connector_id)?;
        connector.transaction_started = false;
        connector.transaction_id = None;
        connector.id_tag = None;
        connector.transaction_meter_start = None;
        let pending = connector.scheduled_availability.take();
        if let Some(availability) = pending {
            connector.availability = availability;
        }
        pending
    }

    /// Add an energy delta to both registers. Negative deltas and
    /// registers that have drifted negative are rejected, keeping the
    /// transaction register within `[0, lifetime register]`.
    pub fn add_energy(&mut self, connector_id: u32, delta_wh: f64) {
        if delta_wh < 0.0 {
            warn!(connector_id, delta_wh, "ignoring negative energy delta");
            return;
        }
        if let Some(connector) = self.get_mut(connector_id) {
            if connector.energy_active_import_register >= 0.0
                && connector.transaction_energy_active_import_register >= 0.0
            {
                connector.energy_active_import_register += delta_wh;
                if connector.transaction_started {
                    connector.transaction_energy_active_import_register += delta_wh;
                }
            }
        }
    }

    /// Lifetime energy register of the connector carrying `transaction_id`.
    pub fn energy_register_by_transaction(&self, transaction_id: i32) -> Option<f64> {
        self.connectors
            .iter()
            .find(|c| c.transaction_id == Some(transaction_id))
            .map(|c| c.energy_active_import_register)
    }

    /// Connector carrying the given transaction.
    pub fn find_by_transaction(&self, transaction_id: i32) -> Option<u32> {
        self.connectors
            .iter()
            .position(|c| c.transaction_id == Some(transaction_id))
            .map(|index| index as u32)
    }

    /// Install a profile, replacing in place any entry with the same
    /// `chargingProfileId` or the same `(stackLevel, purpose)` pair.
    pub fn install_profile(&mut self, connector_id: u32, profile: ChargingProfile) {
        let Some(connector) = self.get_mut(connector_id) else { return };
        let slot = connector.charging_profiles.iter().position(|existing| {
            existing.charging_profile_id == profile.charging_profile_id
                || (existing.stack_level == profile.stack_level
                    && existing.charging_profile_purpose == profile.charging_profile_purpose)
        });
        match slot {
            Some(index) => {
                debug!(
                    connector_id,
                    profile_id = profile.charging_profile_id,
                    "replacing charging profile in place"
                );
                connector.charging_profiles[index] = profile;
            }
            None => connector.charging_profiles.push(profile),
        }
    }

    /// Remove matching profiles from one connector. True iff at least one
    /// profile was removed.
    pub fn clear_profiles(&mut self, connector_id: u32, filter: &ProfileFilter) -> bool {
        let Some(connector) = self.get_mut(connector_id) else { return false };
        let before = connector.charging_profiles.len();
        connector.charging_profiles.retain(|profile| !filter.matches(profile));
        connector.charging_profiles.len() != before
    }

    /// Remove matching profiles from every connector, index 0 included.
    pub fn clear_profiles_everywhere(&mut self, filter: &ProfileFilter) -> bool {
        let ids: Vec<u32> = (0..self.connectors.len() as u32).collect();
        let mut cleared = false;
        for id in ids {
            cleared |= self.clear_profiles(id, filter);
        }
        cleared
    }

    pub fn set_reservation(&mut self, connector_id: u32, reservation: Reservation) {
        if let Some(connector) = self.get_mut(connector_id) {
            connector.reservation = Some(reservation);
        }
    }

    /// Find the connector holding a reservation with the given id.
    pub fn find_reservation(&self, reservation_id: i32) -> Option<u32> {
        self.connectors
            .iter()
            .position(|c| c.reservation.as_ref().map(|r| r.reservation_id) == Some(reservation_id))
            .map(|index| index as u32)
    }

    pub fn remove_reservation(&mut self, connector_id: u32) -> Option<Reservation> {
        self.get_mut(connector_id).and_then(|c| c.reservation.take())
    }

    /// Drop the connector's reservation when it has expired. Returns true
    /// when an expired reservation was evicted.
    pub fn evict_expired_reservation(&mut self, connector_id: u32, now: DateTime<Utc>) -> bool {
        let Some(connector) = self.get_mut(connector_id) else { return false };
        match &connector.reservation {
            Some(reservation) if reservation.expired_at(now) => {
                debug!(
                    connector_id,
                    reservation_id = reservation.reservation_id,
                    "evicting expired reservation"
                );
                connector.reservation = None;
                if connector.status == ChargePointStatus::Reserved {
                    connector.status = ChargePointStatus::Available;
                }
                true
            }
            _ => false,
        }
    }
}
