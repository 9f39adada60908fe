//! Feature-profile gate.
//!
//! A station advertises a set of OCPP 1.6 feature profiles; every inbound
//! command is checked against that set before any state is touched. The
//! check is pure set membership and has no side effects beyond a warning
//! log on rejection.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// OCPP 1.6 feature profiles a station can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureProfile {
    Core,
    FirmwareManagement,
    LocalAuthListManagement,
    Reservation,
    SmartCharging,
    RemoteTrigger,
}

impl std::fmt::Display for FeatureProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FeatureProfile::Core => "Core",
            FeatureProfile::FirmwareManagement => "FirmwareManagement",
            FeatureProfile::LocalAuthListManagement => "LocalAuthListManagement",
            FeatureProfile::Reservation => "Reservation",
            FeatureProfile::SmartCharging => "SmartCharging",
            FeatureProfile::RemoteTrigger => "RemoteTrigger",
        };
        f.write_str(name)
    }
}

/// Gate over the station's enabled feature profiles.
#[derive(Debug, Clone)]
pub struct FeatureGate {
    enabled: HashSet<FeatureProfile>,
}

impl FeatureGate {
    pub fn new(enabled: impl IntoIterator<Item = FeatureProfile>) -> Self {
        Self { enabled: enabled.into_iter().collect() }
    }

    /// True iff the profile is enabled. Logs a warning naming the command
    /// and the missing profile otherwise.
    pub fn check(&self, profile: FeatureProfile, command: &str) -> bool {
        let enabled = self.enabled.contains(&profile);
        if !enabled {
            warn!(command, %profile, "command rejected: feature profile not enabled");
        }
        enabled
    }

    pub fn enabled(&self) -> &HashSet<FeatureProfile> {
        &self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_is_pure_membership() {
        let gate = FeatureGate::new([FeatureProfile::Core, FeatureProfile::SmartCharging]);

        assert!(gate.check(FeatureProfile::Core, "RemoteStartTransaction"));
        assert!(gate.check(FeatureProfile::SmartCharging, "SetChargingProfile"));
        assert!(!gate.check(FeatureProfile::Reservation, "ReserveNow"));
        assert!(!gate.check(FeatureProfile::RemoteTrigger, "TriggerMessage"));
    }

    #[test]
    fn rejection_does_not_mutate_the_gate() {
        let gate = FeatureGate::new([FeatureProfile::Core]);
        assert!(!gate.check(FeatureProfile::Reservation, "ReserveNow"));
        assert_eq!(gate.enabled().len(), 1);
    }
}
