use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The automation stage of a group.
///
/// A group rests in [`Stage::Ready`] (or [`Stage::Manual`], or [`Stage::Error`]) and walks the
/// join or leave sequence when its membership changes:
///
/// ```text
/// join:  join-sync-dnskeys -> join-dnskeys-synced -> join-sync-cdscdnskeys ->
///        join-cdscdnskeys-synced -> join-parent-ds-synced -> join-remove-cdscdnskeys ->
///        join-wait-ds -> join-sync-nses -> join-nses-synced -> join-add-csync ->
///        join-parent-ns-synced -> join-remove-csync -> ready
/// leave: leave-sync-nses -> leave-nses-synced -> leave-add-csync -> leave-parent-ns-synced ->
///        leave-remove-csync -> leave-wait-ns -> leave-sync-dnskeys -> leave-dnskeys-synced ->
///        leave-sync-cdscdnskeys -> leave-cdscdnskeys-synced -> leave-parent-ds-synced ->
///        leave-remove-cdscdnskeys -> ready
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    #[default]
    Ready,
    Manual,
    Error,

    JoinSyncDnskeys,
    JoinDnskeysSynced,
    JoinSyncCdscdnskeys,
    JoinCdscdnskeysSynced,
    JoinParentDsSynced,
    JoinRemoveCdscdnskeys,
    JoinWaitDs,
    JoinSyncNses,
    JoinNsesSynced,
    JoinAddCsync,
    JoinParentNsSynced,
    JoinRemoveCsync,

    LeaveSyncNses,
    LeaveNsesSynced,
    LeaveAddCsync,
    LeaveParentNsSynced,
    LeaveRemoveCsync,
    LeaveWaitNs,
    LeaveSyncDnskeys,
    LeaveDnskeysSynced,
    LeaveSyncCdscdnskeys,
    LeaveCdscdnskeysSynced,
    LeaveParentDsSynced,
    LeaveRemoveCdscdnskeys,
}

impl Stage {
    /// Every stage, in protocol order.
    pub const ALL: [Stage; 27] = [
        Stage::Ready,
        Stage::Manual,
        Stage::Error,
        Stage::JoinSyncDnskeys,
        Stage::JoinDnskeysSynced,
        Stage::JoinSyncCdscdnskeys,
        Stage::JoinCdscdnskeysSynced,
        Stage::JoinParentDsSynced,
        Stage::JoinRemoveCdscdnskeys,
        Stage::JoinWaitDs,
        Stage::JoinSyncNses,
        Stage::JoinNsesSynced,
        Stage::JoinAddCsync,
        Stage::JoinParentNsSynced,
        Stage::JoinRemoveCsync,
        Stage::LeaveSyncNses,
        Stage::LeaveNsesSynced,
        Stage::LeaveAddCsync,
        Stage::LeaveParentNsSynced,
        Stage::LeaveRemoveCsync,
        Stage::LeaveWaitNs,
        Stage::LeaveSyncDnskeys,
        Stage::LeaveDnskeysSynced,
        Stage::LeaveSyncCdscdnskeys,
        Stage::LeaveCdscdnskeysSynced,
        Stage::LeaveParentDsSynced,
        Stage::LeaveRemoveCdscdnskeys,
    ];

    pub const JOIN: Stage = Stage::JoinSyncDnskeys;
    pub const LEAVE: Stage = Stage::LeaveSyncNses;

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ready => "ready",
            Stage::Manual => "manual",
            Stage::Error => "error",
            Stage::JoinSyncDnskeys => "join-sync-dnskeys",
            Stage::JoinDnskeysSynced => "join-dnskeys-synced",
            Stage::JoinSyncCdscdnskeys => "join-sync-cdscdnskeys",
            Stage::JoinCdscdnskeysSynced => "join-cdscdnskeys-synced",
            Stage::JoinParentDsSynced => "join-parent-ds-synced",
            Stage::JoinRemoveCdscdnskeys => "join-remove-cdscdnskeys",
            Stage::JoinWaitDs => "join-wait-ds",
            Stage::JoinSyncNses => "join-sync-nses",
            Stage::JoinNsesSynced => "join-nses-synced",
            Stage::JoinAddCsync => "join-add-csync",
            Stage::JoinParentNsSynced => "join-parent-ns-synced",
            Stage::JoinRemoveCsync => "join-remove-csync",
            Stage::LeaveSyncNses => "leave-sync-nses",
            Stage::LeaveNsesSynced => "leave-nses-synced",
            Stage::LeaveAddCsync => "leave-add-csync",
            Stage::LeaveParentNsSynced => "leave-parent-ns-synced",
            Stage::LeaveRemoveCsync => "leave-remove-csync",
            Stage::LeaveWaitNs => "leave-wait-ns",
            Stage::LeaveSyncDnskeys => "leave-sync-dnskeys",
            Stage::LeaveDnskeysSynced => "leave-dnskeys-synced",
            Stage::LeaveSyncCdscdnskeys => "leave-sync-cdscdnskeys",
            Stage::LeaveCdscdnskeysSynced => "leave-cdscdnskeys-synced",
            Stage::LeaveParentDsSynced => "leave-parent-ds-synced",
            Stage::LeaveRemoveCdscdnskeys => "leave-remove-cdscdnskeys",
        }
    }

    /// The stage entered when this stage's work completes (or its check passes). Resting
    /// stages map to themselves.
    #[must_use]
    pub fn next(self) -> Stage {
        match self {
            Stage::Ready | Stage::Manual | Stage::Error => self,

            Stage::JoinSyncDnskeys => Stage::JoinDnskeysSynced,
            Stage::JoinDnskeysSynced => Stage::JoinSyncCdscdnskeys,
            Stage::JoinSyncCdscdnskeys => Stage::JoinCdscdnskeysSynced,
            Stage::JoinCdscdnskeysSynced => Stage::JoinParentDsSynced,
            Stage::JoinParentDsSynced => Stage::JoinRemoveCdscdnskeys,
            Stage::JoinRemoveCdscdnskeys => Stage::JoinWaitDs,
            Stage::JoinWaitDs => Stage::JoinSyncNses,
            Stage::JoinSyncNses => Stage::JoinNsesSynced,
            Stage::JoinNsesSynced => Stage::JoinAddCsync,
            Stage::JoinAddCsync => Stage::JoinParentNsSynced,
            Stage::JoinParentNsSynced => Stage::JoinRemoveCsync,
            Stage::JoinRemoveCsync => Stage::Ready,

            Stage::LeaveSyncNses => Stage::LeaveNsesSynced,
            Stage::LeaveNsesSynced => Stage::LeaveAddCsync,
            Stage::LeaveAddCsync => Stage::LeaveParentNsSynced,
            Stage::LeaveParentNsSynced => Stage::LeaveRemoveCsync,
            Stage::LeaveRemoveCsync => Stage::LeaveWaitNs,
            Stage::LeaveWaitNs => Stage::LeaveSyncDnskeys,
            Stage::LeaveSyncDnskeys => Stage::LeaveDnskeysSynced,
            Stage::LeaveDnskeysSynced => Stage::LeaveSyncCdscdnskeys,
            Stage::LeaveSyncCdscdnskeys => Stage::LeaveCdscdnskeysSynced,
            Stage::LeaveCdscdnskeysSynced => Stage::LeaveParentDsSynced,
            Stage::LeaveParentDsSynced => Stage::LeaveRemoveCdscdnskeys,
            Stage::LeaveRemoveCdscdnskeys => Stage::Ready,
        }
    }

    /// The stage entered when this stage's check fails. Internal sync checks go back to the
    /// stage that performs the sync; parent checks wait for the parent operator and stay.
    #[must_use]
    pub fn retry(self) -> Stage {
        match self {
            Stage::JoinDnskeysSynced => Stage::JoinSyncDnskeys,
            Stage::JoinCdscdnskeysSynced => Stage::JoinSyncCdscdnskeys,
            Stage::JoinNsesSynced => Stage::JoinSyncNses,
            Stage::LeaveNsesSynced => Stage::LeaveSyncNses,
            Stage::LeaveDnskeysSynced => Stage::LeaveSyncDnskeys,
            Stage::LeaveCdscdnskeysSynced => Stage::LeaveSyncCdscdnskeys,
            _ => self,
        }
    }

    /// Whether the group is walking the join or leave sequence.
    #[must_use]
    pub fn in_progress(self) -> bool {
        !matches!(self, Stage::Ready | Stage::Manual | Stage::Error)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| Error::InvalidStage(s.to_string()))
    }
}
