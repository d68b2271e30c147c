//! Persistent state.
//!
//! Everything signercrab knows about groups, signers, credentials, provenance and automation
//! progress lives in a single typed [`State`] document. A [`StateStore`] owns the document;
//! two implementations are provided, [`memory::MemoryStateStore`] and
//! [`file::FileStateStore`]. The former is not durable across restarts. The latter writes
//! the document to disk as JSON whenever it changed and loads it again on startup.
//!
//! The document can also be inspected (and partially edited) as flat `key -> value` entries,
//! see [`conf`].

use crate::automate::Stage;
use crate::error::Error;
use crate::updater::UpdaterKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;
use trust_dns_client::rr::LowerName;

pub mod conf;
pub mod file;
pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use file::FileStateStore;
#[allow(clippy::module_name_repetitions)]
pub use memory::MemoryStateStore;

/// TTL of synthesized records when a group doesn't configure one.
pub const DEFAULT_GROUP_TTL: u32 = 300;

fn default_group_ttl() -> u32 {
    DEFAULT_GROUP_TTL
}

/// The per-category results of the last status evaluation of a group.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncFlags {
    pub dnskeys: bool,
    pub cdscdnskeys: bool,
    pub parent_ds: bool,
    pub nses: bool,
    pub parent_ns: bool,
}

/// Names one of the [`SyncFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFlag {
    Dnskeys,
    Cdscdnskeys,
    ParentDs,
    Nses,
    ParentNs,
}

impl SyncFlag {
    pub const ALL: [SyncFlag; 5] = [
        SyncFlag::Dnskeys,
        SyncFlag::Cdscdnskeys,
        SyncFlag::ParentDs,
        SyncFlag::Nses,
        SyncFlag::ParentNs,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncFlag::Dnskeys => "dnskeys",
            SyncFlag::Cdscdnskeys => "cdscdnskeys",
            SyncFlag::ParentDs => "parent-ds",
            SyncFlag::Nses => "nses",
            SyncFlag::ParentNs => "parent-ns",
        }
    }
}

impl fmt::Display for SyncFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncFlags {
    #[must_use]
    pub fn get(&self, flag: SyncFlag) -> bool {
        match flag {
            SyncFlag::Dnskeys => self.dnskeys,
            SyncFlag::Cdscdnskeys => self.cdscdnskeys,
            SyncFlag::ParentDs => self.parent_ds,
            SyncFlag::Nses => self.nses,
            SyncFlag::ParentNs => self.parent_ns,
        }
    }
}

/// A zone served by a group of signers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Member signer names, in the order they were added.
    #[serde(default)]
    pub signers: Vec<String>,
    /// Address (`host:port`) of a parent zone server.
    pub parent: String,
    #[serde(default)]
    pub stage: Stage,
    /// The message of the failure that moved the group to [`Stage::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub wait_ds: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub wait_ns: Option<OffsetDateTime>,
    /// TTL for synthesized NS and CSYNC records.
    #[serde(default = "default_group_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub synced: SyncFlags,
}

impl Group {
    #[must_use]
    pub fn new(parent: impl Into<String>) -> Self {
        Group {
            signers: Vec::new(),
            parent: parent.into(),
            stage: Stage::Ready,
            error: None,
            wait_ds: None,
            wait_ns: None,
            ttl: DEFAULT_GROUP_TTL,
            synced: SyncFlags::default(),
        }
    }
}

/// An authoritative server for a group's zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub group: LowerName,
    /// `host:port`
    pub address: String,
    /// The name this signer's server is advertised under in the zone's NS set.
    pub nameserver: LowerName,
    #[serde(default)]
    pub kind: UpdaterKind,
    /// Name of the TSIG key (`nsupdate`) or provider token (`desec`) used for updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default)]
    pub leaving: bool,
    /// Combined signing key: all of the signer's keys are synced, not only its ZSKs.
    #[serde(default)]
    pub csk: bool,
}

/// A signer together with its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub signer: Signer,
}

/// The persisted document.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    pub groups: BTreeMap<LowerName, Group>,
    pub signers: BTreeMap<String, Signer>,
    /// TSIG key name -> base64 secret.
    pub tsig_keys: BTreeMap<String, String>,
    /// Provider token name -> token.
    pub desec_tokens: BTreeMap<String, String>,
    /// Key fingerprint -> the signer the key was first observed at.
    pub dnskey_origin: BTreeMap<String, String>,
    /// Nameserver -> the signer the name was first observed at.
    pub ns_origin: BTreeMap<LowerName, String>,
    /// Groups whose automation starts with the daemon.
    pub autostart: Vec<LowerName>,
    pub settings: BTreeMap<String, String>,
}

impl State {
    /// # Errors
    ///
    /// Returns [`Error::NoSuchGroup`] if `zone` isn't a group.
    pub fn group(&self, zone: &LowerName) -> Result<&Group, Error> {
        self.groups
            .get(zone)
            .ok_or_else(|| Error::NoSuchGroup(zone.clone()))
    }

    /// # Errors
    ///
    /// Returns [`Error::NoSuchGroup`] if `zone` isn't a group.
    pub fn group_mut(&mut self, zone: &LowerName) -> Result<&mut Group, Error> {
        self.groups
            .get_mut(zone)
            .ok_or_else(|| Error::NoSuchGroup(zone.clone()))
    }

    /// # Errors
    ///
    /// Returns [`Error::NoSuchSigner`] if there is no signer called `name`.
    pub fn signer(&self, name: &str) -> Result<&Signer, Error> {
        self.signers
            .get(name)
            .ok_or_else(|| Error::NoSuchSigner(name.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`Error::NoSuchSigner`] if there is no signer called `name`.
    pub fn signer_mut(&mut self, name: &str) -> Result<&mut Signer, Error> {
        self.signers
            .get_mut(name)
            .ok_or_else(|| Error::NoSuchSigner(name.to_string()))
    }

    /// The signers of `zone`, in group order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchGroup`] if `zone` isn't a group, and [`Error::NoSuchSigner`] if
    /// the group lists a signer that doesn't exist.
    pub fn members(&self, zone: &LowerName) -> Result<Vec<Member>, Error> {
        self.group(zone)?
            .signers
            .iter()
            .map(|name| {
                Ok(Member {
                    name: name.clone(),
                    signer: self.signer(name)?.clone(),
                })
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns [`Error::GroupExists`] if `zone` is already a group.
    pub fn add_group(&mut self, zone: LowerName, group: Group) -> Result<(), Error> {
        if self.groups.contains_key(&zone) {
            return Err(Error::GroupExists(zone));
        }
        self.groups.insert(zone, group);
        Ok(())
    }

    /// Remove a group that has no signers. It is also dropped from the autostart list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchGroup`] if `zone` isn't a group and [`Error::GroupHasSigners`]
    /// if it still has signers.
    pub fn remove_group(&mut self, zone: &LowerName) -> Result<Group, Error> {
        if !self.group(zone)?.signers.is_empty() {
            return Err(Error::GroupHasSigners(zone.clone()));
        }
        self.autostart.retain(|z| z != zone);
        self.groups
            .remove(zone)
            .ok_or_else(|| Error::NoSuchGroup(zone.clone()))
    }

    /// Add a signer to the group named by `signer.group`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SignerExists`] if the name is taken (signer names are unique across
    /// groups), and [`Error::NoSuchGroup`] if the group doesn't exist.
    pub fn add_signer(&mut self, name: &str, signer: Signer) -> Result<(), Error> {
        if self.signers.contains_key(name) {
            return Err(Error::SignerExists(name.to_string()));
        }
        self.group_mut(&signer.group)?.signers.push(name.to_string());
        self.signers.insert(name.to_string(), signer);
        Ok(())
    }

    /// Remove a signer, its group membership and every provenance entry pointing at it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchSigner`] if there is no signer called `name`.
    pub fn remove_signer(&mut self, name: &str) -> Result<Signer, Error> {
        let signer = self
            .signers
            .remove(name)
            .ok_or_else(|| Error::NoSuchSigner(name.to_string()))?;
        if let Some(group) = self.groups.get_mut(&signer.group) {
            group.signers.retain(|s| s != name);
        }
        self.dnskey_origin.retain(|_, origin| origin != name);
        self.ns_origin.retain(|_, origin| origin != name);
        Ok(signer)
    }

    /// Record `signer` as the origin of the key with fingerprint `fingerprint`, unless an
    /// origin is already recorded. Returns whether an entry was created.
    pub fn record_dnskey_origin(&mut self, fingerprint: String, signer: &str) -> bool {
        if self.dnskey_origin.contains_key(&fingerprint) {
            return false;
        }
        self.dnskey_origin.insert(fingerprint, signer.to_string());
        true
    }

    #[must_use]
    pub fn dnskey_origin(&self, fingerprint: &str) -> Option<&str> {
        self.dnskey_origin.get(fingerprint).map(String::as_str)
    }

    /// Record `signer` as the origin of nameserver `ns` unless one is already recorded.
    /// Returns whether an entry was created.
    pub fn record_ns_origin(&mut self, ns: &LowerName, signer: &str) -> bool {
        if self.ns_origin.contains_key(ns) {
            return false;
        }
        self.ns_origin.insert(ns.clone(), signer.to_string());
        true
    }

    #[must_use]
    pub fn debug_updater(&self) -> bool {
        self.settings
            .get(conf::DEBUG_UPDATER)
            .map_or(false, |v| v == "yes")
    }
}

/// An async trait describing ownership of the [`State`] document.
#[async_trait::async_trait]
pub trait StateStore {
    fn state(&self) -> &State;

    fn state_mut(&mut self) -> &mut State;

    /// Persist the document if it changed since it was last loaded or saved.
    async fn save(&mut self) -> Result<(), Error>;
}

/// `DynStateStore` is a type alias for an owned [`StateStore`]. Exclusive access is provided
/// by the [controller][crate::controller::Controller].
#[allow(clippy::module_name_repetitions)]
pub type DynStateStore = Box<dyn StateStore + Send + Sync>;
