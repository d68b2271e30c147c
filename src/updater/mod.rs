//! Authenticated record updates.
//!
//! Every signer names an [`UpdaterKind`]. The [`UpdaterRegistry`] maps each kind to an
//! [`Updater`] implementation. [`nsupdate::NsUpdater`] sends TSIG signed
//! [RFC-2136][RFC-2136] dynamic updates; [`desec::DesecUpdater`] is registered for the deSEC
//! REST provider but has no implementation yet.
//!
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136

use crate::error::Error;
use crate::records::{Rr, Rtype};
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_client::rr::LowerName;

pub mod desec;
pub mod nsupdate;

pub use desec::DesecUpdater;
pub use nsupdate::NsUpdater;

/// The mechanism used to update a signer's zone content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdaterKind {
    #[default]
    Nsupdate,
    Desec,
}

impl UpdaterKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpdaterKind::Nsupdate => "nsupdate",
            UpdaterKind::Desec => "desec",
        }
    }
}

impl fmt::Display for UpdaterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdaterKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nsupdate" => Ok(UpdaterKind::Nsupdate),
            "desec" => Ok(UpdaterKind::Desec),
            _ => Err(Error::InvalidArgument {
                what: "signer type",
                value: s.to_string(),
            }),
        }
    }
}

/// The resolved credential used to authenticate an update.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// A TSIG key: key name and decoded secret.
    Tsig { name: String, secret: Vec<u8> },
    /// A provider API token.
    Token { name: String, token: String },
}

impl Credential {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Credential::Tsig { name, .. } | Credential::Token { name, .. } => name,
        }
    }
}

// Secrets stay out of logs and transcripts.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Tsig { name, .. } => write!(f, "Tsig({name})"),
            Credential::Token { name, .. } => write!(f, "Token({name})"),
        }
    }
}

/// A signer resolved for sending: where to send to and how to authenticate.
#[derive(Debug, Clone)]
pub struct UpdateTarget {
    pub signer: String,
    pub kind: UpdaterKind,
    /// `host:port`
    pub address: String,
    pub credential: Credential,
    /// Append the request and response messages to the transcript.
    pub debug: bool,
}

/// The changes to apply to one zone at one signer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub inserts: Vec<Rr>,
    pub removes: Vec<Rr>,
    pub remove_rrsets: Vec<Rtype>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rr: Rr) -> &mut Self {
        self.inserts.push(rr);
        self
    }

    pub fn remove(&mut self, rr: Rr) -> &mut Self {
        self.removes.push(rr);
        self
    }

    pub fn remove_rrset(&mut self, rtype: Rtype) -> &mut Self {
        self.remove_rrsets.push(rtype);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.removes.is_empty() && self.remove_rrsets.is_empty()
    }
}

/// An async trait describing how to apply a [`ChangeSet`] for `zone` at a signer.
#[async_trait::async_trait]
pub trait Updater {
    /// Check that this updater can be used at all. Called for every target before any update
    /// of a multi-signer operation is sent.
    fn check(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Apply `changes` at `target`. Output lines (e.g. debug dumps) go to `out`.
    async fn update(
        &self,
        zone: &LowerName,
        target: &UpdateTarget,
        changes: &ChangeSet,
        out: &mut Transcript,
    ) -> Result<(), Error>;
}

/// `DynUpdater` is a type alias for a shareable [`Updater`].
pub type DynUpdater = Arc<dyn Updater + Send + Sync>;

/// Maps each [`UpdaterKind`] to its implementation.
#[derive(Clone, Default)]
pub struct UpdaterRegistry {
    updaters: HashMap<UpdaterKind, DynUpdater>,
}

impl UpdaterRegistry {
    /// An empty registry. Every lookup fails until updaters are registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by the binary: DNS UPDATE for `nsupdate`, and the deSEC stub.
    #[must_use]
    pub fn with_defaults(timeout: Duration) -> Self {
        let mut registry = Self::new();
        registry
            .register(UpdaterKind::Nsupdate, Arc::new(NsUpdater::new(timeout)))
            .register(UpdaterKind::Desec, Arc::new(DesecUpdater));
        registry
    }

    pub fn register(&mut self, kind: UpdaterKind, updater: DynUpdater) -> &mut Self {
        self.updaters.insert(kind, updater);
        self
    }

    /// The updater for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpdaterUnsupported`] if nothing is registered for `kind`, or the
    /// registered updater fails its [check][Updater::check].
    pub fn get(&self, kind: UpdaterKind) -> Result<&DynUpdater, Error> {
        let updater = self
            .updaters
            .get(&kind)
            .ok_or(Error::UpdaterUnsupported(kind))?;
        updater.check()?;
        Ok(updater)
    }
}

impl fmt::Debug for UpdaterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.updaters.keys()).finish()
    }
}
