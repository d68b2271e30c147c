//! The application context handed to every operation.
//!
//! A [`Context`] bundles the persisted state with the capabilities operations use to talk to
//! the outside world: the [querier][crate::dns::Querier], the
//! [updater registry][crate::updater::UpdaterRegistry] and the [notifier][Notifier]. It is
//! owned by the [controller][crate::controller::Controller], which serializes access.

use crate::dns::{Answer, DynQuerier};
use crate::error::Error;
use crate::notify::Notifier;
use crate::records::Rtype;
use crate::store::{DynStateStore, Member, State};
use crate::transcript::Transcript;
use crate::updater::{ChangeSet, Credential, UpdateTarget, UpdaterKind, UpdaterRegistry};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::warn;
use trust_dns_client::rr::LowerName;

pub struct Context {
    store: DynStateStore,
    querier: DynQuerier,
    updaters: UpdaterRegistry,
    notifier: Notifier,
}

impl Context {
    #[must_use]
    pub fn new(
        store: DynStateStore,
        querier: DynQuerier,
        updaters: UpdaterRegistry,
        notifier: Notifier,
    ) -> Self {
        Context {
            store,
            querier,
            updaters,
            notifier,
        }
    }

    #[must_use]
    pub fn state(&self) -> &State {
        self.store.state()
    }

    pub fn state_mut(&mut self) -> &mut State {
        self.store.state_mut()
    }

    /// Persist the state if it changed.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the state can't be written.
    pub async fn save(&mut self) -> Result<(), Error> {
        self.store.save().await
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Push the current status of `zone` to observers.
    pub fn publish_status(&self, zone: &LowerName) {
        self.notifier.status(self.store.state(), zone);
    }

    /// Query `server` for the `rtype` records of `zone`.
    ///
    /// # Errors
    ///
    /// Returns the querier's error.
    pub async fn query(&self, server: &str, zone: &LowerName, rtype: Rtype) -> Result<Answer, Error> {
        self.querier.query(server, zone, rtype).await
    }

    /// Apply `changes` for `zone` at a resolved target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpdaterUnsupported`] if the target's kind has no implementation, or
    /// the updater's error.
    pub async fn update(
        &self,
        zone: &LowerName,
        target: &UpdateTarget,
        changes: &ChangeSet,
        out: &mut Transcript,
    ) -> Result<(), Error> {
        self.updaters
            .get(target.kind)?
            .update(zone, target, changes, out)
            .await
    }

    /// Resolve a signer for sending. Configuration problems that only affect this signer
    /// are returned as `Ok(Err(..))` so a caller can report every misconfigured signer before
    /// giving up.
    fn resolve_target(&self, member: &Member) -> Result<Result<UpdateTarget, Error>, Error> {
        let signer = &member.signer;
        if signer.address.is_empty() {
            return Err(Error::MissingAddress(member.name.clone()));
        }
        self.updaters.get(signer.kind)?;

        let Some(cred_name) = &signer.credential else {
            return Ok(Err(Error::MissingCredential(member.name.clone())));
        };
        let state = self.state();
        let credential = match signer.kind {
            UpdaterKind::Nsupdate => {
                let Some(secret) = state.tsig_keys.get(cred_name) else {
                    return Ok(Err(Error::MissingSecret(cred_name.clone())));
                };
                match BASE64.decode(secret) {
                    Ok(secret) => Credential::Tsig {
                        name: cred_name.clone(),
                        secret,
                    },
                    Err(_) => return Ok(Err(Error::InvalidSecret(cred_name.clone()))),
                }
            }
            UpdaterKind::Desec => match state.desec_tokens.get(cred_name) {
                Some(token) => Credential::Token {
                    name: cred_name.clone(),
                    token: token.clone(),
                },
                None => return Ok(Err(Error::MissingSecret(cred_name.clone()))),
            },
        };

        Ok(Ok(UpdateTarget {
            signer: member.name.clone(),
            kind: signer.kind,
            address: signer.address.clone(),
            credential,
            debug: state.debug_updater(),
        }))
    }

    /// Resolve every signer of a multi-signer operation before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingAddress`] or [`Error::UpdaterUnsupported`] for the first signer
    /// with that problem. Signers with credential problems are listed in `out` and the
    /// operation fails with [`Error::SignersMisconfigured`].
    pub fn resolve_targets(
        &self,
        members: &[Member],
        out: &mut Transcript,
    ) -> Result<Vec<UpdateTarget>, Error> {
        let mut targets = Vec::with_capacity(members.len());
        let mut skipped = 0;
        for member in members {
            match self.resolve_target(member)? {
                Ok(target) => targets.push(target),
                Err(err) => {
                    warn!(signer = %member.name, %err, "signer misconfigured");
                    out.line(format!("Skipping signer {}: {err}", member.name));
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            return Err(Error::SignersMisconfigured(skipped));
        }
        Ok(targets)
    }
}
