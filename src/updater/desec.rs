//! deSEC REST API updater.

use crate::error::Error;
use crate::transcript::Transcript;
use crate::updater::{ChangeSet, UpdateTarget, Updater, UpdaterKind};
use trust_dns_client::rr::LowerName;

/// Placeholder for the [deSEC](https://desec.io) provider. Signers may be configured with the
/// `desec` type and a token, but every update fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesecUpdater;

#[async_trait::async_trait]
impl Updater for DesecUpdater {
    fn check(&self) -> Result<(), Error> {
        Err(Error::UpdaterUnsupported(UpdaterKind::Desec))
    }

    async fn update(
        &self,
        _zone: &LowerName,
        _target: &UpdateTarget,
        _changes: &ChangeSet,
        _out: &mut Transcript,
    ) -> Result<(), Error> {
        Err(Error::UpdaterUnsupported(UpdaterKind::Desec))
    }
}
