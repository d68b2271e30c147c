//! TSIG signed DNS UPDATE ([RFC-2136][RFC-2136], [RFC-8945][RFC-8945]) over TCP.
//!
//! The message is signed when it is sent, and the TSIG of the response is verified against
//! the same key.
//!
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136
//! [RFC-8945]: https://www.rfc-editor.org/rfc/rfc8945

use crate::dns::client::{delete_rr, delete_rrset, exchange, record_from_rr};
use crate::error::Error;
use crate::transcript::Transcript;
use crate::updater::{ChangeSet, Credential, UpdateTarget, Updater};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use trust_dns_client::client::Signer;
use trust_dns_client::op::{Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_client::rr::dnssec::tsig::TSigner;
use trust_dns_client::rr::{DNSClass, LowerName, Name, RecordType};
use trust_dns_proto::rr::dnssec::rdata::tsig::TsigAlgorithm;

/// Allowed clock skew between us and the signer, in seconds.
const TSIG_FUDGE: u16 = 300;

#[derive(Debug, Clone)]
pub struct NsUpdater {
    timeout: Duration,
}

impl NsUpdater {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        NsUpdater { timeout }
    }
}

/// Build the unsigned UPDATE message. RRset deletions come first, then single record
/// deletions, then additions, so a deleted RRset can be replaced in one message.
fn update_message(zone: &LowerName, changes: &ChangeSet) -> Result<Message, Error> {
    let mut zone_query = Query::query(zone.into(), RecordType::SOA);
    zone_query.set_query_class(DNSClass::IN);

    let mut message = Message::new();
    message
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Update)
        .set_recursion_desired(false);
    message.add_query(zone_query);

    for rtype in &changes.remove_rrsets {
        message.add_name_server(delete_rrset(zone, *rtype));
    }
    for rr in &changes.removes {
        message.add_name_server(delete_rr(zone, rr)?);
    }
    for rr in &changes.inserts {
        message.add_name_server(record_from_rr(zone, rr)?);
    }
    Ok(message)
}

fn signer(name: &str, secret: &[u8]) -> Result<Signer, Error> {
    let key_name = Name::from_str(name).map_err(|err| Error::InvalidName(name.to_string(), err))?;
    let tsig = TSigner::new(
        secret.to_vec(),
        TsigAlgorithm::HmacSha256,
        key_name,
        TSIG_FUDGE,
    )?;
    Ok(Signer::from(tsig))
}

#[async_trait::async_trait]
impl Updater for NsUpdater {
    async fn update(
        &self,
        zone: &LowerName,
        target: &UpdateTarget,
        changes: &ChangeSet,
        out: &mut Transcript,
    ) -> Result<(), Error> {
        if changes.is_empty() {
            return Err(Error::EmptyUpdate);
        }
        let Credential::Tsig { name, secret } = &target.credential else {
            return Err(Error::MissingCredential(target.signer.clone()));
        };

        let message = update_message(zone, changes)?;
        let signer = signer(name, secret)?;

        if target.debug {
            out.line(format!("debug-updater: request to {}:", target.signer));
            out.line(format!("{message:?}"));
        }
        debug!(signer = %target.signer, address = %target.address, %zone, "sending update");

        let response = exchange(&target.address, message, signer, self.timeout).await?;

        if target.debug {
            out.line(format!("debug-updater: response from {}:", target.signer));
            out.line(format!("{:?}", *response));
        }

        let rcode = response.response_code();
        if rcode != ResponseCode::NoError {
            return Err(Error::UpdateRejected {
                server: target.signer.clone(),
                rcode: rcode.to_string(),
            });
        }
        info!(
            signer = %target.signer,
            %zone,
            inserts = changes.inserts.len(),
            removes = changes.removes.len() + changes.remove_rrsets.len(),
            "update applied"
        );
        Ok(())
    }
}
