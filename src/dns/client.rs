use crate::dns::{Answer, Querier};
use crate::error::Error;
use crate::records::{RecordData, Rr, Rtype};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;
use trust_dns_client::client::{AsyncClient, ClientHandle, Signer};
use trust_dns_client::op::Message;
use trust_dns_client::proto::error::ProtoError;
use trust_dns_client::rr::{DNSClass, LowerName, Name, RData, Record, RecordType};
use trust_dns_client::tcp::TcpClientStream;
use trust_dns_proto::iocompat::AsyncIoTokioAsStd;
use trust_dns_proto::rr::dnssec::rdata::DNSSECRData;
use trust_dns_proto::xfer::{DnsHandle, DnsResponse, FirstAnswer};

/// A [`Querier`] sending each query over a fresh TCP connection. TCP avoids truncation of
/// large DNSKEY answers.
#[derive(Debug, Clone)]
pub struct TcpQuerier {
    timeout: Duration,
}

impl TcpQuerier {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        TcpQuerier { timeout }
    }
}

#[async_trait::async_trait]
impl Querier for TcpQuerier {
    async fn query(&self, server: &str, zone: &LowerName, rtype: Rtype) -> Result<Answer, Error> {
        let addr = resolve(server).await?;
        let name: Name = zone.into();
        let exchange = async {
            let (mut client, bg) = connect(addr, self.timeout, None).await?;
            let response = client
                .query(name, DNSClass::IN, RecordType::from(rtype))
                .await;
            bg.abort();
            response
        };
        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::transport(server, "timed out"))?
            .map_err(|err| Error::transport(server, err))?;

        debug!(%server, %zone, %rtype, answers = response.answers().len(), "query answered");

        let sections = match rtype {
            Rtype::Ns => [response.answers(), response.name_servers()],
            _ => [response.answers(), &[][..]],
        };
        let records = sections
            .into_iter()
            .flatten()
            .filter(|record| LowerName::new(record.name()) == *zone)
            .filter_map(rr_from_record)
            .filter(|rr| rr.data.rtype() == rtype)
            .collect();
        Ok(Answer { records })
    }
}

async fn resolve(server: &str) -> Result<SocketAddr, Error> {
    tokio::net::lookup_host(server)
        .await
        .map_err(|err| Error::transport(server, err))?
        .next()
        .ok_or_else(|| Error::transport(server, "no address"))
}

/// Open a TCP client to `addr`. Messages that need signing (updates) are signed with
/// `signer`, whose signature on the response is verified as well. The returned task drives
/// the connection and is aborted by the caller once it's done.
async fn connect(
    addr: SocketAddr,
    timeout: Duration,
    signer: Option<Signer>,
) -> Result<(AsyncClient, JoinHandle<Result<(), ProtoError>>), ProtoError> {
    let (stream, sender) =
        TcpClientStream::<AsyncIoTokioAsStd<TcpStream>>::with_timeout(addr, timeout);
    let (client, bg) =
        AsyncClient::with_timeout(stream, sender, timeout, signer.map(Arc::new)).await?;
    Ok((client, tokio::spawn(bg)))
}

/// Convert a received record into the typed model. Returns `None` for record types the
/// reconciliation doesn't look at.
pub(crate) fn rr_from_record(record: &Record) -> Option<Rr> {
    let data = match record.data()? {
        RData::NS(ns) => RecordData::Ns(LowerName::new(ns)),
        RData::SOA(soa) => RecordData::Soa {
            serial: soa.serial(),
        },
        RData::DNSSEC(DNSSECRData::DNSKEY(key)) => RecordData::Dnskey(key.clone().into()),
        RData::DNSSEC(DNSSECRData::CDNSKEY(key)) => RecordData::Cdnskey(key.clone().into()),
        RData::DNSSEC(DNSSECRData::DS(ds)) => RecordData::Ds(ds.clone().into()),
        RData::DNSSEC(DNSSECRData::CDS(ds)) => RecordData::Cds(ds.clone().into()),
        _ => return None,
    };
    Some(Rr::new(record.ttl(), data))
}

/// Build the record sent in an update for `rr` at the zone apex.
pub(crate) fn record_from_rr(zone: &LowerName, rr: &Rr) -> Result<Record, Error> {
    let rdata = match &rr.data {
        RecordData::Ns(ns) => RData::NS(ns.into()),
        RecordData::Dnskey(key) => RData::DNSSEC(DNSSECRData::DNSKEY(key.clone().into())),
        RecordData::Cdnskey(key) => RData::DNSSEC(DNSSECRData::CDNSKEY(key.clone().into())),
        RecordData::Ds(ds) => RData::DNSSEC(DNSSECRData::DS(ds.clone().into())),
        RecordData::Cds(ds) => RData::DNSSEC(DNSSECRData::CDS(ds.clone().into())),
        RecordData::Csync(csync) => RData::CSYNC(csync.to_rdata()),
        RecordData::Soa { .. } => return Err(Error::MalformedRecord("SOA")),
    };
    let mut record = Record::with(zone.into(), rr.data.rtype().into(), rr.ttl);
    record.set_data(Some(rdata));
    Ok(record)
}

/// An update section entry deleting one specific record ([RFC-2136 2.5.4](https://www.rfc-editor.org/rfc/rfc2136#section-2.5.4)).
pub(crate) fn delete_rr(zone: &LowerName, rr: &Rr) -> Result<Record, Error> {
    let mut record = record_from_rr(zone, rr)?;
    record.set_dns_class(DNSClass::NONE);
    record.set_ttl(0);
    Ok(record)
}

/// An update section entry deleting a whole RRset ([RFC-2136 2.5.2](https://www.rfc-editor.org/rfc/rfc2136#section-2.5.2)).
pub(crate) fn delete_rrset(zone: &LowerName, rtype: Rtype) -> Record {
    let mut record = Record::with(zone.into(), rtype.into(), 0);
    record.set_dns_class(DNSClass::ANY);
    record
}

/// Send a prepared message to `server` and wait for the response, signing it with `signer`.
pub(crate) async fn exchange(
    server: &str,
    message: Message,
    signer: Signer,
    timeout: Duration,
) -> Result<DnsResponse, Error> {
    let addr = resolve(server).await?;
    let exchange = async {
        let (mut client, bg) = connect(addr, timeout, Some(signer)).await?;
        let response = client.send(message).first_answer().await;
        bg.abort();
        response
    };
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| Error::transport(server, "timed out"))?
        .map_err(|err| Error::transport(server, err))
}
