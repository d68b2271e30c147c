//! DNS query capability.
//!
//! The reconciliation logic only needs to ask a server (a signer, or the parent) for the
//! records of one type at the zone apex. [`Querier`] describes that capability;
//! [`TcpQuerier`] implements it with a [`trust_dns_client`] TCP client.
//!
//! Answers are converted into the typed [`records`][crate::records] model. Records of other
//! types, or at other owners, are dropped. For NS queries the authority section is included
//! as well since a parent answers with a referral rather than an authoritative answer.

pub mod client;

use crate::error::Error;
use crate::records::{Rr, Rtype};
use trust_dns_client::rr::LowerName;

pub use client::TcpQuerier;

/// The typed records returned for a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    pub records: Vec<Rr>,
}

impl Answer {
    /// The largest TTL among the answer records, `0` for an empty answer.
    #[must_use]
    pub fn max_ttl(&self) -> u32 {
        self.records.iter().map(|rr| rr.ttl).max().unwrap_or(0)
    }
}

/// An async trait describing a query for the records of `rtype` at `zone`, sent to the server
/// at `server` (`host:port`).
#[async_trait::async_trait]
pub trait Querier {
    async fn query(&self, server: &str, zone: &LowerName, rtype: Rtype) -> Result<Answer, Error>;
}

/// `DynQuerier` is a type alias for a shareable [`Querier`].
pub type DynQuerier = std::sync::Arc<dyn Querier + Send + Sync>;
