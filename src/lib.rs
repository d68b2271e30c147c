//! Signer Crab
//!
//! Orchestration of multi-signer DNSSEC ([RFC-8901]) operator transitions.
//!
//! A group of independently operated authoritative servers (signers) serves one zone. When a
//! signer joins or leaves the group, their DNSKEY, CDS/CDNSKEY and NS records have to be
//! brought in line with each other and with the DS and NS records at the parent, in an order
//! that keeps the zone resolvable and validatable throughout. Signer Crab observes the
//! signers and the parent over DNS, computes what is out of sync, fixes it with TSIG signed
//! dynamic updates ([RFC-2136]) and walks the join and leave protocols as a persistent state
//! machine, waiting out TTLs where caches have to drain.
//!
//! [RFC-8901]: https://www.rfc-editor.org/rfc/rfc8901
//! [RFC-2136]: https://www.rfc-editor.org/rfc/rfc2136
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod automate;
pub mod commands;
pub mod config;
pub mod context;
pub mod controller;
pub mod dns;
pub mod error;
pub mod notify;
pub mod records;
pub mod remote;
pub mod signals;
pub mod status;
pub mod store;
pub mod sync;
pub mod transcript;
pub mod updater;
pub mod wait;

pub use config::{Config, Shared};
pub use context::Context;
pub use controller::{Controller, Mode};
pub use store::{FileStateStore, MemoryStateStore};
pub use transcript::Transcript;
