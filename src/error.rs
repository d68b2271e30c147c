//! Error types.

use crate::automate::Stage;
use crate::updater::UpdaterKind;
use std::net::IpAddr;
use trust_dns_client::proto::error::ProtoError;
use trust_dns_client::rr::LowerName;

/// Coarse classification of an [`Error`], used to decide how a failure is surfaced (e.g. the
/// HTTP status returned by the [RPC API][crate::api]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid arguments, unknown entities, or an entity in the wrong state for the
    /// requested operation. Never persisted as an automation fault.
    Validation,
    /// A signer or group is missing an address or credential.
    Configuration,
    /// A query or update to a DNS server failed.
    Transport,
    /// The configured state is internally inconsistent, e.g. a signer uses an updater kind with
    /// no implementation.
    Protocol,
    /// Loading or saving persisted state failed.
    Storage,
}

/// Error enumerates the possible signercrab error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a command is called with too few arguments. Holds the usage text.
    #[error("requires {0}")]
    Usage(&'static str),

    /// Returned for a command name that isn't in the [command table][crate::commands].
    #[error("command does not exist: {0}")]
    UnknownCommand(String),

    /// Returned when a command that only makes sense in the long running daemon (e.g.
    /// `automate-start`) is called locally, or a local-only command is sent to the daemon.
    #[error("{0} can only be used while running as a daemon")]
    DaemonOnly(&'static str),

    /// Returned when a command that can't be executed remotely (e.g. `daemon`) is received
    /// over RPC.
    #[error("{0} can not be called remotely")]
    NoRemoteCall(String),

    /// Returned when a zone name argument isn't fully qualified.
    #[error("not a fully qualified name: \"{0}\"")]
    NotFQDN(String),

    /// Returned when a name argument can't be parsed as a domain name.
    #[error("invalid domain name \"{0}\": {1}")]
    InvalidName(String, ProtoError),

    /// Returned when an argument isn't one of the accepted values.
    #[error("invalid value \"{value}\" for {what}")]
    InvalidArgument { what: &'static str, value: String },

    #[error("group {0} does not exist")]
    NoSuchGroup(LowerName),

    #[error("group {0} already exists")]
    GroupExists(LowerName),

    #[error("group {0} has signers")]
    GroupHasSigners(LowerName),

    #[error("group {0} has no signers")]
    GroupHasNoSigners(LowerName),

    #[error("automation for group {0} is running")]
    AutomationRunning(LowerName),

    #[error("automation for group {0} is not running")]
    AutomationNotRunning(LowerName),

    #[error("signer {0} does not exist")]
    NoSuchSigner(String),

    #[error("signer {0} already exists")]
    SignerExists(String),

    /// Returned by `signer-remove` for a signer that hasn't been marked as leaving.
    #[error("signer {0} is not marked as leaving")]
    SignerNotLeaving(String),

    /// Returned when an operation requires the group to be in a specific stage.
    #[error("group {0} is in stage {1}, expected {2}")]
    WrongStage(LowerName, Stage, &'static str),

    /// Returned when an automation stage name given by the operator isn't one of the
    /// enumerated stages.
    #[error("invalid stage {0}")]
    InvalidStage(String),

    /// Returned by `conf-set`/`conf-remove` for keys that are managed through their own
    /// commands, or that aren't known at all.
    #[error("config key {0} is not writable")]
    ReadOnlyKey(String),

    #[error("no ip|host for signer {0}")]
    MissingAddress(String),

    #[error("signer {0} has no credential configured")]
    MissingCredential(String),

    #[error("missing secret for credential {0}")]
    MissingSecret(String),

    /// Returned when a TSIG secret isn't valid base64.
    #[error("TSIG key {0} has an invalid secret")]
    InvalidSecret(String),

    /// Returned by multi-signer fan-out operations when one or more target signers can't be
    /// updated. The per-signer reasons are in the transcript; nothing was sent.
    #[error("{0} signer(s) misconfigured, nothing was sent")]
    SignersMisconfigured(usize),

    /// Returned when a signer uses an updater kind that has no implementation.
    #[error("{0} support not implemented")]
    UpdaterUnsupported(UpdaterKind),

    /// Returned when an update is requested with no inserts or removals.
    #[error("inserts and removes empty, nothing to do")]
    EmptyUpdate,

    /// Returned when a DNS server can't be reached, or the exchange fails or times out.
    #[error("DNS exchange with {server} failed: {reason}")]
    Transport { server: String, reason: String },

    /// Returned when a signer answers a dynamic update with a non-NOERROR response code.
    #[error("update of {server} rejected: {rcode}")]
    UpdateRejected { server: String, rcode: String },

    /// Returned when a record received from a DNS server can't be decoded.
    #[error("malformed {0} record")]
    MalformedRecord(&'static str),

    /// Returned when a DNS protocol error occurs encoding or decoding messages.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),

    /// Returned when a persisted wait deadline can't be parsed or formatted.
    #[error("invalid timestamp")]
    InvalidTimestamp(#[from] time::error::Parse),

    #[error("invalid timestamp format")]
    TimestampFormat(#[from] time::error::Format),

    /// Returned when the configured RPC bind address is not a loopback address, or an address
    /// within a private network space. The RPC API is unauthenticated.
    #[error("RPC bind address ({0}) must be a loopback or private IP")]
    InsecureRPCBind(IpAddr),

    /// Returned when a command sent to a remote daemon fails. Holds the daemon's message.
    #[error("remote: {0}")]
    Remote(String),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON from disk (the [`Config`][crate::config::Config] or the
    /// [persisted state][crate::store::FileStateStore]) fails due to invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn transport(server: impl Into<String>, reason: impl ToString) -> Self {
        Error::Transport {
            server: server.into(),
            reason: reason.to_string(),
        }
    }

    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Usage(_)
            | Error::UnknownCommand(_)
            | Error::DaemonOnly(_)
            | Error::NoRemoteCall(_)
            | Error::NotFQDN(_)
            | Error::InvalidName(..)
            | Error::InvalidArgument { .. }
            | Error::NoSuchGroup(_)
            | Error::GroupExists(_)
            | Error::GroupHasSigners(_)
            | Error::GroupHasNoSigners(_)
            | Error::AutomationRunning(_)
            | Error::AutomationNotRunning(_)
            | Error::NoSuchSigner(_)
            | Error::SignerExists(_)
            | Error::SignerNotLeaving(_)
            | Error::WrongStage(..)
            | Error::InvalidStage(_)
            | Error::ReadOnlyKey(_) => ErrorKind::Validation,
            Error::MissingAddress(_)
            | Error::MissingCredential(_)
            | Error::MissingSecret(_)
            | Error::InvalidSecret(_)
            | Error::SignersMisconfigured(_)
            | Error::InsecureRPCBind(_) => ErrorKind::Configuration,
            Error::UpdaterUnsupported(_) | Error::EmptyUpdate => ErrorKind::Protocol,
            Error::Transport { .. }
            | Error::UpdateRejected { .. }
            | Error::MalformedRecord(_)
            | Error::DNSError(_)
            | Error::Remote(_) => ErrorKind::Transport,
            Error::InvalidTimestamp(_)
            | Error::TimestampFormat(_)
            | Error::IO(_)
            | Error::InvalidJSON(_) => ErrorKind::Storage,
        }
    }
}
