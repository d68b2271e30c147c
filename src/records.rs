//! Typed DNSSEC and delegation records.
//!
//! The reconciliation logic works on these types rather than on wire messages: a
//! [`Dnskey`] is classified by its flags and a [`Ds`] can be derived from a [`Dnskey`] for the
//! CDS/DS comparisons. Both wrap the DNSSEC RDATA types of [`trust_dns_proto`], which also
//! does the key tag, digest and wire format work.

use crate::error::Error;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt;
use std::str::FromStr;
use trust_dns_client::rr::{LowerName, Name, RecordType};
use trust_dns_proto::rr::dnssec::rdata::{DNSKEY, DS};
use trust_dns_proto::rr::dnssec::Algorithm;
use trust_dns_proto::rr::rdata::CSYNC;

pub use trust_dns_proto::rr::dnssec::DigestType;

/// SEP and zone key bits of the DNSKEY flags field.
const KEY_ROLE_MASK: u16 = 0x101;
const ZSK_FLAGS: u16 = 256;
const KSK_FLAGS: u16 = 257;
const ZONE_KEY: u16 = 0x100;
const SECURE_ENTRY_POINT: u16 = 0x1;
const REVOKE: u16 = 0x80;

/// The only DNSKEY protocol value, part of the provenance fingerprint.
const DNSKEY_PROTOCOL: u8 = 3;

/// Parse a fully qualified domain name given by the operator.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] if `s` isn't a domain name and [`Error::NotFQDN`] if it
/// doesn't end with the root label.
pub fn parse_fqdn(s: &str) -> Result<LowerName, Error> {
    let name = Name::from_str(s).map_err(|err| Error::InvalidName(s.to_string(), err))?;
    if !name.is_fqdn() {
        return Err(Error::NotFQDN(s.to_string()));
    }
    Ok(LowerName::from(name))
}

/// The record types signercrab queries or updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rtype {
    Ns,
    Soa,
    Ds,
    Dnskey,
    Cds,
    Cdnskey,
    Csync,
}

impl Rtype {
    #[must_use]
    pub fn from_record_type(rtype: RecordType) -> Option<Self> {
        match rtype {
            RecordType::NS => Some(Rtype::Ns),
            RecordType::SOA => Some(Rtype::Soa),
            RecordType::DS => Some(Rtype::Ds),
            RecordType::DNSKEY => Some(Rtype::Dnskey),
            RecordType::CDS => Some(Rtype::Cds),
            RecordType::CDNSKEY => Some(Rtype::Cdnskey),
            RecordType::CSYNC => Some(Rtype::Csync),
            _ => None,
        }
    }
}

impl From<Rtype> for RecordType {
    fn from(rtype: Rtype) -> Self {
        match rtype {
            Rtype::Ns => RecordType::NS,
            Rtype::Soa => RecordType::SOA,
            Rtype::Ds => RecordType::DS,
            Rtype::Dnskey => RecordType::DNSKEY,
            Rtype::Cds => RecordType::CDS,
            Rtype::Cdnskey => RecordType::CDNSKEY,
            Rtype::Csync => RecordType::CSYNC,
        }
    }
}

impl fmt::Display for Rtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&RecordType::from(*self), f)
    }
}

/// The synchronization role of a DNSKEY, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Zsk,
    Ksk,
    Other,
}

/// DNSKEY (and CDNSKEY) RDATA.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dnskey(DNSKEY);

impl Dnskey {
    /// Build a key from its flags field. Reserved flag bits are dropped.
    #[must_use]
    pub fn new(flags: u16, algorithm: u8, public_key: Vec<u8>) -> Self {
        Dnskey(DNSKEY::new(
            flags & ZONE_KEY != 0,
            flags & SECURE_ENTRY_POINT != 0,
            flags & REVOKE != 0,
            Algorithm::from_u8(algorithm),
            public_key,
        ))
    }

    /// Build a key from its presentation form public key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedRecord`] if `public_key` isn't valid base64.
    pub fn from_base64(flags: u16, algorithm: u8, public_key: &str) -> Result<Self, Error> {
        let public_key = BASE64
            .decode(public_key)
            .map_err(|_| Error::MalformedRecord("DNSKEY"))?;
        Ok(Self::new(flags, algorithm, public_key))
    }

    #[must_use]
    pub fn flags(&self) -> u16 {
        self.0.flags()
    }

    #[must_use]
    pub fn algorithm(&self) -> u8 {
        self.0.algorithm().into()
    }

    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        self.0.public_key()
    }

    #[must_use]
    pub fn role(&self) -> KeyRole {
        match self.flags() & KEY_ROLE_MASK {
            ZSK_FLAGS => KeyRole::Zsk,
            KSK_FLAGS => KeyRole::Ksk,
            _ => KeyRole::Other,
        }
    }

    #[must_use]
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public_key())
    }

    /// The provenance fingerprint of the key: protocol, algorithm and public key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!(
            "{DNSKEY_PROTOCOL}-{}-{}",
            self.algorithm(),
            self.public_key_base64()
        )
    }

    /// Whether `other` carries the same public key material, ignoring flags and algorithm.
    #[must_use]
    pub fn same_key(&self, other: &Dnskey) -> bool {
        self.public_key() == other.public_key()
    }

    /// The key tag, see [RFC-4034 Appendix B](https://www.rfc-editor.org/rfc/rfc4034#appendix-B).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if the key can't be encoded.
    pub fn key_tag(&self) -> Result<u16, Error> {
        Ok(self.0.calculate_key_tag()?)
    }

    /// Derive the DS (or CDS) record for this key at `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] for digest types without an implementation.
    pub fn to_ds(&self, owner: &LowerName, digest_type: DigestType) -> Result<Ds, Error> {
        let owner: Name = owner.into();
        let digest = self.0.to_digest(&owner, digest_type)?;
        Ok(Ds(DS::new(
            self.key_tag()?,
            self.0.algorithm(),
            digest_type,
            digest.as_ref().to_vec(),
        )))
    }

    /// Whether `ds` is the digest of this key at `owner`, using the digest type of `ds`.
    #[must_use]
    pub fn matches(&self, owner: &LowerName, ds: &Ds) -> bool {
        self.to_ds(owner, ds.digest_type())
            .map_or(false, |derived| derived == *ds)
    }
}

impl From<DNSKEY> for Dnskey {
    fn from(key: DNSKEY) -> Self {
        Dnskey(key)
    }
}

impl From<Dnskey> for DNSKEY {
    fn from(key: Dnskey) -> Self {
        key.0
    }
}

impl fmt::Display for Dnskey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// DS (and CDS) RDATA.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ds(DS);

impl Ds {
    #[must_use]
    pub fn new(key_tag: u16, algorithm: u8, digest_type: DigestType, digest: Vec<u8>) -> Self {
        Ds(DS::new(
            key_tag,
            Algorithm::from_u8(algorithm),
            digest_type,
            digest,
        ))
    }

    #[must_use]
    pub fn key_tag(&self) -> u16 {
        self.0.key_tag()
    }

    #[must_use]
    pub fn algorithm(&self) -> u8 {
        self.0.algorithm().into()
    }

    #[must_use]
    pub fn digest_type(&self) -> DigestType {
        self.0.digest_type()
    }

    #[must_use]
    pub fn digest(&self) -> &[u8] {
        self.0.digest()
    }
}

impl From<DS> for Ds {
    fn from(ds: DS) -> Self {
        Ds(ds)
    }
}

impl From<Ds> for DS {
    fn from(ds: Ds) -> Self {
        ds.0
    }
}

impl fmt::Display for Ds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// CSYNC RDATA, see [RFC-7477](https://www.rfc-editor.org/rfc/rfc7477).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Csync {
    pub serial: u32,
    pub immediate: bool,
    pub soa_minimum: bool,
    pub types: Vec<RecordType>,
}

impl Csync {
    /// The CSYNC record asking the parent to pick up the child's A, NS and AAAA records
    /// right away, with `immediate` and `soaminimum` set.
    #[must_use]
    pub fn delegation(serial: u32) -> Self {
        Csync {
            serial,
            immediate: true,
            soa_minimum: true,
            types: vec![RecordType::A, RecordType::NS, RecordType::AAAA],
        }
    }

    #[must_use]
    pub fn to_rdata(&self) -> CSYNC {
        CSYNC::new(
            self.serial,
            self.immediate,
            self.soa_minimum,
            self.types.clone(),
        )
    }
}

impl fmt::Display for Csync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_rdata(), f)
    }
}

/// The data of a record as observed at, or sent to, a DNS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Dnskey(Dnskey),
    Cdnskey(Dnskey),
    Ds(Ds),
    Cds(Ds),
    Ns(LowerName),
    Soa { serial: u32 },
    Csync(Csync),
}

impl RecordData {
    #[must_use]
    pub fn rtype(&self) -> Rtype {
        match self {
            RecordData::Dnskey(_) => Rtype::Dnskey,
            RecordData::Cdnskey(_) => Rtype::Cdnskey,
            RecordData::Ds(_) => Rtype::Ds,
            RecordData::Cds(_) => Rtype::Cds,
            RecordData::Ns(_) => Rtype::Ns,
            RecordData::Soa { .. } => Rtype::Soa,
            RecordData::Csync(_) => Rtype::Csync,
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordData::Dnskey(k) | RecordData::Cdnskey(k) => write!(f, "{} {k}", self.rtype()),
            RecordData::Ds(ds) | RecordData::Cds(ds) => write!(f, "{} {ds}", self.rtype()),
            RecordData::Ns(ns) => write!(f, "NS {ns}"),
            RecordData::Soa { serial } => write!(f, "SOA serial {serial}"),
            RecordData::Csync(c) => write!(f, "CSYNC {c}"),
        }
    }
}

/// A record with its TTL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rr {
    pub ttl: u32,
    pub data: RecordData,
}

impl Rr {
    #[must_use]
    pub fn new(ttl: u32, data: RecordData) -> Self {
        Rr { ttl, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC-4034 section 5.4 / RFC-4509 section 2.3 example key.
    const DSKEY: &str = "AQOeiiR0GOMYkDshWoSKz9XzfwJr1AYtsmx3TGkJaNXVbfi/2pHm822aJ5iI9BMzNXxeYCmZ\
                         DRD99WYwYqUSdjMmmAphXdvxegXd/M5+X7OrzKBaMbCVdFLUUh6DhweJBjEVv5f2wwjM9Xzc\
                         nOf+EPbtG9DMBmADjFDc2w/rljwvFw==";

    fn owner() -> LowerName {
        LowerName::from(Name::from_str("dskey.example.com.").unwrap())
    }

    #[test]
    fn names_must_be_fully_qualified() {
        assert_eq!(parse_fqdn("Example.COM.").unwrap(), parse_fqdn("example.com.").unwrap());
        assert!(matches!(parse_fqdn("example.com"), Err(Error::NotFQDN(_))));
    }

    #[test]
    fn key_roles() {
        assert_eq!(Dnskey::new(256, 13, vec![1]).role(), KeyRole::Zsk);
        assert_eq!(Dnskey::new(257, 13, vec![1]).role(), KeyRole::Ksk);
        // REVOKE bit doesn't change the role.
        assert_eq!(Dnskey::new(257 | 0x80, 13, vec![1]).role(), KeyRole::Ksk);
        assert_eq!(Dnskey::new(1, 13, vec![1]).role(), KeyRole::Other);
        assert_eq!(Dnskey::new(0, 13, vec![1]).role(), KeyRole::Other);
    }

    #[test]
    fn rfc4509_ds_derivation() {
        let key = Dnskey::from_base64(256, 5, DSKEY).unwrap();
        assert_eq!(key.key_tag().unwrap(), 60485);

        let ds = key.to_ds(&owner(), DigestType::SHA256).unwrap();
        assert_eq!(ds.key_tag(), 60485);
        assert_eq!(ds.algorithm(), 5);
        assert_eq!(ds.digest_type(), DigestType::SHA256);
        assert_eq!(
            ds.to_string(),
            "60485 5 2 D4B7D520E7BB5F0F67674A0CCEB1E3E0614B93C4F9E99B8383F6A1E4469DA50A"
        );
        assert!(key.matches(&owner(), &ds));
    }

    #[test]
    fn owner_case_does_not_change_digest() {
        let key = Dnskey::from_base64(257, 5, DSKEY).unwrap();
        let upper = LowerName::from(Name::from_str("DSKEY.Example.COM.").unwrap());
        assert_eq!(
            key.to_ds(&owner(), DigestType::SHA256).unwrap(),
            key.to_ds(&upper, DigestType::SHA256).unwrap()
        );
    }

    #[test]
    fn unsupported_digest_never_matches() {
        let key = Dnskey::new(257, 13, vec![1, 2, 3]);
        assert!(key.to_ds(&owner(), DigestType::GOSTR34_11_94).is_err());
        let gost = Ds::new(key.key_tag().unwrap(), 13, DigestType::GOSTR34_11_94, vec![0; 32]);
        assert!(!key.matches(&owner(), &gost));
    }

    #[test]
    fn csync_asks_for_delegation_records() {
        let csync = Csync::delegation(2023_01_01).to_rdata();
        // immediate and soaminimum
        assert_eq!(csync.flags(), 3);
        assert_eq!(
            csync.type_bit_maps(),
            &[RecordType::A, RecordType::NS, RecordType::AAAA]
        );
    }

    #[test]
    fn fingerprint_ignores_flags() {
        let zsk = Dnskey::new(256, 13, vec![1, 2]);
        let ksk = Dnskey::new(257, 13, vec![1, 2]);
        assert_eq!(zsk.fingerprint(), ksk.fingerprint());
        assert_eq!(zsk.fingerprint(), "3-13-AQI=");
        assert!(zsk.same_key(&Dnskey::new(256, 8, vec![1, 2])));
    }
}
