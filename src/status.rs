//! Status reconciliation.
//!
//! Every signer of a group is queried for its DNSKEY, CDS, CDNSKEY and NS records and the
//! parent for its DS and NS records. From these observations [`evaluate`] computes the
//! group's [`SyncFlags`]. Signers that are leaving the group are excluded from the key
//! checks, and their nameservers are expected to be gone.

use crate::context::Context;
use crate::dns::Answer;
use crate::error::Error;
use crate::records::{Dnskey, Ds, KeyRole, RecordData, Rtype};
use crate::store::{Member, SyncFlags};
use crate::transcript::Transcript;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};
use trust_dns_client::rr::LowerName;

/// What one signer serves for the zone, together with its group membership details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerView {
    pub name: String,
    pub leaving: bool,
    pub csk: bool,
    /// The name the signer is advertised under.
    pub nameserver: LowerName,
    pub dnskeys: Vec<Dnskey>,
    pub dnskey_ttl: u32,
    pub cds: Vec<Ds>,
    pub cdnskeys: Vec<Dnskey>,
    pub ns: Vec<LowerName>,
    pub ns_ttl: u32,
}

impl SignerView {
    #[must_use]
    pub fn new(member: &Member) -> Self {
        SignerView {
            name: member.name.clone(),
            leaving: member.signer.leaving,
            csk: member.signer.csk,
            nameserver: member.signer.nameserver.clone(),
            dnskeys: Vec::new(),
            dnskey_ttl: 0,
            cds: Vec::new(),
            cdnskeys: Vec::new(),
            ns: Vec::new(),
            ns_ttl: 0,
        }
    }

    /// Sort the records of an answer into the view.
    pub fn absorb(&mut self, answer: Answer) {
        let ttl = answer.max_ttl();
        for rr in answer.records {
            match rr.data {
                RecordData::Dnskey(key) => {
                    self.dnskey_ttl = ttl;
                    self.dnskeys.push(key);
                }
                RecordData::Cds(ds) => self.cds.push(ds),
                RecordData::Cdnskey(key) => self.cdnskeys.push(key),
                RecordData::Ns(ns) => {
                    self.ns_ttl = ttl;
                    if !self.ns.contains(&ns) {
                        self.ns.push(ns);
                    }
                }
                RecordData::Ds(_) | RecordData::Soa { .. } | RecordData::Csync(_) => {}
            }
        }
    }

    /// The keys this signer expects every other signer to carry: its ZSKs, or every key for a
    /// combined signing key signer.
    pub fn synced_keys(&self) -> impl Iterator<Item = &Dnskey> + '_ {
        self.dnskeys
            .iter()
            .filter(|key| self.csk || key.role() == KeyRole::Zsk)
    }

    pub fn ksks(&self) -> impl Iterator<Item = &Dnskey> + '_ {
        self.dnskeys.iter().filter(|key| key.role() == KeyRole::Ksk)
    }
}

/// What the parent serves for the delegation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentView {
    pub ds: Vec<Ds>,
    pub ns: Vec<LowerName>,
    /// Largest TTL of the queried records.
    pub max_ttl: u32,
}

/// Query a signer for the given record types.
///
/// # Errors
///
/// Returns the first query error.
pub async fn observe_signer(
    ctx: &Context,
    zone: &LowerName,
    member: &Member,
    rtypes: &[Rtype],
) -> Result<SignerView, Error> {
    let mut view = SignerView::new(member);
    if member.signer.address.is_empty() {
        return Err(Error::MissingAddress(member.name.clone()));
    }
    for rtype in rtypes {
        let answer = ctx.query(&member.signer.address, zone, *rtype).await?;
        debug!(signer = %member.name, %rtype, records = answer.records.len(), "observed");
        view.absorb(answer);
    }
    Ok(view)
}

/// Query a group's parent for the given record types.
///
/// # Errors
///
/// Returns [`Error::MissingAddress`] if the group has no parent address, or the first query
/// error.
pub async fn observe_parent(
    ctx: &Context,
    zone: &LowerName,
    rtypes: &[Rtype],
) -> Result<ParentView, Error> {
    let parent = ctx.state().group(zone)?.parent.clone();
    if parent.is_empty() {
        return Err(Error::MissingAddress(format!("parent of {zone}")));
    }
    let mut view = ParentView::default();
    for rtype in rtypes {
        let answer = ctx.query(&parent, zone, *rtype).await?;
        view.max_ttl = view.max_ttl.max(answer.max_ttl());
        for rr in answer.records {
            match rr.data {
                RecordData::Ds(ds) => view.ds.push(ds),
                RecordData::Ns(ns) if !view.ns.contains(&ns) => view.ns.push(ns),
                _ => {}
            }
        }
    }
    Ok(view)
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// Compute the sync flags of a group from what its signers and parent serve. Every check
/// writes what it found to `out`.
///
/// # Errors
///
/// Returns [`Error::DNSError`] if the key tag of an observed key can't be computed.
pub fn evaluate(
    zone: &LowerName,
    signers: &[SignerView],
    parent: &ParentView,
    dnskey_origin: &BTreeMap<String, String>,
    out: &mut Transcript,
) -> Result<SyncFlags, Error> {
    let dnskeys = dnskeys_synced(signers, dnskey_origin, out)?;
    let cdscdnskeys = cdscdnskeys_synced(zone, signers, out)?;
    let nses = nses_synced(signers, out);
    let parent_ds = parent_ds_synced(signers, parent, out) && cdscdnskeys;
    let parent_ns = parent_ns_synced(signers, parent, out) && nses;

    let flags = SyncFlags {
        dnskeys,
        cdscdnskeys,
        parent_ds,
        nses,
        parent_ns,
    };
    out.line(format!("DNSKEYs synced: {}", yes_no(flags.dnskeys)));
    out.line(format!("CDS/CDNSKEYs synced: {}", yes_no(flags.cdscdnskeys)));
    out.line(format!("NSes synced: {}", yes_no(flags.nses)));
    out.line(format!("Parent DS synced: {}", yes_no(flags.parent_ds)));
    out.line(format!("Parent NS synced: {}", yes_no(flags.parent_ns)));
    Ok(flags)
}

fn dnskeys_synced(
    signers: &[SignerView],
    dnskey_origin: &BTreeMap<String, String>,
    out: &mut Transcript,
) -> Result<bool, Error> {
    let leaving: HashSet<&str> = signers
        .iter()
        .filter(|s| s.leaving)
        .map(|s| s.name.as_str())
        .collect();
    let mut synced = true;

    for signer in signers {
        if signer.leaving {
            out.line(format!(
                "Skipping sync status of {} DNSKEYs: leaving signer",
                signer.name
            ));
            continue;
        }
        out.line(format!("Check sync status of {} DNSKEYs", signer.name));

        for key in signer.synced_keys() {
            let tag = key.key_tag()?;
            if let Some(origin) = dnskey_origin
                .get(&key.fingerprint())
                .filter(|origin| leaving.contains(origin.as_str()))
            {
                out.line(format!(
                    "DNSKEY {tag} needs removal from {}: originates from leaving signer {origin}",
                    signer.name
                ));
                synced = false;
                continue;
            }
            for other in signers.iter().filter(|o| !o.leaving && o.name != signer.name) {
                match other.dnskeys.iter().find(|k| k.same_key(key)) {
                    None => {
                        out.line(format!("DNSKEY {tag} missing in {}", other.name));
                        synced = false;
                    }
                    Some(found) if found.algorithm() != key.algorithm() => {
                        out.line(format!(
                            "Found DNSKEY {tag} in {} but algorithm mismatch: {}, expected {}",
                            other.name,
                            found.algorithm(),
                            key.algorithm()
                        ));
                        synced = false;
                    }
                    Some(_) => {}
                }
            }
        }
    }
    Ok(synced)
}

/// KSKs of the non-leaving signers, without duplicates.
fn active_ksks(signers: &[SignerView]) -> Vec<&Dnskey> {
    let mut ksks: Vec<&Dnskey> = Vec::new();
    for key in signers.iter().filter(|s| !s.leaving).flat_map(SignerView::ksks) {
        if !ksks.contains(&key) {
            ksks.push(key);
        }
    }
    ksks
}

fn cdscdnskeys_synced(
    zone: &LowerName,
    signers: &[SignerView],
    out: &mut Transcript,
) -> Result<bool, Error> {
    let ksks = active_ksks(signers);
    let mut synced = true;

    for signer in signers {
        if signer.leaving {
            out.line(format!(
                "Skipping sync status of {} CDS/CDNSKEYs: leaving signer",
                signer.name
            ));
            continue;
        }
        out.line(format!("Check sync status of {} CDS/CDNSKEYs", signer.name));

        for ksk in &ksks {
            let tag = ksk.key_tag()?;
            let has_cds = signer.cds.iter().any(|cds| ksk.matches(zone, cds));
            if !has_cds {
                out.line(format!("CDS missing in {} for KSK {tag}", signer.name));
                synced = false;
            }
            if !signer.cdnskeys.contains(*ksk) {
                out.line(format!("CDNSKEY missing in {} for KSK {tag}", signer.name));
                synced = false;
            }
        }
    }
    Ok(synced)
}

fn nses_synced(signers: &[SignerView], out: &mut Transcript) -> bool {
    let union: BTreeSet<&LowerName> = signers.iter().flat_map(|s| s.ns.iter()).collect();
    let mut synced = true;

    for signer in signers {
        out.line(format!("Check sync status of {} NSes", signer.name));
        for ns in &union {
            if !signer.ns.contains(*ns) {
                out.line(format!("NS {ns} missing in {}", signer.name));
                synced = false;
            }
        }
    }
    for signer in signers.iter().filter(|s| s.leaving) {
        if union.contains(&signer.nameserver) {
            out.line(format!(
                "NS {} of leaving signer {} needs removal",
                signer.nameserver, signer.name
            ));
            synced = false;
        }
    }
    synced
}

fn parent_ds_synced(signers: &[SignerView], parent: &ParentView, out: &mut Transcript) -> bool {
    let mut expected: Vec<&Ds> = Vec::new();
    for cds in signers.iter().filter(|s| !s.leaving).flat_map(|s| s.cds.iter()) {
        if !expected.contains(&cds) {
            expected.push(cds);
        }
    }
    let mut synced = true;

    out.line("Check sync status of parent DS");
    for ds in &parent.ds {
        if expected.contains(&ds) {
            out.line(format!("  found DS {ds}"));
        } else {
            out.line(format!("  DS needs removal: {ds}"));
            synced = false;
        }
    }
    for cds in expected {
        if !parent.ds.contains(cds) {
            out.line(format!("  Missing DS for CDS: {cds}"));
            synced = false;
        }
    }
    synced
}

fn parent_ns_synced(signers: &[SignerView], parent: &ParentView, out: &mut Transcript) -> bool {
    let leaving: BTreeSet<&LowerName> = signers
        .iter()
        .filter(|s| s.leaving)
        .map(|s| &s.nameserver)
        .collect();
    let expected: BTreeSet<&LowerName> = signers
        .iter()
        .flat_map(|s| s.ns.iter())
        .filter(|ns| !leaving.contains(ns))
        .collect();
    let mut synced = true;

    out.line("Check sync status of parent NS");
    for ns in &parent.ns {
        if leaving.contains(ns) {
            out.line(format!("  found leaving NS {ns}, needs removal"));
            synced = false;
        } else if expected.contains(ns) {
            out.line(format!("  found NS {ns}"));
        } else {
            out.line(format!("  unexpected NS {ns}, needs removal"));
            synced = false;
        }
    }
    for ns in expected {
        if !parent.ns.contains(ns) {
            out.line(format!("  Missing NS: {ns}"));
            synced = false;
        }
    }
    synced
}

fn report(view: &SignerView, dnskey_origin: &BTreeMap<String, String>, out: &mut Transcript) {
    for key in &view.dnskeys {
        let origin = dnskey_origin
            .get(&key.fingerprint())
            .map(|o| format!(" (origin: {o})"))
            .unwrap_or_default();
        out.line(format!("{}: found DNSKEY {key}{origin}", view.name));
    }
    for cds in &view.cds {
        out.line(format!("{}: found CDS {cds}", view.name));
    }
    for key in &view.cdnskeys {
        out.line(format!("{}: found CDNSKEY {key}", view.name));
    }
    for ns in &view.ns {
        out.line(format!("{}: found NS {ns}", view.name));
    }
}

/// Query every signer and the parent of `zone`, evaluate and persist the group's sync flags.
/// The stored flags are cleared before the first query, so a failed query leaves them all
/// unset.
///
/// # Errors
///
/// Returns [`Error::GroupHasNoSigners`] for a group without signers, or the first query
/// error.
pub async fn status(
    ctx: &mut Context,
    zone: &LowerName,
    out: &mut Transcript,
) -> Result<SyncFlags, Error> {
    let members = ctx.state().members(zone)?;
    if members.is_empty() {
        return Err(Error::GroupHasNoSigners(zone.clone()));
    }

    ctx.state_mut().group_mut(zone)?.synced = SyncFlags::default();

    let mut views = Vec::with_capacity(members.len());
    for member in &members {
        let view = observe_signer(
            ctx,
            zone,
            member,
            &[Rtype::Dnskey, Rtype::Cds, Rtype::Cdnskey, Rtype::Ns],
        )
        .await?;
        report(&view, &ctx.state().dnskey_origin, out);
        views.push(view);
    }
    let parent = observe_parent(ctx, zone, &[Rtype::Ds, Rtype::Ns]).await?;

    let flags = evaluate(zone, &views, &parent, &ctx.state().dnskey_origin, out)?;
    ctx.state_mut().group_mut(zone)?.synced = flags;
    info!(%zone, ?flags, "status evaluated");
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{parse_fqdn, DigestType};

    fn zone() -> LowerName {
        parse_fqdn("example.com.").unwrap()
    }

    fn ns(s: &str) -> LowerName {
        parse_fqdn(s).unwrap()
    }

    fn zsk(b: u8) -> Dnskey {
        Dnskey::new(256, 13, vec![b; 32])
    }

    fn ksk(b: u8) -> Dnskey {
        Dnskey::new(257, 13, vec![b; 32])
    }

    fn view(name: &str, nameserver: &str, dnskeys: Vec<Dnskey>) -> SignerView {
        SignerView {
            name: name.to_string(),
            leaving: false,
            csk: false,
            nameserver: ns(nameserver),
            dnskeys,
            dnskey_ttl: 3600,
            cds: Vec::new(),
            cdnskeys: Vec::new(),
            ns: Vec::new(),
            ns_ttl: 3600,
        }
    }

    fn flags(signers: &[SignerView], parent: &ParentView) -> (SyncFlags, Transcript) {
        flags_with_origin(signers, parent, &BTreeMap::new())
    }

    fn flags_with_origin(
        signers: &[SignerView],
        parent: &ParentView,
        origin: &BTreeMap<String, String>,
    ) -> (SyncFlags, Transcript) {
        let mut out = Transcript::new();
        let flags = evaluate(&zone(), signers, parent, origin, &mut out).unwrap();
        (flags, out)
    }

    #[test]
    fn dnskeys_synced_iff_every_zsk_everywhere() {
        let a = view("a", "ns1.a.test.", vec![zsk(1), zsk(2), ksk(9)]);
        let b = view("b", "ns1.b.test.", vec![zsk(1), zsk(2)]);
        let (synced, _) = flags(&[a.clone(), b.clone()], &ParentView::default());
        assert!(synced.dnskeys);

        // KSKs aren't synced between signers.
        let b_missing = view("b", "ns1.b.test.", vec![zsk(1)]);
        let (synced, out) = flags(&[a.clone(), b_missing], &ParentView::default());
        assert!(!synced.dnskeys);
        assert!(out.contains(&format!("DNSKEY {} missing in b", zsk(2).key_tag().unwrap())));
    }

    #[test]
    fn csk_signer_syncs_all_keys() {
        let mut a = view("a", "ns1.a.test.", vec![ksk(7)]);
        a.csk = true;
        let b = view("b", "ns1.b.test.", vec![]);
        let (synced, _) = flags(&[a, b], &ParentView::default());
        assert!(!synced.dnskeys);
    }

    #[test]
    fn algorithm_mismatch_blocks() {
        let a = view("a", "ns1.a.test.", vec![zsk(1)]);
        let b = view("b", "ns1.b.test.", vec![Dnskey::new(256, 8, vec![1; 32])]);
        let (synced, out) = flags(&[a, b], &ParentView::default());
        assert!(!synced.dnskeys);
        assert!(out.lines().iter().any(|l| l.contains("mismatch")));
    }

    #[test]
    fn leaving_signers_key_needs_removal() {
        let a = view("a", "ns1.a.test.", vec![zsk(1), zsk(2)]);
        let mut b = view("b", "ns1.b.test.", vec![zsk(1), zsk(2)]);
        b.leaving = true;
        let origin = BTreeMap::from([
            (zsk(1).fingerprint(), "a".to_string()),
            (zsk(2).fingerprint(), "b".to_string()),
        ]);
        let (synced, out) = flags_with_origin(&[a.clone(), b.clone()], &ParentView::default(), &origin);
        assert!(!synced.dnskeys);
        assert!(out.lines().iter().any(|l| l.contains("needs removal from a")));

        // Once removed from a, a leaving signer's keys don't matter.
        let a = view("a", "ns1.a.test.", vec![zsk(1)]);
        let (synced, _) = flags_with_origin(&[a, b], &ParentView::default(), &origin);
        assert!(synced.dnskeys);
    }

    #[test]
    fn cds_uses_candidate_digest_type() {
        let key = ksk(5);
        let mut a = view("a", "ns1.a.test.", vec![key.clone()]);
        a.cdnskeys = vec![key.clone()];
        a.cds = vec![key.to_ds(&zone(), DigestType::SHA384).unwrap()];
        let (synced, _) = flags(&[a.clone()], &ParentView::default());
        assert!(synced.cdscdnskeys);

        // Wrong digest for the KSK.
        let good = key.to_ds(&zone(), DigestType::SHA256).unwrap();
        let mut digest = good.digest().to_vec();
        digest[0] ^= 0xff;
        a.cds = vec![Ds::new(good.key_tag(), good.algorithm(), good.digest_type(), digest)];
        let (synced, _) = flags(&[a], &ParentView::default());
        assert!(!synced.cdscdnskeys);
    }

    #[test]
    fn parent_ds_must_match_exactly() {
        let key = ksk(5);
        let cds = key.to_ds(&zone(), DigestType::SHA256).unwrap();
        let mut a = view("a", "ns1.a.test.", vec![key.clone()]);
        a.cdnskeys = vec![key.clone()];
        a.cds = vec![cds.clone()];

        let parent = ParentView {
            ds: vec![cds.clone()],
            ..ParentView::default()
        };
        let (synced, _) = flags(&[a.clone()], &parent);
        assert!(synced.parent_ds);

        let orphan = ksk(6).to_ds(&zone(), DigestType::SHA256).unwrap();
        let parent = ParentView {
            ds: vec![cds, orphan],
            ..ParentView::default()
        };
        let (synced, out) = flags(&[a.clone()], &parent);
        assert!(!synced.parent_ds);
        assert!(out.lines().iter().any(|l| l.starts_with("  DS needs removal")));

        let (synced, _) = flags(&[a], &ParentView::default());
        assert!(!synced.parent_ds);
    }

    #[test]
    fn ns_checks_exclude_leaving_names() {
        let mut a = view("a", "ns1.a.test.", vec![]);
        let mut b = view("b", "ns1.b.test.", vec![]);
        a.ns = vec![ns("ns1.a.test."), ns("ns1.b.test.")];
        b.ns = vec![ns("ns1.a.test."), ns("ns1.b.test.")];
        let parent = ParentView {
            ns: vec![ns("ns1.a.test."), ns("ns1.b.test.")],
            ..ParentView::default()
        };
        let (synced, _) = flags(&[a.clone(), b.clone()], &parent);
        assert!(synced.nses && synced.parent_ns);

        // b leaving, its name still served.
        b.leaving = true;
        let (synced, _) = flags(&[a.clone(), b.clone()], &parent);
        assert!(!synced.nses && !synced.parent_ns);

        // b's name removed everywhere, but the parent still delegates to it.
        a.ns = vec![ns("ns1.a.test.")];
        b.ns = vec![ns("ns1.a.test.")];
        let (synced, out) = flags(&[a.clone(), b.clone()], &parent);
        assert!(synced.nses);
        assert!(!synced.parent_ns);
        assert!(out.contains("  found leaving NS ns1.b.test., needs removal"));

        // An extra name at the parent blocks too.
        let parent = ParentView {
            ns: vec![ns("ns1.a.test."), ns("ns9.x.test.")],
            ..ParentView::default()
        };
        let (synced, _) = flags(&[a.clone(), b.clone()], &parent);
        assert!(!synced.parent_ns);

        let parent = ParentView {
            ns: vec![ns("ns1.a.test.")],
            ..ParentView::default()
        };
        let (synced, _) = flags(&[a, b], &parent);
        assert!(synced.parent_ns);
    }
}
