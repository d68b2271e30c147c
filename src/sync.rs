//! Record synchronization between the signers of a group.
//!
//! Each operation observes the signers, records provenance for what it saw, plans one
//! [`ChangeSet`] per signer and pushes the plans. Every target is resolved before the first
//! update is sent; a failure after that point leaves the signers already updated as they are.
//! DNSKEY and NS synchronization only plans what is missing, so against a synced group they
//! send nothing. CDS/CDNSKEY synchronization always replaces both RRsets.

use crate::context::Context;
use crate::error::Error;
use crate::records::{DigestType, Dnskey, RecordData, Rr, Rtype};
use crate::status::{observe_signer, SignerView};
use crate::store::Member;
use crate::transcript::Transcript;
use crate::updater::ChangeSet;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};
use trust_dns_client::rr::LowerName;

/// The planned changes for one signer, and the lines to report once they're applied.
#[derive(Debug)]
pub(crate) struct Plan {
    member: Member,
    changes: ChangeSet,
    applied: Vec<String>,
}

impl Plan {
    pub(crate) fn new(member: Member) -> Self {
        Plan {
            member,
            changes: ChangeSet::new(),
            applied: Vec::new(),
        }
    }

    pub(crate) fn changes(&mut self) -> &mut ChangeSet {
        &mut self.changes
    }

    pub(crate) fn report(&mut self, line: impl Into<String>) {
        self.applied.push(line.into());
    }
}

/// Resolve the targets of every non-empty plan, then apply the plans in order.
///
/// # Errors
///
/// Returns the resolution error without sending anything, or the first update error.
pub(crate) async fn push(
    ctx: &Context,
    zone: &LowerName,
    plans: Vec<Plan>,
    out: &mut Transcript,
) -> Result<usize, Error> {
    let plans: Vec<Plan> = plans.into_iter().filter(|p| !p.changes.is_empty()).collect();
    let members: Vec<Member> = plans.iter().map(|p| p.member.clone()).collect();
    let targets = ctx.resolve_targets(&members, out)?;

    for (plan, target) in plans.iter().zip(&targets) {
        ctx.update(zone, target, &plan.changes, out).await?;
        for line in &plan.applied {
            out.line(line.clone());
        }
    }
    Ok(plans.len())
}

async fn observe_all(
    ctx: &Context,
    zone: &LowerName,
    rtypes: &[Rtype],
) -> Result<(Vec<Member>, Vec<SignerView>), Error> {
    let members = ctx.state().members(zone)?;
    if members.is_empty() {
        return Err(Error::GroupHasNoSigners(zone.clone()));
    }
    let mut views = Vec::with_capacity(members.len());
    for member in &members {
        views.push(observe_signer(ctx, zone, member, rtypes).await?);
    }
    Ok((members, views))
}

/// Propagate every non-leaving signer's ZSKs (all keys of combined signing key signers) to
/// the other non-leaving signers, and withdraw keys that originate from leaving signers.
///
/// # Errors
///
/// Returns query, resolution and update errors.
pub async fn sync_dnskey(
    ctx: &mut Context,
    zone: &LowerName,
    out: &mut Transcript,
) -> Result<(), Error> {
    let (members, views) = observe_all(ctx, zone, &[Rtype::Dnskey]).await?;

    for view in &views {
        for key in view.synced_keys() {
            if ctx
                .state_mut()
                .record_dnskey_origin(key.fingerprint(), &view.name)
            {
                info!(%zone, signer = %view.name, tag = key.key_tag()?, "recorded DNSKEY origin");
            }
        }
    }

    let origins = &ctx.state().dnskey_origin;
    let leaving: HashSet<&str> = views
        .iter()
        .filter(|v| v.leaving)
        .map(|v| v.name.as_str())
        .collect();
    let from_leaving = |key: &Dnskey| {
        origins
            .get(&key.fingerprint())
            .map_or(false, |origin| leaving.contains(origin.as_str()))
    };

    let mut plans: Vec<Plan> = members.into_iter().map(Plan::new).collect();

    for view in views.iter().filter(|v| v.leaving) {
        out.line(format!(
            "Signer {} is leaving, removing its DNSKEYs from others",
            view.name
        ));
    }
    for (i, view) in views.iter().enumerate() {
        if view.leaving {
            continue;
        }
        for key in view.dnskeys.iter().filter(|k| from_leaving(k)) {
            out.line(format!("- {} {}", key.key_tag()?, key.public_key_base64()));
            plans[i]
                .changes()
                .remove(Rr::new(view.dnskey_ttl, RecordData::Dnskey(key.clone())));
            plans[i].report(format!("  Removed DNSKEY from {}", view.name));
        }
    }

    for view in views.iter().filter(|v| !v.leaving) {
        out.line(format!("Syncing {} DNSKEYs", view.name));
        for key in view.synced_keys().filter(|k| !from_leaving(k)) {
            let tag = key.key_tag()?;
            out.line(format!("- {tag} {}", key.public_key_base64()));
            for (i, other) in views.iter().enumerate() {
                if other.leaving || other.name == view.name {
                    continue;
                }
                match other.dnskeys.iter().find(|k| k.same_key(key)) {
                    Some(found) if found.algorithm() != key.algorithm() => {
                        warn!(%zone, signer = %other.name, tag, "DNSKEY algorithm mismatch");
                        out.line(format!(
                            "  Found DNSKEY in {} but algorithm mismatch, not syncing",
                            other.name
                        ));
                    }
                    Some(_) => out.line(format!("  Key exist in {}", other.name)),
                    None => {
                        let rr = Rr::new(view.dnskey_ttl, RecordData::Dnskey(key.clone()));
                        if !plans[i].changes.inserts.contains(&rr) {
                            plans[i].changes().insert(rr);
                            plans[i].report(format!("  Added DNSKEY to {}", other.name));
                        }
                    }
                }
            }
        }
    }

    let sent = push(ctx, zone, plans, out).await?;
    info!(%zone, updates = sent, "DNSKEYs synced");
    Ok(())
}

/// Publish CDS (SHA-256) and CDNSKEY records for every KSK of the non-leaving signers at every
/// non-leaving signer, replacing whatever CDS/CDNSKEY records they had.
///
/// # Errors
///
/// Returns query, resolution and update errors.
pub async fn sync_cdscdnskeys(
    ctx: &mut Context,
    zone: &LowerName,
    out: &mut Transcript,
) -> Result<(), Error> {
    let (members, views) =
        observe_all(ctx, zone, &[Rtype::Dnskey, Rtype::Cds, Rtype::Cdnskey]).await?;

    let mut derived: Vec<Rr> = Vec::new();
    for view in views.iter().filter(|v| !v.leaving) {
        for ksk in view.ksks() {
            let cds = ksk.to_ds(zone, DigestType::SHA256)?;
            let cds = Rr::new(view.dnskey_ttl, RecordData::Cds(cds));
            let cdnskey = Rr::new(view.dnskey_ttl, RecordData::Cdnskey(ksk.clone()));
            if !derived.iter().any(|rr| rr.data == cdnskey.data) {
                out.line(format!("KSK {} of {}: CDS {}", ksk.key_tag()?, view.name, cds.data));
                derived.push(cds);
                derived.push(cdnskey);
            }
        }
    }
    if derived.is_empty() {
        out.line("No KSKs found, nothing to sync");
        return Ok(());
    }

    let mut plans = Vec::with_capacity(members.len());
    for (member, view) in members.into_iter().zip(&views) {
        if view.leaving {
            continue;
        }
        let mut plan = Plan::new(member);
        plan.changes()
            .remove_rrset(Rtype::Cds)
            .remove_rrset(Rtype::Cdnskey);
        for rr in &derived {
            plan.changes().insert(rr.clone());
        }
        plan.report(format!("  Added CDS/CDNSKEYs to {}", view.name));
        plans.push(plan);
    }

    let sent = push(ctx, zone, plans, out).await?;
    info!(%zone, updates = sent, "CDS/CDNSKEYs synced");
    Ok(())
}

/// Make every signer serve the same NS set: the union of what the signers serve plus the
/// advertised name of every non-leaving signer, without the names of leaving signers.
///
/// # Errors
///
/// Returns query, resolution and update errors.
pub async fn sync_ns(ctx: &mut Context, zone: &LowerName, out: &mut Transcript) -> Result<(), Error> {
    let (members, views) = observe_all(ctx, zone, &[Rtype::Ns]).await?;
    let group_ttl = ctx.state().group(zone)?.ttl;

    for view in &views {
        for ns in &view.ns {
            if ctx.state_mut().record_ns_origin(ns, &view.name) {
                info!(%zone, signer = %view.name, %ns, "recorded NS origin");
            }
        }
    }

    let leaving: HashSet<&LowerName> = views
        .iter()
        .filter(|v| v.leaving)
        .map(|v| &v.nameserver)
        .collect();

    // name -> TTL it is served (or synthesized) with
    let mut desired: BTreeMap<&LowerName, u32> = BTreeMap::new();
    for view in &views {
        for ns in &view.ns {
            desired.entry(ns).or_insert(view.ns_ttl);
        }
    }
    for view in views.iter().filter(|v| !v.leaving) {
        desired.entry(&view.nameserver).or_insert(group_ttl);
    }
    desired.retain(|ns, _| !leaving.contains(ns));

    let mut plans = Vec::with_capacity(members.len());
    for (member, view) in members.into_iter().zip(&views) {
        let mut plan = Plan::new(member);
        for (ns, ttl) in &desired {
            if !view.ns.contains(*ns) {
                plan.changes()
                    .insert(Rr::new(*ttl, RecordData::Ns((*ns).clone())));
            }
        }
        for ns in view.ns.iter().filter(|ns| leaving.contains(ns)) {
            out.line(format!("removing {ns} from {}, leaving signer", view.name));
            plan.changes()
                .remove(Rr::new(view.ns_ttl, RecordData::Ns(ns.clone())));
        }
        plan.report(format!("  Add/rem'ed NSes to {}", view.name));
        plans.push(plan);
    }

    let sent = push(ctx, zone, plans, out).await?;
    info!(%zone, updates = sent, "NSes synced");
    Ok(())
}
