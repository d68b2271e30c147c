//! Signals to the parent operator.
//!
//! A CSYNC record ([RFC-7477](https://www.rfc-editor.org/rfc/rfc7477)) asks the parent to
//! copy the child's NS set into the delegation. The CDS/CDNSKEY records themselves are
//! published by [`sync`][crate::sync]; once the parent picked them up they're withdrawn here.

use crate::context::Context;
use crate::error::Error;
use crate::records::{Csync, RecordData, Rr, Rtype};
use crate::sync::{push, Plan};
use crate::transcript::Transcript;
use tracing::info;
use trust_dns_client::rr::LowerName;

/// Publish a CSYNC record at every signer, using the serial of the SOA that signer serves.
///
/// # Errors
///
/// Returns [`Error::GroupHasNoSigners`] for a group without signers, query errors (including
/// a signer that serves no SOA), resolution and update errors.
pub async fn add_csync(ctx: &mut Context, zone: &LowerName, out: &mut Transcript) -> Result<(), Error> {
    let members = ctx.state().members(zone)?;
    if members.is_empty() {
        return Err(Error::GroupHasNoSigners(zone.clone()));
    }
    let ttl = ctx.state().group(zone)?.ttl;

    let mut plans = Vec::with_capacity(members.len());
    for member in members {
        if member.signer.address.is_empty() {
            return Err(Error::MissingAddress(member.name));
        }
        let answer = ctx.query(&member.signer.address, zone, Rtype::Soa).await?;
        let serial = answer
            .records
            .iter()
            .find_map(|rr| match rr.data {
                RecordData::Soa { serial } => Some(serial),
                _ => None,
            })
            .ok_or_else(|| Error::transport(&member.signer.address, "no SOA in answer"))?;

        out.line(format!("{}: SOA serial {serial}", member.name));
        let name = member.name.clone();
        let mut plan = Plan::new(member);
        plan.changes()
            .insert(Rr::new(ttl, RecordData::Csync(Csync::delegation(serial))));
        plan.report(format!("  Added CSYNC to {name}"));
        plans.push(plan);
    }

    push(ctx, zone, plans, out).await?;
    info!(%zone, "CSYNC added");
    Ok(())
}

async fn remove_rrsets(
    ctx: &Context,
    zone: &LowerName,
    rtypes: &[Rtype],
    what: &str,
    out: &mut Transcript,
) -> Result<(), Error> {
    let members = ctx.state().members(zone)?;
    if members.is_empty() {
        return Err(Error::GroupHasNoSigners(zone.clone()));
    }
    let plans = members
        .into_iter()
        .map(|member| {
            let name = member.name.clone();
            let mut plan = Plan::new(member);
            for rtype in rtypes {
                plan.changes().remove_rrset(*rtype);
            }
            plan.report(format!("  Removed {what} from {name}"));
            plan
        })
        .collect();
    push(ctx, zone, plans, out).await?;
    info!(%zone, what, "removed");
    Ok(())
}

/// Delete the CSYNC RRset at every signer.
///
/// # Errors
///
/// Returns resolution and update errors.
pub async fn remove_csync(ctx: &mut Context, zone: &LowerName, out: &mut Transcript) -> Result<(), Error> {
    remove_rrsets(ctx, zone, &[Rtype::Csync], "CSYNC", out).await
}

/// Delete the CDS and CDNSKEY RRsets at every signer.
///
/// # Errors
///
/// Returns resolution and update errors.
pub async fn remove_cdscdnskeys(
    ctx: &mut Context,
    zone: &LowerName,
    out: &mut Transcript,
) -> Result<(), Error> {
    remove_rrsets(ctx, zone, &[Rtype::Cds, Rtype::Cdnskey], "CDS/CDNSKEYs", out).await
}
