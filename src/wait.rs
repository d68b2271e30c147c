//! TTL based wait gates.
//!
//! After the parent changed the DS (join) or before the DNSKEYs of a leaving signer are
//! withdrawn (leave, once the NS change is done), resolvers may still hold the old records.
//! The gate computes a deadline of twice the largest TTL involved and persists it, so asking
//! again returns the same deadline until the caller clears it.

use crate::context::Context;
use crate::error::Error;
use crate::records::Rtype;
use crate::transcript::Transcript;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::info;
use trust_dns_client::rr::LowerName;

/// Which records a wait covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// DNSKEYs at the signers, DS at the parent.
    Ds,
    /// NS at the signers and at the parent.
    Ns,
}

impl Direction {
    fn rtypes(self) -> (Rtype, Rtype) {
        match self {
            Direction::Ds => (Rtype::Dnskey, Rtype::Ds),
            Direction::Ns => (Rtype::Ns, Rtype::Ns),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ds => f.write_str("DS"),
            Direction::Ns => f.write_str("NS"),
        }
    }
}

/// Time left until `until`, zero once it passed.
#[must_use]
pub fn remaining(until: OffsetDateTime, now: OffsetDateTime) -> Duration {
    (until - now).max(Duration::ZERO)
}

fn report(until: OffsetDateTime, now: OffsetDateTime, out: &mut Transcript) -> Result<(), Error> {
    out.line(format!(
        "Wait until {} ({}s)",
        until.format(&Rfc3339)?,
        remaining(until, now).whole_seconds()
    ));
    Ok(())
}

/// The persisted deadline of a group's wait in `direction`, if any.
///
/// # Errors
///
/// Returns [`Error::NoSuchGroup`] if `zone` isn't a group.
pub fn deadline(ctx: &Context, zone: &LowerName, direction: Direction) -> Result<Option<OffsetDateTime>, Error> {
    let group = ctx.state().group(zone)?;
    Ok(match direction {
        Direction::Ds => group.wait_ds,
        Direction::Ns => group.wait_ns,
    })
}

/// Forget the deadline of a group's wait in `direction`.
///
/// # Errors
///
/// Returns [`Error::NoSuchGroup`] if `zone` isn't a group.
pub fn clear(ctx: &mut Context, zone: &LowerName, direction: Direction) -> Result<(), Error> {
    let group = ctx.state_mut().group_mut(zone)?;
    match direction {
        Direction::Ds => group.wait_ds = None,
        Direction::Ns => group.wait_ns = None,
    }
    Ok(())
}

/// Return the deadline of a group's wait in `direction`, computing and persisting it first if
/// there is none. The gate doesn't block: compare the deadline with the current time.
///
/// # Errors
///
/// Returns [`Error::GroupHasNoSigners`] for a group without signers, and query errors.
pub async fn wait(
    ctx: &mut Context,
    zone: &LowerName,
    direction: Direction,
    out: &mut Transcript,
) -> Result<OffsetDateTime, Error> {
    let now = OffsetDateTime::now_utc();
    if let Some(until) = deadline(ctx, zone, direction)? {
        report(until, now, out)?;
        return Ok(until);
    }

    let members = ctx.state().members(zone)?;
    if members.is_empty() {
        return Err(Error::GroupHasNoSigners(zone.clone()));
    }
    let (signer_rtype, parent_rtype) = direction.rtypes();

    let mut ttl = 0;
    for member in &members {
        if member.signer.address.is_empty() {
            return Err(Error::MissingAddress(member.name.clone()));
        }
        let answer = ctx.query(&member.signer.address, zone, signer_rtype).await?;
        for rr in &answer.records {
            out.line(format!("{}: {} ttl {}", member.name, rr.data, rr.ttl));
        }
        ttl = ttl.max(answer.max_ttl());
    }
    let parent = ctx.state().group(zone)?.parent.clone();
    if parent.is_empty() {
        return Err(Error::MissingAddress(format!("parent of {zone}")));
    }
    let answer = ctx.query(&parent, zone, parent_rtype).await?;
    for rr in &answer.records {
        out.line(format!("parent: {} ttl {}", rr.data, rr.ttl));
    }
    ttl = ttl.max(answer.max_ttl());
    out.line(format!("Largest TTL {ttl}"));

    let until = now + Duration::seconds(2 * i64::from(ttl));
    {
        let group = ctx.state_mut().group_mut(zone)?;
        match direction {
            Direction::Ds => group.wait_ds = Some(until),
            Direction::Ns => group.wait_ns = Some(until),
        }
    }
    info!(%zone, %direction, ttl, "wait deadline set");
    report(until, now, out)?;
    Ok(until)
}
