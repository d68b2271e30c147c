use crate::automate::machine::membership_changed;
use crate::automate::Stage;
use crate::commands::group::server_address;
use crate::commands::Args;
use crate::context::Context;
use crate::error::Error;
use crate::notify::Event;
use crate::records::parse_fqdn;
use crate::store::Signer;
use crate::transcript::Transcript;
use crate::updater::UpdaterKind;
use std::net::{IpAddr, SocketAddr};
use tracing::info;

/// `host:port` of a signer given as `<host>`, `<ip>`, `<host>:<port>` or `<ip>:<port>`
/// (`[<ipv6>]:<port>`).
fn signer_address(addr: &str) -> Result<String, Error> {
    if addr.parse::<SocketAddr>().is_ok() {
        return Ok(addr.to_string());
    }
    if addr.parse::<IpAddr>().is_ok() {
        return server_address(addr, None);
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => server_address(host, Some(port)),
        None => server_address(addr, None),
    }
}

fn yes_no(what: &'static str, value: &str) -> Result<bool, Error> {
    match value {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(Error::InvalidArgument {
            what,
            value: value.to_string(),
        }),
    }
}

pub(super) fn add(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    let name = args.get(1)?;
    let nameserver = parse_fqdn(args.get(2)?)?;
    let address = signer_address(args.get(3)?)?;

    let state = ctx.state_mut();
    state.add_signer(
        name,
        Signer {
            group: zone.clone(),
            address: address.clone(),
            nameserver,
            kind: UpdaterKind::default(),
            credential: None,
            leaving: false,
            csk: false,
        },
    )?;
    info!(%zone, signer = name, %address, "signer added");
    out.line(format!("Signer {name} added to {zone}"));
    membership_changed(state, &zone, Stage::JOIN, out)?;
    ctx.publish_status(&zone);
    Ok(())
}

pub(super) fn list(ctx: &Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    let members = ctx.state().members(&zone)?;
    if members.is_empty() {
        out.line(format!("No signers in {zone}"));
    }
    for member in members {
        let signer = &member.signer;
        let mut line = format!(
            "{} {} ns {} type {} key {}",
            member.name,
            signer.address,
            signer.nameserver,
            signer.kind,
            signer.credential.as_deref().unwrap_or("-")
        );
        if signer.leaving {
            line.push_str(" leaving");
        }
        if signer.csk {
            line.push_str(" csk");
        }
        out.line(line);
    }
    Ok(())
}

pub(super) fn remove(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let name = args.get(0)?;
    let state = ctx.state_mut();
    let signer = state.signer(name)?;
    if !signer.leaving {
        return Err(Error::SignerNotLeaving(name.to_string()));
    }
    let zone = signer.group.clone();
    let stage = state.group(&zone)?.stage;
    if stage != Stage::Ready {
        return Err(Error::WrongStage(zone, stage, "ready"));
    }

    state.remove_signer(name)?;
    info!(%zone, signer = name, "signer removed");
    out.line(format!("Signer {name} removed from {zone}"));
    ctx.notifier().publish(Event::Left {
        fqdn: zone.to_string(),
        left: name.to_string(),
    });
    ctx.publish_status(&zone);
    Ok(())
}

pub(super) fn mark_leave(
    ctx: &mut Context,
    args: &Args<'_>,
    leaving: bool,
    out: &mut Transcript,
) -> Result<(), Error> {
    let name = args.get(0)?;
    let state = ctx.state_mut();
    let signer = state.signer_mut(name)?;
    let zone = signer.group.clone();
    if signer.leaving == leaving {
        out.line(if leaving {
            format!("Signer {name} is already leaving")
        } else {
            format!("Signer {name} is not leaving")
        });
        return Ok(());
    }
    signer.leaving = leaving;
    info!(%zone, signer = name, leaving, "signer leave changed");

    let entry = if leaving {
        out.line(format!("Signer {name} marked as leaving {zone}"));
        Stage::LEAVE
    } else {
        out.line(format!("Signer {name} no longer leaving {zone}"));
        Stage::JOIN
    };
    membership_changed(state, &zone, entry, out)?;
    ctx.publish_status(&zone);
    Ok(())
}

pub(super) fn tsig(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let name = args.get(0)?;
    let state = ctx.state_mut();
    let Some(key) = args.opt(1) else {
        let signer = state.signer(name)?;
        out.line(match &signer.credential {
            Some(key) => format!("Signer {name} uses TSIG key {key}"),
            None => format!("Signer {name} has no TSIG key"),
        });
        return Ok(());
    };

    state.signer(name)?;
    if !state.tsig_keys.contains_key(key) {
        return Err(Error::MissingSecret(key.to_string()));
    }
    state.signer_mut(name)?.credential = Some(key.to_string());
    out.line(format!("Signer {name} now uses TSIG key {key}"));
    Ok(())
}

pub(super) fn kind(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let name = args.get(0)?;
    let kind: UpdaterKind = args.get(1)?.parse()?;
    let signer = ctx.state_mut().signer_mut(name)?;
    signer.kind = kind;
    if let Some(token) = args.opt(2) {
        signer.credential = Some(token.to_string());
    }
    info!(signer = name, %kind, "signer type changed");
    out.line(format!("Signer {name} is now updated with {kind}"));
    Ok(())
}

pub(super) fn csk(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let name = args.get(0)?;
    let csk = yes_no("signer-csk", args.get(1)?)?;
    ctx.state_mut().signer_mut(name)?.csk = csk;
    out.line(if csk {
        format!("Signer {name} uses a combined signing key")
    } else {
        format!("Signer {name} uses separate KSKs and ZSKs")
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signer_addresses() {
        assert_eq!(signer_address("192.0.2.1").unwrap(), "192.0.2.1:53");
        assert_eq!(signer_address("192.0.2.1:5353").unwrap(), "192.0.2.1:5353");
        assert_eq!(signer_address("[2001:db8::1]:53").unwrap(), "[2001:db8::1]:53");
        assert_eq!(signer_address("2001:db8::1").unwrap(), "[2001:db8::1]:53");
        assert_eq!(signer_address("ns1.example.net").unwrap(), "ns1.example.net:53");
        assert!(signer_address("ns1.example.net:domain").is_err());
    }

    #[test]
    fn yes_or_no() {
        assert!(yes_no("x", "yes").unwrap());
        assert!(!yes_no("x", "no").unwrap());
        assert!(yes_no("x", "true").is_err());
    }
}
