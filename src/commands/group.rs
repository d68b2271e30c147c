use crate::commands::Args;
use crate::context::Context;
use crate::controller::Controller;
use crate::error::Error;
use crate::store::Group;
use crate::transcript::Transcript;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::info;

/// `host:port` of a server given as a host (or IP) and an optional port.
pub(crate) fn server_address(host: &str, port: Option<&str>) -> Result<String, Error> {
    let port = match port {
        Some(port) => port.parse::<u16>().map_err(|_| Error::InvalidArgument {
            what: "port",
            value: port.to_string(),
        })?,
        None => 53,
    };
    if host.is_empty() {
        return Err(Error::InvalidArgument {
            what: "address",
            value: String::new(),
        });
    }
    Ok(match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{ip}]:{port}"),
        _ => format!("{host}:{port}"),
    })
}

pub(super) fn add(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    let parent = server_address(args.get(1)?, args.opt(2))?;
    ctx.state_mut()
        .add_group(zone.clone(), Group::new(parent.clone()))?;
    info!(%zone, %parent, "group added");
    out.line(format!("Group {zone} added with parent {parent}"));
    ctx.publish_status(&zone);
    Ok(())
}

pub(super) fn list(ctx: &Context, out: &mut Transcript) -> Result<(), Error> {
    let groups = &ctx.state().groups;
    if groups.is_empty() {
        out.line("No groups");
    }
    for (zone, group) in groups {
        out.line(format!(
            "{zone} parent {} stage {} signers {}",
            group.parent,
            group.stage,
            group.signers.join(",")
        ));
    }
    Ok(())
}

pub(super) async fn remove(
    controller: &Arc<Controller>,
    ctx: &mut Context,
    args: &Args<'_>,
    out: &mut Transcript,
) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    if controller.scheduler().is_running(&zone).await {
        return Err(Error::AutomationRunning(zone));
    }
    ctx.state_mut().remove_group(&zone)?;
    info!(%zone, "group removed");
    out.line(format!("Group {zone} removed"));
    Ok(())
}
