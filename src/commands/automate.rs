use crate::automate::{machine, Stage};
use crate::commands::Args;
use crate::context::Context;
use crate::controller::{Controller, Mode};
use crate::error::Error;
use crate::transcript::Transcript;
use std::sync::Arc;

pub(super) async fn step(
    controller: &Arc<Controller>,
    ctx: &mut Context,
    args: &Args<'_>,
    out: &mut Transcript,
) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    if controller.scheduler().is_running(&zone).await {
        return Err(Error::AutomationRunning(zone));
    }
    match args.opt(1) {
        Some(stage) => {
            let stage: Stage = stage.parse()?;
            machine::step_manual(ctx, &zone, stage, out).await?;
        }
        None => {
            machine::step(ctx, &zone, out).await?;
        }
    }
    Ok(())
}

pub(super) async fn start(
    controller: &Arc<Controller>,
    ctx: &mut Context,
    args: &Args<'_>,
    out: &mut Transcript,
) -> Result<(), Error> {
    if controller.mode() != Mode::Daemon {
        return Err(Error::DaemonOnly("automate-start"));
    }
    let zone = args.fqdn(0)?;
    ctx.state().group(&zone)?;
    controller
        .scheduler()
        .start(Arc::clone(controller), zone.clone())
        .await?;
    out.line(format!("Automation for {zone} started"));
    Ok(())
}

pub(super) async fn stop(
    controller: &Arc<Controller>,
    ctx: &mut Context,
    args: &Args<'_>,
    out: &mut Transcript,
) -> Result<(), Error> {
    if controller.mode() != Mode::Daemon {
        return Err(Error::DaemonOnly("automate-stop"));
    }
    let zone = args.fqdn(0)?;
    ctx.state().group(&zone)?;
    controller.scheduler().stop(&zone).await?;
    out.line(format!("Automation for {zone} stopped"));
    Ok(())
}

pub(super) fn error(ctx: &Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    out.line(match machine::last_error(ctx.state(), &zone)? {
        Some(err) => format!("{zone}: {err}"),
        None => format!("{zone}: no error"),
    });
    Ok(())
}

pub(super) fn clear_error(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    match machine::clear_error(ctx.state_mut(), &zone, args.get(1)?)? {
        Some(stage) => {
            out.line(format!("{zone}: error cleared, stage {stage}"));
            ctx.publish_status(&zone);
        }
        None => out.line("No automation error"),
    }
    Ok(())
}

pub(super) fn manual(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    machine::manual(ctx.state_mut(), &zone)?;
    out.line(format!("{zone}: manual mode"));
    ctx.publish_status(&zone);
    Ok(())
}

pub(super) fn resume(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    let stage = machine::resume(ctx.state_mut(), &zone, args.get(1)?)?;
    out.line(format!("{zone}: resumed at stage {stage}"));
    ctx.publish_status(&zone);
    Ok(())
}

pub(super) fn autostart(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let state = ctx.state_mut();
    if args.opt(0).is_none() {
        if state.autostart.is_empty() {
            out.line("No groups autostart");
        }
        for zone in &state.autostart {
            out.line(zone.to_string());
        }
        return Ok(());
    }

    let zone = args.fqdn(0)?;
    state.group(&zone)?;
    if state.autostart.contains(&zone) {
        out.line(format!("{zone} already autostarts"));
    } else {
        state.autostart.push(zone.clone());
        out.line(format!("{zone} will autostart"));
    }
    Ok(())
}

pub(super) fn no_autostart(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    let state = ctx.state_mut();
    state.group(&zone)?;
    let before = state.autostart.len();
    state.autostart.retain(|z| *z != zone);
    out.line(if state.autostart.len() < before {
        format!("{zone} will no longer autostart")
    } else {
        format!("{zone} does not autostart")
    });
    Ok(())
}
