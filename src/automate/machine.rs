use crate::automate::Stage;
use crate::context::Context;
use crate::error::Error;
use crate::store::{State, SyncFlag};
use crate::transcript::Transcript;
use crate::wait::{self, Direction};
use crate::{signals, status, sync};
use time::OffsetDateTime;
use tracing::{error, info};
use trust_dns_client::rr::LowerName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    SyncDnskeys,
    SyncCdscdnskeys,
    SyncNses,
    AddCsync,
    RemoveCsync,
    RemoveCdscdnskeys,
}

/// What stepping a stage does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Work {
    Rest,
    Act(Action),
    Check(SyncFlag),
    Wait(Direction),
}

fn work(stage: Stage) -> Work {
    match stage {
        Stage::Ready | Stage::Manual | Stage::Error => Work::Rest,

        Stage::JoinSyncDnskeys | Stage::LeaveSyncDnskeys => Work::Act(Action::SyncDnskeys),
        Stage::JoinSyncCdscdnskeys | Stage::LeaveSyncCdscdnskeys => {
            Work::Act(Action::SyncCdscdnskeys)
        }
        Stage::JoinSyncNses | Stage::LeaveSyncNses => Work::Act(Action::SyncNses),
        Stage::JoinAddCsync | Stage::LeaveAddCsync => Work::Act(Action::AddCsync),
        Stage::JoinRemoveCsync | Stage::LeaveRemoveCsync => Work::Act(Action::RemoveCsync),
        Stage::JoinRemoveCdscdnskeys | Stage::LeaveRemoveCdscdnskeys => {
            Work::Act(Action::RemoveCdscdnskeys)
        }

        Stage::JoinDnskeysSynced | Stage::LeaveDnskeysSynced => Work::Check(SyncFlag::Dnskeys),
        Stage::JoinCdscdnskeysSynced | Stage::LeaveCdscdnskeysSynced => {
            Work::Check(SyncFlag::Cdscdnskeys)
        }
        Stage::JoinParentDsSynced | Stage::LeaveParentDsSynced => Work::Check(SyncFlag::ParentDs),
        Stage::JoinNsesSynced | Stage::LeaveNsesSynced => Work::Check(SyncFlag::Nses),
        Stage::JoinParentNsSynced | Stage::LeaveParentNsSynced => Work::Check(SyncFlag::ParentNs),

        Stage::JoinWaitDs => Work::Wait(Direction::Ds),
        Stage::LeaveWaitNs => Work::Wait(Direction::Ns),
    }
}

/// Perform the work of `stage` and return the stage the group should move to. The group's
/// stage itself is left alone.
async fn run(
    ctx: &mut Context,
    zone: &LowerName,
    stage: Stage,
    out: &mut Transcript,
) -> Result<Stage, Error> {
    match work(stage) {
        Work::Rest => Ok(stage),
        Work::Act(action) => {
            match action {
                Action::SyncDnskeys => sync::sync_dnskey(ctx, zone, out).await?,
                Action::SyncCdscdnskeys => sync::sync_cdscdnskeys(ctx, zone, out).await?,
                Action::SyncNses => sync::sync_ns(ctx, zone, out).await?,
                Action::AddCsync => signals::add_csync(ctx, zone, out).await?,
                Action::RemoveCsync => signals::remove_csync(ctx, zone, out).await?,
                Action::RemoveCdscdnskeys => signals::remove_cdscdnskeys(ctx, zone, out).await?,
            }
            Ok(stage.next())
        }
        Work::Check(flag) => {
            let flags = status::status(ctx, zone, out).await?;
            if flags.get(flag) {
                out.line(format!("{flag} synced"));
                Ok(stage.next())
            } else {
                out.line(format!("{flag} not synced yet"));
                Ok(stage.retry())
            }
        }
        Work::Wait(direction) => {
            let until = wait::wait(ctx, zone, direction, out).await?;
            if OffsetDateTime::now_utc() < until {
                return Ok(stage);
            }
            out.line(format!("{direction} wait is over"));
            wait::clear(ctx, zone, direction)?;
            Ok(stage.next())
        }
    }
}

/// Advance the automation of `zone` by one stage.
///
/// A failing stage moves the group to [`Stage::Error`] with the failure's message stored, and
/// the failure is returned. Resting stages do nothing.
///
/// # Errors
///
/// Returns [`Error::NoSuchGroup`] if `zone` isn't a group, or the error of the stage's work.
pub async fn step(ctx: &mut Context, zone: &LowerName, out: &mut Transcript) -> Result<Stage, Error> {
    let stage = ctx.state().group(zone)?.stage;
    match stage {
        Stage::Ready => {
            out.line("Nothing to do");
            return Ok(stage);
        }
        Stage::Error => {
            out.line("Error exist");
            return Ok(stage);
        }
        Stage::Manual => {
            out.line("In manual mode, name a stage to run");
            return Ok(stage);
        }
        _ => {}
    }

    match run(ctx, zone, stage, out).await {
        Ok(next) => {
            if next != stage {
                ctx.state_mut().group_mut(zone)?.stage = next;
                info!(%zone, from = %stage, to = %next, "stage changed");
                out.line(format!("{zone}: {stage} -> {next}"));
                ctx.publish_status(zone);
            }
            Ok(next)
        }
        Err(err) => {
            error!(%zone, %stage, %err, "automation step failed");
            out.line(format!("{zone}: {stage} failed: {err}"));
            let group = ctx.state_mut().group_mut(zone)?;
            group.stage = Stage::Error;
            group.error = Some(err.to_string());
            ctx.publish_status(zone);
            Err(err)
        }
    }
}

/// Run the work of `stage` for a group in [`Stage::Manual`] and report where the automation
/// would go from there. The group stays in manual mode.
///
/// # Errors
///
/// Returns [`Error::WrongStage`] unless the group is in manual mode, or the error of the
/// stage's work.
pub async fn step_manual(
    ctx: &mut Context,
    zone: &LowerName,
    stage: Stage,
    out: &mut Transcript,
) -> Result<Stage, Error> {
    let current = ctx.state().group(zone)?.stage;
    if current != Stage::Manual {
        return Err(Error::WrongStage(zone.clone(), current, "manual"));
    }
    let next = run(ctx, zone, stage, out).await?;
    out.line(format!("{zone}: {stage} -> {next} (manual, not moved)"));
    Ok(next)
}

/// Start the join or leave sequence after a membership change.
///
/// Nothing happens for groups with fewer than two signers, or groups in manual mode or in
/// error. Returns whether the sequence was started.
///
/// # Errors
///
/// Returns [`Error::NoSuchGroup`] if `zone` isn't a group.
pub fn membership_changed(
    state: &mut State,
    zone: &LowerName,
    entry: Stage,
    out: &mut Transcript,
) -> Result<bool, Error> {
    let group = state.group_mut(zone)?;
    if group.signers.len() < 2 || matches!(group.stage, Stage::Manual | Stage::Error) {
        return Ok(false);
    }
    let from = group.stage;
    group.stage = entry;
    group.wait_ds = None;
    group.wait_ns = None;
    info!(%zone, %from, to = %entry, "membership changed");
    out.line(format!("{zone}: {from} -> {entry}"));
    Ok(true)
}

/// The message of the failure that moved `zone` to [`Stage::Error`].
///
/// # Errors
///
/// Returns [`Error::NoSuchGroup`] if `zone` isn't a group.
pub fn last_error<'a>(state: &'a State, zone: &LowerName) -> Result<Option<&'a str>, Error> {
    Ok(state.group(zone)?.error.as_deref())
}

/// Leave [`Stage::Error`] for `stage`, forgetting the stored error. Returns `None` without
/// changing anything if the group isn't in error.
///
/// # Errors
///
/// Returns [`Error::InvalidStage`] if `stage` isn't `ready` or a join/leave stage.
pub fn clear_error(state: &mut State, zone: &LowerName, stage: &str) -> Result<Option<Stage>, Error> {
    let target: Stage = stage.parse()?;
    if matches!(target, Stage::Error | Stage::Manual) {
        return Err(Error::InvalidStage(stage.to_string()));
    }
    let group = state.group_mut(zone)?;
    if group.stage != Stage::Error {
        return Ok(None);
    }
    group.stage = target;
    group.error = None;
    info!(%zone, stage = %target, "error cleared");
    Ok(Some(target))
}

/// Enter [`Stage::Manual`] from [`Stage::Ready`] or [`Stage::Error`].
///
/// # Errors
///
/// Returns [`Error::WrongStage`] if the group is in any other stage.
pub fn manual(state: &mut State, zone: &LowerName) -> Result<(), Error> {
    let group = state.group_mut(zone)?;
    if !matches!(group.stage, Stage::Ready | Stage::Error) {
        return Err(Error::WrongStage(zone.clone(), group.stage, "ready or error"));
    }
    group.stage = Stage::Manual;
    group.error = None;
    info!(%zone, "manual mode");
    Ok(())
}

/// Leave [`Stage::Manual`] for `stage`.
///
/// # Errors
///
/// Returns [`Error::WrongStage`] unless the group is in manual mode, and
/// [`Error::InvalidStage`] if `stage` isn't a stage name.
pub fn resume(state: &mut State, zone: &LowerName, stage: &str) -> Result<Stage, Error> {
    let stage: Stage = stage.parse()?;
    let group = state.group_mut(zone)?;
    if group.stage != Stage::Manual {
        return Err(Error::WrongStage(zone.clone(), group.stage, "manual"));
    }
    group.stage = stage;
    info!(%zone, %stage, "resumed");
    Ok(stage)
}
