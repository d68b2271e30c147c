use crate::commands::Args;
use crate::context::Context;
use crate::error::Error;
use crate::transcript::Transcript;
use tracing::info;

pub(super) fn get(ctx: &Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let key = args.get(0)?;
    out.line(match ctx.state().entry(key)? {
        Some(value) => format!("{key}: {value}"),
        None => format!("{key} is not set"),
    });
    Ok(())
}

pub(super) fn set(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let key = args.get(0)?;
    ctx.state_mut().set_entry(key, args.get(1)?)?;
    info!(key, "config entry set");
    out.line(format!("{key} set"));
    Ok(())
}

pub(super) fn remove(ctx: &mut Context, args: &Args<'_>, out: &mut Transcript) -> Result<(), Error> {
    let key = args.get(0)?;
    if ctx.state_mut().remove_entry(key)? {
        info!(key, "config entry removed");
        out.line(format!("{key} removed"));
    } else {
        out.line(format!("{key} is not set"));
    }
    Ok(())
}

pub(super) fn list(ctx: &Context, out: &mut Transcript) -> Result<(), Error> {
    for (key, value) in ctx.state().entries()? {
        out.line(format!("{key}: {value}"));
    }
    Ok(())
}
