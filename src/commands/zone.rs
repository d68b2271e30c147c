//! Commands that operate on the signers of a group.

use crate::commands::Args;
use crate::context::Context;
use crate::error::Error;
use crate::transcript::Transcript;
use crate::wait::{self, Direction};
use crate::{signals, status, sync};
use time::OffsetDateTime;

pub(super) async fn run(
    ctx: &mut Context,
    command: &str,
    args: &Args<'_>,
    out: &mut Transcript,
) -> Result<(), Error> {
    let zone = args.fqdn(0)?;
    match command {
        "status" => {
            status::status(ctx, &zone, out).await?;
        }
        "sync-dnskey" => sync::sync_dnskey(ctx, &zone, out).await?,
        "sync-cdscdnskeys" => sync::sync_cdscdnskeys(ctx, &zone, out).await?,
        "sync-ns" => sync::sync_ns(ctx, &zone, out).await?,
        "wait-ds" | "wait-ns" => {
            let direction = if command == "wait-ds" {
                Direction::Ds
            } else {
                Direction::Ns
            };
            let until = wait::wait(ctx, &zone, direction, out).await?;
            if OffsetDateTime::now_utc() >= until {
                out.line("Wait is over");
            }
        }
        "add-csync" => signals::add_csync(ctx, &zone, out).await?,
        "remove-csync" => signals::remove_csync(ctx, &zone, out).await?,
        "remove-cdscdnskeys" => signals::remove_cdscdnskeys(ctx, &zone, out).await?,
        _ => return Err(Error::UnknownCommand(command.to_string())),
    }
    Ok(())
}
