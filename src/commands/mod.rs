//! The command surface.
//!
//! Commands are positional: `<command> [args...]`. They run with the controller's lock held
//! and write their human readable output to a [`Transcript`].

mod automate;
mod conf;
mod group;
mod signer;
mod zone;

use crate::context::Context;
use crate::controller::Controller;
use crate::error::Error;
use crate::records::parse_fqdn;
use crate::transcript::Transcript;
use std::sync::Arc;
use tracing::debug;
use trust_dns_client::rr::LowerName;

/// A command's name, its arguments and what it does.
pub struct Command {
    pub name: &'static str,
    pub args: &'static str,
    pub help: &'static str,
}

const fn cmd(name: &'static str, args: &'static str, help: &'static str) -> Command {
    Command { name, args, help }
}

pub const COMMANDS: &[Command] = &[
    cmd("help", "", "list commands"),
    cmd("group-add", "<fqdn> <parent> [port]", "add a group"),
    cmd("group-list", "", "list groups"),
    cmd("group-remove", "<fqdn>", "remove a group without signers"),
    cmd("signer-add", "<group> <name> <ns-fqdn> <addr>[:port]", "add a signer to a group"),
    cmd("signer-list", "<group>", "list the signers of a group"),
    cmd("signer-remove", "<name>", "remove a leaving signer"),
    cmd("signer-mark-leave", "<name>", "mark a signer as leaving its group"),
    cmd("signer-unmark-leave", "<name>", "take back a leave"),
    cmd("signer-tsig", "<name> [key]", "show or set the TSIG key of a signer"),
    cmd("signer-type", "<name> <nsupdate|desec> [token]", "set how a signer is updated"),
    cmd("signer-csk", "<name> <yes|no>", "mark a signer as using a combined signing key"),
    cmd("status", "<fqdn>", "check whether the signers and the parent are in sync"),
    cmd("sync-dnskey", "<fqdn>", "sync DNSKEYs between signers"),
    cmd("sync-cdscdnskeys", "<fqdn>", "publish CDS/CDNSKEYs for every KSK at every signer"),
    cmd("sync-ns", "<fqdn>", "sync NSes between signers"),
    cmd("wait-ds", "<fqdn>", "compute or show the DS wait deadline"),
    cmd("wait-ns", "<fqdn>", "compute or show the NS wait deadline"),
    cmd("add-csync", "<fqdn>", "publish CSYNC at every signer"),
    cmd("remove-csync", "<fqdn>", "remove CSYNC from every signer"),
    cmd("remove-cdscdnskeys", "<fqdn>", "remove CDS/CDNSKEYs from every signer"),
    cmd("automate-step", "<fqdn> [stage]", "run one automation step"),
    cmd("automate-start", "<fqdn>", "start the automation of a group (daemon only)"),
    cmd("automate-stop", "<fqdn>", "stop the automation of a group (daemon only)"),
    cmd("automate-error", "<fqdn>", "show why the automation failed"),
    cmd("automate-clear-error", "<fqdn> <stage>", "leave the error stage"),
    cmd("automate-manual", "<fqdn>", "enter manual mode"),
    cmd("automate-resume", "<fqdn> <stage>", "leave manual mode"),
    cmd("automate-autostart", "[fqdn]", "list, or add a group to, the autostart list"),
    cmd("automate-no-autostart", "<fqdn>", "remove a group from the autostart list"),
    cmd("conf-get", "<key>", "show a config entry"),
    cmd("conf-set", "<key> <value>", "set a config entry"),
    cmd("conf-remove", "<key>", "remove a config entry"),
    cmd("conf-list", "", "list all config entries"),
];

/// Positional arguments of a command.
pub(crate) struct Args<'a> {
    args: &'a [String],
    usage: &'static str,
}

impl<'a> Args<'a> {
    fn new(args: &'a [String], usage: &'static str) -> Self {
        Args { args, usage }
    }

    pub(crate) fn get(&self, i: usize) -> Result<&'a str, Error> {
        self.args
            .get(i)
            .map(String::as_str)
            .ok_or(Error::Usage(self.usage))
    }

    pub(crate) fn opt(&self, i: usize) -> Option<&'a str> {
        self.args.get(i).map(String::as_str)
    }

    pub(crate) fn fqdn(&self, i: usize) -> Result<LowerName, Error> {
        parse_fqdn(self.get(i)?)
    }
}

fn help(out: &mut Transcript) {
    for command in COMMANDS {
        if command.args.is_empty() {
            out.line(format!("{}: {}", command.name, command.help));
        } else {
            out.line(format!("{} {}: {}", command.name, command.args, command.help));
        }
    }
}

/// Dispatch `args` to the command it names.
///
/// # Errors
///
/// Returns [`Error::Usage`] for an empty argument list, [`Error::UnknownCommand`] for a name
/// that isn't in [`COMMANDS`], or the command's error.
pub(crate) async fn run(
    controller: &Arc<Controller>,
    ctx: &mut Context,
    args: &[String],
    out: &mut Transcript,
) -> Result<(), Error> {
    let (name, rest) = args.split_first().ok_or(Error::Usage("a command"))?;
    let command = COMMANDS
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| Error::UnknownCommand(name.clone()))?;
    let args = Args::new(rest, command.args);
    debug!(command = command.name, ?rest, "running command");

    match command.name {
        "help" => {
            help(out);
            Ok(())
        }
        "group-add" => group::add(ctx, &args, out),
        "group-list" => group::list(ctx, out),
        "group-remove" => group::remove(controller, ctx, &args, out).await,
        "signer-add" => signer::add(ctx, &args, out),
        "signer-list" => signer::list(ctx, &args, out),
        "signer-remove" => signer::remove(ctx, &args, out),
        "signer-mark-leave" => signer::mark_leave(ctx, &args, true, out),
        "signer-unmark-leave" => signer::mark_leave(ctx, &args, false, out),
        "signer-tsig" => signer::tsig(ctx, &args, out),
        "signer-type" => signer::kind(ctx, &args, out),
        "signer-csk" => signer::csk(ctx, &args, out),
        "status" | "sync-dnskey" | "sync-cdscdnskeys" | "sync-ns" | "wait-ds" | "wait-ns"
        | "add-csync" | "remove-csync" | "remove-cdscdnskeys" => {
            zone::run(ctx, command.name, &args, out).await
        }
        "automate-step" => automate::step(controller, ctx, &args, out).await,
        "automate-start" => automate::start(controller, ctx, &args, out).await,
        "automate-stop" => automate::stop(controller, ctx, &args, out).await,
        "automate-error" => automate::error(ctx, &args, out),
        "automate-clear-error" => automate::clear_error(ctx, &args, out),
        "automate-manual" => automate::manual(ctx, &args, out),
        "automate-resume" => automate::resume(ctx, &args, out),
        "automate-autostart" => automate::autostart(ctx, &args, out),
        "automate-no-autostart" => automate::no_autostart(ctx, &args, out),
        "conf-get" => conf::get(ctx, &args, out),
        "conf-set" => conf::set(ctx, &args, out),
        "conf-remove" => conf::remove(ctx, &args, out),
        "conf-list" => conf::list(ctx, out),
        _ => Err(Error::UnknownCommand(name.clone())),
    }
}
