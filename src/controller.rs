//! The single writer.
//!
//! The [`Controller`] owns the [`Context`] behind one lock. Every command, whether it comes
//! from the command line or the RPC API, and every automation step runs while holding it, so
//! state changes and the DNS updates they cause never interleave.

use crate::automate::{self, Scheduler, Stage};
use crate::commands;
use crate::context::Context;
use crate::error::Error;
use crate::notify::{Event, Notifier};
use crate::transcript::Transcript;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{error, info, warn};
use trust_dns_client::rr::LowerName;

/// Whether the process is the long running daemon or a one-shot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Daemon,
}

pub struct Controller {
    mode: Mode,
    context: Mutex<Context>,
    notifier: Notifier,
    scheduler: Scheduler,
}

impl Controller {
    #[must_use]
    pub fn new(mode: Mode, context: Context, automate_interval: Duration) -> Arc<Self> {
        let notifier = context.notifier().clone();
        Arc::new(Controller {
            mode,
            context: Mutex::new(context),
            notifier,
            scheduler: Scheduler::new(automate_interval),
        })
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run one command, appending its output to `out`, and save the state.
    ///
    /// The state is saved whether the command succeeded or not: a failed automation step
    /// still moves its group to [`Stage::Error`].
    ///
    /// # Errors
    ///
    /// Returns the command's error, or the store's error if the state can't be saved.
    pub async fn execute(self: &Arc<Self>, args: &[String], out: &mut Transcript) -> Result<(), Error> {
        let mut ctx = self.context.lock().await;
        let result = commands::run(self, &mut ctx, args, out).await;
        if let Err(err) = ctx.save().await {
            error!(%err, "saving state failed");
            result?;
            return Err(err);
        }
        result
    }

    /// One automation step for `zone`, unless `stop` was signalled while waiting for the lock.
    pub(crate) async fn tick(
        &self,
        zone: &LowerName,
        stop: &watch::Receiver<bool>,
    ) -> Option<(Transcript, Result<Stage, Error>)> {
        let mut ctx = self.context.lock().await;
        if *stop.borrow() {
            return None;
        }
        let mut out = Transcript::new();
        let mut result = automate::step(&mut ctx, zone, &mut out).await;
        if let Err(err) = ctx.save().await {
            error!(%zone, %err, "saving state failed");
            if result.is_ok() {
                result = Err(err);
            }
        }
        Some((out, result))
    }

    /// Start the automation of every group on the autostart list. Returns how many were
    /// started.
    pub async fn autostart(self: &Arc<Self>) -> usize {
        let zones: Vec<LowerName> = {
            let ctx = self.context.lock().await;
            let state = ctx.state();
            state
                .autostart
                .iter()
                .filter(|zone| state.groups.contains_key(*zone))
                .cloned()
                .collect()
        };
        let mut started = 0;
        for zone in zones {
            match self.scheduler.start(Arc::clone(self), zone.clone()).await {
                Ok(()) => {
                    info!(%zone, "autostarted automation");
                    started += 1;
                }
                Err(err) => warn!(%zone, %err, "autostart failed"),
            }
        }
        started
    }

    /// Subscribe to status events, along with the current status of every group.
    pub async fn subscribe(&self) -> (Vec<Event>, broadcast::Receiver<Event>) {
        let ctx = self.context.lock().await;
        let rx = self.notifier.subscribe();
        let state = ctx.state();
        let current = state
            .groups
            .keys()
            .filter_map(|zone| Event::status(state, zone))
            .collect();
        (current, rx)
    }

    /// Stop the automation and save the state.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the state can't be saved.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.scheduler.shutdown().await;
        self.context.lock().await.save().await
    }
}
