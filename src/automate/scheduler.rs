//! Periodic automation of started groups.
//!
//! Every started group gets its own task. On each tick the task takes the controller's lock,
//! steps the group's state machine once and saves the state, then logs the step's output and
//! pushes it to observers. Tasks are stopped cooperatively through a watch channel.

use crate::controller::Controller;
use crate::error::Error;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};
use trust_dns_client::rr::LowerName;

#[derive(Debug)]
struct Task {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Task {
    fn running(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    tasks: Mutex<HashMap<LowerName, Task>>,
    stopping: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Scheduler {
            interval,
            tasks: Mutex::new(HashMap::new()),
            stopping: Mutex::new(Vec::new()),
        }
    }

    pub async fn is_running(&self, zone: &LowerName) -> bool {
        self.tasks.lock().await.get(zone).map_or(false, Task::running)
    }

    /// The groups with a running automation task.
    pub async fn running(&self) -> Vec<LowerName> {
        let mut zones: Vec<LowerName> = self
            .tasks
            .lock()
            .await
            .iter()
            .filter(|(_, task)| task.running())
            .map(|(zone, _)| zone.clone())
            .collect();
        zones.sort();
        zones
    }

    /// Spawn the automation task of `zone`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AutomationRunning`] if the group's task is already running.
    pub(crate) async fn start(&self, controller: Arc<Controller>, zone: LowerName) -> Result<(), Error> {
        let mut tasks = self.tasks.lock().await;
        if tasks.get(&zone).map_or(false, Task::running) {
            return Err(Error::AutomationRunning(zone));
        }
        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(run(controller, zone.clone(), self.interval, stopped));
        tasks.insert(zone, Task { stop, handle });
        Ok(())
    }

    /// Ask the automation task of `zone` to stop. The task finishes the step it is in, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AutomationNotRunning`] if the group has no running task.
    pub async fn stop(&self, zone: &LowerName) -> Result<(), Error> {
        let task = self
            .tasks
            .lock()
            .await
            .remove(zone)
            .filter(Task::running)
            .ok_or_else(|| Error::AutomationNotRunning(zone.clone()))?;
        // Err only means the task is already gone.
        let _ = task.stop.send(true);
        self.stopping.lock().await.push(task.handle);
        Ok(())
    }

    /// Stop every task and wait for them to finish.
    pub async fn shutdown(&self) {
        let mut handles = std::mem::take(&mut *self.stopping.lock().await);
        for (zone, task) in self.tasks.lock().await.drain() {
            info!(%zone, "stopping automation");
            let _ = task.stop.send(true);
            handles.push(task.handle);
        }
        for handle in handles {
            if let Err(err) = handle.await {
                error!(%err, "automation task failed");
            }
        }
    }
}

async fn run(
    controller: Arc<Controller>,
    zone: LowerName,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    info!(%zone, ?interval, "automation started");
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        if *stop.borrow() {
            break;
        }

        let Some((out, result)) = controller.tick(&zone, &stop).await else {
            break;
        };
        let notifier = controller.notifier();
        for line in out {
            info!(%zone, "{line}");
            notifier.log(format!("{zone}: {line}"));
        }
        if let Err(err) = result {
            error!(%zone, %err, "automation step failed");
            notifier.log(format!("{zone}: error: {err}"));
        }
    }
    info!(%zone, "automation stopped");
}
