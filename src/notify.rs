//! Status push to observers.
//!
//! Commands and the automation scheduler publish [`Event`]s; the RPC server forwards them to
//! every connected websocket client. Publishing never blocks and never fails: events are
//! dropped when nobody is listening, and slow observers miss events rather than holding up
//! the publisher.

use crate::automate::Stage;
use crate::store::State;
use serde::Serialize;
use tokio::sync::broadcast;
use trust_dns_client::rr::LowerName;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignerStatus {
    pub name: String,
    pub leaving: bool,
}

/// A status notification, serialized as a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Event {
    /// `{"log": "..."}`
    Log { log: String },
    /// `{"fqdn": "...", "stage": "...", "signers": [{"name": "...", "leaving": false}]}`
    Status {
        fqdn: String,
        stage: Stage,
        signers: Vec<SignerStatus>,
    },
    /// `{"fqdn": "...", "left": "..."}`, a signer was removed from the group.
    Left { fqdn: String, left: String },
}

impl Event {
    /// The status event of a group, or `None` if the group doesn't exist.
    #[must_use]
    pub fn status(state: &State, zone: &LowerName) -> Option<Event> {
        let group = state.groups.get(zone)?;
        let signers = group
            .signers
            .iter()
            .map(|name| SignerStatus {
                name: name.clone(),
                leaving: state.signers.get(name).map_or(false, |s| s.leaving),
            })
            .collect();
        Some(Event::Status {
            fqdn: zone.to_string(),
            stage: group.stage,
            signers,
        })
    }
}

/// Fan-out of [`Event`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Event>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Notifier { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // Err only means there are no subscribers.
        let _ = self.tx.send(event);
    }

    pub fn log(&self, line: impl Into<String>) {
        self.publish(Event::Log { log: line.into() });
    }

    pub fn status(&self, state: &State, zone: &LowerName) {
        if let Some(event) = Event::status(state, zone) {
            self.publish(event);
        }
    }
}
