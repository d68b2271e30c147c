#![allow(dead_code)]

use signercrab::dns::{Answer, Querier};
use signercrab::error::Error;
use signercrab::notify::Notifier;
use signercrab::records::{parse_fqdn, Dnskey, RecordData, Rr, Rtype};
use signercrab::store::State;
use signercrab::transcript::Transcript;
use signercrab::updater::{
    ChangeSet, DesecUpdater, UpdateTarget, Updater, UpdaterKind, UpdaterRegistry,
};
use signercrab::{Context, Controller, MemoryStateStore, Mode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trust_dns_client::rr::LowerName;

pub const ZONE: &str = "example.com.";
pub const PARENT: &str = "parent:53";

pub fn zone() -> LowerName {
    parse_fqdn(ZONE).unwrap()
}

pub fn zsk(n: u8) -> Dnskey {
    Dnskey::new(256, 13, vec![n; 64])
}

pub fn ksk(n: u8) -> Dnskey {
    Dnskey::new(257, 13, vec![n; 64])
}

pub fn ns(name: &str) -> RecordData {
    RecordData::Ns(parse_fqdn(name).unwrap())
}

/// In-memory authoritative servers keyed by address. Queries read their records, updates
/// modify them.
#[derive(Default)]
pub struct FakeNetwork {
    servers: Mutex<HashMap<String, Vec<Rr>>>,
    updates: Mutex<Vec<(String, ChangeSet)>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, server: &str, records: Vec<RecordData>) {
        let records = records.into_iter().map(|data| Rr::new(3600, data)).collect();
        self.servers
            .lock()
            .unwrap()
            .insert(server.to_string(), records);
    }

    pub fn add(&self, server: &str, rr: Rr) {
        self.servers
            .lock()
            .unwrap()
            .entry(server.to_string())
            .or_default()
            .push(rr);
    }

    /// Take `server` off the network; queries and updates addressed to it fail.
    pub fn unplug(&self, server: &str) {
        self.servers.lock().unwrap().remove(server);
    }

    pub fn records(&self, server: &str, rtype: Rtype) -> Vec<RecordData> {
        self.servers
            .lock()
            .unwrap()
            .get(server)
            .map(|records| {
                records
                    .iter()
                    .filter(|rr| rr.data.rtype() == rtype)
                    .map(|rr| rr.data.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn updates(&self) -> Vec<(String, ChangeSet)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn context(self: &Arc<Self>, state: State) -> Context {
        let mut updaters = UpdaterRegistry::new();
        updaters
            .register(UpdaterKind::Nsupdate, self.clone())
            .register(UpdaterKind::Desec, Arc::new(DesecUpdater));
        Context::new(
            Box::new(MemoryStateStore::new(state)),
            self.clone(),
            updaters,
            Notifier::new(),
        )
    }

    pub fn controller(self: &Arc<Self>, mode: Mode) -> Arc<Controller> {
        self.controller_every(mode, Duration::from_millis(20))
    }

    /// A controller whose automation tasks step every `interval`.
    pub fn controller_every(self: &Arc<Self>, mode: Mode, interval: Duration) -> Arc<Controller> {
        Controller::new(mode, self.context(State::default()), interval)
    }
}

#[async_trait::async_trait]
impl Querier for FakeNetwork {
    async fn query(&self, server: &str, _zone: &LowerName, rtype: Rtype) -> Result<Answer, Error> {
        let servers = self.servers.lock().unwrap();
        let records = servers
            .get(server)
            .ok_or_else(|| Error::Transport {
                server: server.to_string(),
                reason: "connection refused".to_string(),
            })?
            .iter()
            .filter(|rr| rr.data.rtype() == rtype)
            .cloned()
            .collect();
        Ok(Answer { records })
    }
}

#[async_trait::async_trait]
impl Updater for FakeNetwork {
    async fn update(
        &self,
        _zone: &LowerName,
        target: &UpdateTarget,
        changes: &ChangeSet,
        _out: &mut Transcript,
    ) -> Result<(), Error> {
        let mut servers = self.servers.lock().unwrap();
        let records = servers
            .get_mut(&target.address)
            .ok_or_else(|| Error::Transport {
                server: target.address.clone(),
                reason: "connection refused".to_string(),
            })?;
        records.retain(|rr| !changes.remove_rrsets.contains(&rr.data.rtype()));
        records.retain(|rr| !changes.removes.iter().any(|r| r.data == rr.data));
        for rr in &changes.inserts {
            if !records.iter().any(|r| r.data == rr.data) {
                records.push(rr.clone());
            }
        }
        self.updates
            .lock()
            .unwrap()
            .push((target.address.clone(), changes.clone()));
        Ok(())
    }
}

pub async fn run(controller: &Arc<Controller>, args: &[&str]) -> Result<Transcript, Error> {
    let args: Vec<String> = args.iter().map(ToString::to_string).collect();
    let mut out = Transcript::new();
    controller.execute(&args, &mut out).await?;
    Ok(out)
}

pub async fn conf(controller: &Arc<Controller>, key: &str) -> String {
    let out = run(controller, &["conf-get", key]).await.unwrap();
    out.lines()[0]
        .strip_prefix(&format!("{key}: "))
        .unwrap_or_default()
        .to_string()
}

/// A group with signers `a` and `b` (at `a:53` and `b:53`) sharing TSIG key `key.`, in stage
/// `ready`. Manual mode keeps adding `b` from starting the join.
pub async fn two_signers(controller: &Arc<Controller>) {
    run(controller, &["group-add", ZONE, "parent"]).await.unwrap();
    run(controller, &["conf-set", "tsigkey:key.", "c2VjcmV0"]).await.unwrap();
    for name in ["a", "b"] {
        if name == "b" {
            run(controller, &["automate-manual", ZONE]).await.unwrap();
        }
        let nameserver = format!("ns1.{name}.example.");
        run(controller, &["signer-add", ZONE, name, &nameserver, name])
            .await
            .unwrap();
        run(controller, &["signer-tsig", name, "key."]).await.unwrap();
    }
    run(controller, &["automate-resume", ZONE, "ready"]).await.unwrap();
}
