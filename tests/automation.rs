mod common;

use common::{conf, ksk, run, two_signers, zone, zsk, FakeNetwork, PARENT, ZONE};
use signercrab::automate::{step, Stage};
use signercrab::error::Error;
use signercrab::notify::Event;
use signercrab::records::{parse_fqdn, DigestType, RecordData, Rr, Rtype};
use signercrab::store::{Group, Signer, State};
use signercrab::wait::{self, Direction};
use signercrab::{Mode, Transcript};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn state(stage: Stage) -> State {
    let mut state = State::default();
    let mut group = Group::new(PARENT);
    group.stage = stage;
    state.add_group(zone(), group).unwrap();
    for name in ["a", "b"] {
        state
            .add_signer(
                name,
                Signer {
                    group: zone(),
                    address: format!("{name}:53"),
                    nameserver: parse_fqdn(&format!("ns1.{name}.example.")).unwrap(),
                    kind: Default::default(),
                    credential: Some("key.".to_string()),
                    leaving: false,
                    csk: false,
                },
            )
            .unwrap();
    }
    state
        .tsig_keys
        .insert("key.".to_string(), "c2VjcmV0".to_string());
    state
}

fn ttl_network() -> std::sync::Arc<FakeNetwork> {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![]);
    net.serve("b:53", vec![]);
    net.serve(PARENT, vec![]);
    net.add("a:53", Rr::new(300, RecordData::Dnskey(zsk(1))));
    net.add("b:53", Rr::new(120, RecordData::Dnskey(zsk(1))));
    net
}

#[tokio::test]
async fn wait_deadline_is_stable_until_cleared() {
    let net = ttl_network();
    let mut ctx = net.context(state(Stage::Ready));
    let zone = zone();

    let mut out = Transcript::new();
    let before = OffsetDateTime::now_utc();
    let first = wait::wait(&mut ctx, &zone, Direction::Ds, &mut out).await.unwrap();
    assert!(out.contains("Largest TTL 300"));
    let lead = first - before;
    assert!(lead >= time::Duration::seconds(599) && lead <= time::Duration::seconds(601));

    let mut out = Transcript::new();
    let second = wait::wait(&mut ctx, &zone, Direction::Ds, &mut out).await.unwrap();
    assert_eq!(first, second);
    assert!(!out.lines().iter().any(|l| l.starts_with("Largest TTL")));

    net.add("a:53", Rr::new(900, RecordData::Dnskey(zsk(2))));
    wait::clear(&mut ctx, &zone, Direction::Ds).unwrap();
    let mut out = Transcript::new();
    let third = wait::wait(&mut ctx, &zone, Direction::Ds, &mut out).await.unwrap();
    assert!(out.contains("Largest TTL 900"));
    assert!(third > second);
}

#[tokio::test]
async fn wait_stage_holds_until_deadline() {
    let net = ttl_network();
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;
    run(&controller, &["automate-manual", ZONE]).await.unwrap();
    run(&controller, &["automate-resume", ZONE, "join-wait-ds"]).await.unwrap();

    let out = run(&controller, &["automate-step", ZONE]).await.unwrap();
    assert!(out.contains("Largest TTL 300"));
    assert!(out.lines().iter().any(|l| l.starts_with("Wait until ")));
    assert_eq!(conf(&controller, "automate-stage:example.com.").await, "join-wait-ds");

    let deadline = conf(&controller, "group-wait-ds:example.com.").await;
    let deadline = OffsetDateTime::parse(&deadline, &Rfc3339).unwrap();
    let lead = deadline - OffsetDateTime::now_utc();
    assert!(lead > time::Duration::seconds(590));

    run(&controller, &["automate-step", ZONE]).await.unwrap();
    assert_eq!(conf(&controller, "automate-stage:example.com.").await, "join-wait-ds");
}

#[tokio::test]
async fn expired_wait_advances() {
    let net = ttl_network();
    let mut state = state(Stage::JoinWaitDs);
    state.group_mut(&zone()).unwrap().wait_ds =
        Some(OffsetDateTime::now_utc() - time::Duration::seconds(1));
    let mut ctx = net.context(state);

    let mut out = Transcript::new();
    let next = step(&mut ctx, &zone(), &mut out).await.unwrap();
    assert_eq!(next, Stage::JoinSyncNses);
    let group = ctx.state().group(&zone()).unwrap();
    assert_eq!(group.stage, Stage::JoinSyncNses);
    assert!(group.wait_ds.is_none());
    assert!(out.contains("example.com.: join-wait-ds -> join-sync-nses"));
}

#[tokio::test]
async fn join_walks_to_parent_ds() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(ksk(9)), RecordData::Dnskey(zsk(1))]);
    net.serve("b:53", vec![RecordData::Dnskey(zsk(2))]);
    net.serve(PARENT, vec![]);
    let mut ctx = net.context(state(Stage::JOIN));
    let zone = zone();

    let mut stages = Vec::new();
    for _ in 0..5 {
        let mut out = Transcript::new();
        stages.push(step(&mut ctx, &zone, &mut out).await.unwrap());
    }
    assert_eq!(
        stages,
        vec![
            Stage::JoinDnskeysSynced,
            Stage::JoinSyncCdscdnskeys,
            Stage::JoinCdscdnskeysSynced,
            Stage::JoinParentDsSynced,
            Stage::JoinParentDsSynced,
        ]
    );

    // The parent operator picks up the CDS.
    let ds = ksk(9).to_ds(&zone, DigestType::SHA256).unwrap();
    net.serve(PARENT, vec![RecordData::Ds(ds)]);
    let mut out = Transcript::new();
    assert_eq!(
        step(&mut ctx, &zone, &mut out).await.unwrap(),
        Stage::JoinRemoveCdscdnskeys
    );
    let mut out = Transcript::new();
    assert_eq!(step(&mut ctx, &zone, &mut out).await.unwrap(), Stage::JoinWaitDs);
    assert!(net.records("a:53", Rtype::Cds).is_empty());
    assert!(net.records("b:53", Rtype::Cdnskey).is_empty());
}

#[tokio::test]
async fn failed_step_moves_to_error() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(zsk(1))]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;
    run(&controller, &["automate-manual", ZONE]).await.unwrap();
    run(&controller, &["automate-resume", ZONE, "join-sync-dnskeys"]).await.unwrap();

    let err = run(&controller, &["automate-step", ZONE]).await.unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
    assert_eq!(conf(&controller, "automate-stage:example.com.").await, "error");

    let out = run(&controller, &["automate-error", ZONE]).await.unwrap();
    assert!(out.contains("example.com.: DNS exchange with b:53 failed: connection refused"));
    let out = run(&controller, &["automate-step", ZONE]).await.unwrap();
    assert!(out.contains("Error exist"));

    let err = run(&controller, &["automate-clear-error", ZONE, "retry-please"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStage(_)));
    let err = run(&controller, &["automate-clear-error", ZONE, "manual"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStage(_)));
    assert_eq!(conf(&controller, "automate-stage:example.com.").await, "error");

    run(&controller, &["automate-clear-error", ZONE, "join-sync-dnskeys"])
        .await
        .unwrap();
    assert_eq!(
        conf(&controller, "automate-stage:example.com.").await,
        "join-sync-dnskeys"
    );

    let out = run(&controller, &["automate-clear-error", ZONE, "ready"])
        .await
        .unwrap();
    assert!(out.contains("No automation error"));
    assert_eq!(
        conf(&controller, "automate-stage:example.com.").await,
        "join-sync-dnskeys"
    );
}

#[tokio::test]
async fn manual_step_stays_manual() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(zsk(1))]);
    net.serve("b:53", vec![]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;
    run(&controller, &["automate-manual", ZONE]).await.unwrap();

    let out = run(&controller, &["automate-step", ZONE, "join-sync-dnskeys"])
        .await
        .unwrap();
    assert!(out.contains("example.com.: join-sync-dnskeys -> join-dnskeys-synced (manual, not moved)"));
    assert_eq!(conf(&controller, "automate-stage:example.com.").await, "manual");
    assert_eq!(net.records("b:53", Rtype::Dnskey), vec![RecordData::Dnskey(zsk(1))]);

    // Membership changes don't start anything in manual mode.
    run(&controller, &["signer-mark-leave", "b"]).await.unwrap();
    assert_eq!(conf(&controller, "automate-stage:example.com.").await, "manual");
}

#[tokio::test]
async fn signer_removal_requires_leave_and_ready() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![]);
    net.serve("b:53", vec![RecordData::Dnskey(zsk(3))]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;
    run(&controller, &["sync-dnskey", ZONE]).await.unwrap();
    let key = format!("dnskey-origin:{}", zsk(3).fingerprint());
    assert_eq!(conf(&controller, &key).await, "b");

    let err = run(&controller, &["signer-remove", "b"]).await.unwrap_err();
    assert!(matches!(err, Error::SignerNotLeaving(_)));

    run(&controller, &["automate-manual", ZONE]).await.unwrap();
    run(&controller, &["signer-mark-leave", "b"]).await.unwrap();
    let err = run(&controller, &["signer-remove", "b"]).await.unwrap_err();
    assert!(matches!(err, Error::WrongStage(_, Stage::Manual, _)));

    run(&controller, &["automate-resume", ZONE, "ready"]).await.unwrap();
    let (_, mut events) = controller.subscribe().await;
    let out = run(&controller, &["signer-remove", "b"]).await.unwrap();
    assert!(out.contains("Signer b removed from example.com."));
    assert_eq!(conf(&controller, &key).await, "");
    assert_eq!(
        events.try_recv().unwrap(),
        Event::Left {
            fqdn: ZONE.to_string(),
            left: "b".to_string()
        }
    );
    let out = run(&controller, &["signer-list", ZONE]).await.unwrap();
    assert_eq!(out.lines().len(), 1);
}

#[tokio::test]
async fn automation_runs_in_daemon_only() {
    let net = FakeNetwork::new();
    let local = net.controller(Mode::Local);
    two_signers(&local).await;
    let err = run(&local, &["automate-start", ZONE]).await.unwrap_err();
    assert!(matches!(err, Error::DaemonOnly(_)));

    let net = FakeNetwork::new();
    let controller = net.controller(Mode::Daemon);
    two_signers(&controller).await;
    let (current, mut events) = controller.subscribe().await;
    assert_eq!(current.len(), 1);

    run(&controller, &["automate-start", ZONE]).await.unwrap();
    assert!(controller.scheduler().is_running(&zone()).await);
    let err = run(&controller, &["automate-start", ZONE]).await.unwrap_err();
    assert!(matches!(err, Error::AutomationRunning(_)));
    let err = run(&controller, &["group-remove", ZONE]).await.unwrap_err();
    assert!(matches!(err, Error::AutomationRunning(_)));

    let logged = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(Event::Log { log }) = events.recv().await {
                if log == "example.com.: Nothing to do" {
                    break;
                }
            }
        }
    })
    .await;
    assert!(logged.is_ok());

    run(&controller, &["automate-stop", ZONE]).await.unwrap();
    let err = run(&controller, &["automate-stop", ZONE]).await.unwrap_err();
    assert!(matches!(err, Error::AutomationNotRunning(_)));
    controller.shutdown().await.unwrap();
}

#[tokio::test]
async fn first_step_waits_one_interval() {
    let net = FakeNetwork::new();
    let controller = net.controller_every(Mode::Daemon, Duration::from_secs(3600));
    two_signers(&controller).await;
    let (_, mut events) = controller.subscribe().await;

    run(&controller, &["automate-start", ZONE]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    while let Ok(event) = events.try_recv() {
        assert_ne!(
            event,
            Event::Log {
                log: "example.com.: Nothing to do".to_string()
            }
        );
    }

    run(&controller, &["automate-stop", ZONE]).await.unwrap();
    controller.shutdown().await.unwrap();
}
