mod common;

use common::{conf, ksk, ns, run, two_signers, zone, zsk, FakeNetwork, PARENT, ZONE};
use signercrab::error::Error;
use signercrab::records::{parse_fqdn, DigestType, RecordData, Rtype};
use signercrab::store::{Group, Signer, State};
use signercrab::{Mode, Transcript};

#[tokio::test]
async fn dnskey_sync_then_status() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(zsk(1))]);
    net.serve("b:53", vec![]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;

    let out = run(&controller, &["status", ZONE]).await.unwrap();
    assert!(out.contains("DNSKEYs synced: no"));

    let out = run(&controller, &["sync-dnskey", ZONE]).await.unwrap();
    assert!(out.contains("  Added DNSKEY to b"));
    assert_eq!(
        net.records("b:53", Rtype::Dnskey),
        vec![RecordData::Dnskey(zsk(1))]
    );

    let out = run(&controller, &["status", ZONE]).await.unwrap();
    assert!(out.contains("DNSKEYs synced: yes"));
    let key = format!("dnskey-origin:{}", zsk(1).fingerprint());
    assert_eq!(common::conf(&controller, &key).await, "a");
    assert_eq!(
        common::conf(&controller, "group-dnskeys-synced:example.com.").await,
        "yes"
    );

    // Already synced: nothing to send.
    let sent = net.updates().len();
    let out = run(&controller, &["sync-dnskey", ZONE]).await.unwrap();
    assert!(out.contains("  Key exist in b"));
    assert_eq!(net.updates().len(), sent);

    // A new key at b diverges the group until the next sync.
    net.add("b:53", signercrab::records::Rr::new(3600, RecordData::Dnskey(zsk(2))));
    let out = run(&controller, &["status", ZONE]).await.unwrap();
    assert!(out.contains("DNSKEYs synced: no"));
    run(&controller, &["sync-dnskey", ZONE]).await.unwrap();
    let out = run(&controller, &["status", ZONE]).await.unwrap();
    assert!(out.contains("DNSKEYs synced: yes"));
    assert!(net
        .records("a:53", Rtype::Dnskey)
        .contains(&RecordData::Dnskey(zsk(2))));
}

#[tokio::test]
async fn cds_published_for_every_ksk() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(ksk(7)), RecordData::Dnskey(zsk(1))]);
    net.serve("b:53", vec![RecordData::Dnskey(ksk(8))]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;

    let out = run(&controller, &["sync-cdscdnskeys", ZONE]).await.unwrap();
    assert!(out.contains("  Added CDS/CDNSKEYs to a"));
    assert!(out.contains("  Added CDS/CDNSKEYs to b"));

    for server in ["a:53", "b:53"] {
        let cds = net.records(server, Rtype::Cds);
        assert_eq!(cds.len(), 2, "{server}");
        assert!(cds.contains(&RecordData::Cds(
            ksk(7).to_ds(&zone(), DigestType::SHA256).unwrap()
        )));
        assert_eq!(net.records(server, Rtype::Cdnskey).len(), 2, "{server}");
    }

    let out = run(&controller, &["status", ZONE]).await.unwrap();
    assert!(out.contains("CDS/CDNSKEYs synced: yes"));
    assert!(out.contains("Parent DS synced: no"));

    // The RRsets are replaced on every sync, without looking at what is served.
    let sent = net.updates().len();
    let out = run(&controller, &["sync-cdscdnskeys", ZONE]).await.unwrap();
    assert!(out.contains("  Added CDS/CDNSKEYs to a"));
    assert_eq!(net.updates().len(), sent + 2);
    let (_, changes) = net.updates().pop().unwrap();
    assert_eq!(changes.remove_rrsets, vec![Rtype::Cds, Rtype::Cdnskey]);
    assert_eq!(net.records("a:53", Rtype::Cds).len(), 2);

    run(&controller, &["remove-cdscdnskeys", ZONE]).await.unwrap();
    assert!(net.records("a:53", Rtype::Cds).is_empty());
    assert!(net.records("b:53", Rtype::Cdnskey).is_empty());
}

#[tokio::test]
async fn leaving_signer_ns_removed() {
    let net = FakeNetwork::new();
    let both = vec![ns("ns1.a.example."), ns("ns1.b.example.")];
    net.serve("a:53", both.clone());
    net.serve("b:53", both);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;

    let out = run(&controller, &["signer-mark-leave", "b"]).await.unwrap();
    assert!(out.contains("example.com.: ready -> leave-sync-nses"));

    let out = run(&controller, &["sync-ns", ZONE]).await.unwrap();
    assert!(out.contains("removing ns1.b.example. from a, leaving signer"));
    assert_eq!(net.records("a:53", Rtype::Ns), vec![ns("ns1.a.example.")]);
    assert_eq!(net.records("b:53", Rtype::Ns), vec![ns("ns1.a.example.")]);
    for (_, changes) in net.updates() {
        assert!(changes.inserts.is_empty());
    }

    let out = run(&controller, &["status", ZONE]).await.unwrap();
    assert!(out.contains("NSes synced: yes"));
    assert!(out.contains("Parent NS synced: no"));
}

#[tokio::test]
async fn missing_secret_sends_nothing() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(zsk(1))]);
    net.serve("b:53", vec![]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;
    run(&controller, &["conf-remove", "tsigkey:key."]).await.unwrap();

    let mut out = Transcript::new();
    let err = controller
        .execute(&["sync-dnskey".to_string(), ZONE.to_string()], &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SignersMisconfigured(1)));
    assert!(out.contains("Skipping signer b: missing secret for credential key."));
    assert!(net.updates().is_empty());
    assert!(net.records("b:53", Rtype::Dnskey).is_empty());
}

#[tokio::test]
async fn tsig_key_needs_a_secret() {
    let net = FakeNetwork::new();
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;

    let err = run(&controller, &["signer-tsig", "b", "other."]).await.unwrap_err();
    assert!(matches!(err, Error::MissingSecret(ref key) if key == "other."));
    let out = run(&controller, &["signer-tsig", "b"]).await.unwrap();
    assert!(out.contains("Signer b uses TSIG key key."));

    let err = run(&controller, &["signer-tsig", "nobody", "key."]).await.unwrap_err();
    assert!(matches!(err, Error::NoSuchSigner(_)));
}

#[tokio::test]
async fn leaving_signer_dnskeys_removed() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(zsk(1))]);
    net.serve("b:53", vec![RecordData::Dnskey(zsk(2))]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;

    run(&controller, &["sync-dnskey", ZONE]).await.unwrap();
    let both = vec![RecordData::Dnskey(zsk(1)), RecordData::Dnskey(zsk(2))];
    assert_eq!(net.records("a:53", Rtype::Dnskey), both);
    let key = format!("dnskey-origin:{}", zsk(2).fingerprint());
    assert_eq!(conf(&controller, &key).await, "b");

    run(&controller, &["signer-mark-leave", "b"]).await.unwrap();
    let sent = net.updates().len();
    let out = run(&controller, &["sync-dnskey", ZONE]).await.unwrap();
    assert!(out.contains("Signer b is leaving, removing its DNSKEYs from others"));
    assert!(out.contains("  Removed DNSKEY from a"));

    assert_eq!(net.records("a:53", Rtype::Dnskey), vec![RecordData::Dnskey(zsk(1))]);
    let mut at_b = net.records("b:53", Rtype::Dnskey);
    at_b.sort_by_key(|data| data.to_string());
    let mut expected = vec![RecordData::Dnskey(zsk(2)), RecordData::Dnskey(zsk(1))];
    expected.sort_by_key(|data| data.to_string());
    assert_eq!(at_b, expected);
    let updates = net.updates();
    assert!(updates[sent..].iter().all(|(server, _)| server == "a:53"));
    assert_eq!(updates.len(), sent + 1);
}

#[tokio::test]
async fn unsupported_updater_sends_nothing() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(zsk(1))]);
    net.serve("b:53", vec![RecordData::Dnskey(zsk(2))]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;
    run(&controller, &["signer-type", "b", "desec"]).await.unwrap();

    let err = run(&controller, &["sync-dnskey", ZONE]).await.unwrap_err();
    assert!(matches!(err, Error::UpdaterUnsupported(_)));
    assert!(net.updates().is_empty());
    assert_eq!(net.records("a:53", Rtype::Dnskey), vec![RecordData::Dnskey(zsk(1))]);
}

fn group_without_address() -> State {
    let mut state = State::default();
    state.add_group(zone(), Group::new(PARENT)).unwrap();
    for (name, address) in [("a", "a:53"), ("b", "")] {
        let signer = Signer {
            group: zone(),
            address: address.to_string(),
            nameserver: parse_fqdn(&format!("ns1.{name}.example.")).unwrap(),
            kind: Default::default(),
            credential: Some("key.".to_string()),
            leaving: false,
            csk: false,
        };
        state.add_signer(name, signer).unwrap();
    }
    state
        .tsig_keys
        .insert("key.".to_string(), "c2VjcmV0".to_string());
    state
}

#[tokio::test]
async fn missing_address_sends_nothing() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(zsk(1))]);
    net.serve(PARENT, vec![]);
    let mut ctx = net.context(group_without_address());

    let mut out = Transcript::new();
    let err = signercrab::sync::sync_dnskey(&mut ctx, &zone(), &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingAddress(ref name) if name == "b"));

    let members = ctx.state().members(&zone()).unwrap();
    let err = ctx.resolve_targets(&members, &mut out).unwrap_err();
    assert!(matches!(err, Error::MissingAddress(ref name) if name == "b"));
    assert!(net.updates().is_empty());
}

#[tokio::test]
async fn failed_status_clears_flags() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Dnskey(zsk(1))]);
    net.serve("b:53", vec![]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;
    run(&controller, &["sync-dnskey", ZONE]).await.unwrap();
    run(&controller, &["status", ZONE]).await.unwrap();
    assert_eq!(conf(&controller, "group-dnskeys-synced:example.com.").await, "yes");

    net.unplug("b:53");
    let err = run(&controller, &["status", ZONE]).await.unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
    assert_eq!(conf(&controller, "group-dnskeys-synced:example.com.").await, "no");
}

#[tokio::test]
async fn csync_uses_signer_serial() {
    let net = FakeNetwork::new();
    net.serve("a:53", vec![RecordData::Soa { serial: 10 }]);
    net.serve("b:53", vec![RecordData::Soa { serial: 20 }]);
    net.serve(PARENT, vec![]);
    let controller = net.controller(Mode::Local);
    two_signers(&controller).await;

    let out = run(&controller, &["add-csync", ZONE]).await.unwrap();
    assert!(out.contains("  Added CSYNC to b"));
    match &net.records("b:53", Rtype::Csync)[..] {
        [RecordData::Csync(csync)] => assert_eq!(csync.serial, 20),
        other => panic!("unexpected CSYNC at b: {other:?}"),
    }

    run(&controller, &["remove-csync", ZONE]).await.unwrap();
    assert!(net.records("a:53", Rtype::Csync).is_empty());
}
