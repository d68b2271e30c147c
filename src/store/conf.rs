//! Flat `key -> value` view of the [`State`] document, used by the `conf-*` commands.
//!
//! Keys are a prefix naming the property and, for per-entity properties, the entity:
//! `parent:example.com.`, `signer-ns:signer1`, `tsigkey:key1.` and so on. Only credentials,
//! the group TTL and settings are writable here; everything else is managed by the command
//! that owns it.

use crate::error::Error;
use crate::records::parse_fqdn;
use crate::store::{State, SyncFlag, DEFAULT_GROUP_TTL};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use time::format_description::well_known::Rfc3339;

pub const DEBUG_UPDATER: &str = "debug-updater";

const TSIGKEY: &str = "tsigkey:";
const DESECTOKEN: &str = "desectoken:";
const GROUP_TTL: &str = "group-ttl:";
const DNSKEY_ORIGIN: &str = "dnskey-origin:";
const NS_ORIGIN: &str = "ns-origin:";

fn yes_no(b: bool) -> String {
    if b { "yes" } else { "no" }.to_string()
}

impl State {
    /// Every entry of the document, grouped by entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimestampFormat`] if a wait deadline can't be formatted.
    pub fn entries(&self) -> Result<Vec<(String, String)>, Error> {
        let mut out = Vec::new();
        let zones: Vec<String> = self.groups.keys().map(ToString::to_string).collect();
        out.push(("groups".to_string(), zones.join(" ")));

        for (zone, group) in &self.groups {
            out.push((format!("parent:{zone}"), group.parent.clone()));
            out.push((format!("signers:{zone}"), group.signers.join(" ")));
            out.push((format!("{GROUP_TTL}{zone}"), group.ttl.to_string()));
            out.push((format!("automate-stage:{zone}"), group.stage.to_string()));
            if let Some(err) = &group.error {
                out.push((format!("automate-error:{zone}"), err.clone()));
            }
            if let Some(until) = group.wait_ds {
                out.push((format!("group-wait-ds:{zone}"), until.format(&Rfc3339)?));
            }
            if let Some(until) = group.wait_ns {
                out.push((format!("group-wait-ns:{zone}"), until.format(&Rfc3339)?));
            }
            for flag in SyncFlag::ALL {
                out.push((
                    format!("group-{flag}-synced:{zone}"),
                    yes_no(group.synced.get(flag)),
                ));
            }
        }

        for (name, signer) in &self.signers {
            out.push((format!("signer:{name}"), signer.address.clone()));
            out.push((format!("signer-type:{name}"), signer.kind.to_string()));
            if let Some(cred) = &signer.credential {
                out.push((format!("signer-tsigkey:{name}"), cred.clone()));
            }
            out.push((format!("signer-ns:{name}"), signer.nameserver.to_string()));
            out.push((format!("signer-leaving:{name}"), yes_no(signer.leaving)));
            out.push((format!("signer-csk:{name}"), yes_no(signer.csk)));
        }

        // Secrets are listed by name only.
        for name in self.tsig_keys.keys() {
            out.push((format!("{TSIGKEY}{name}"), "<secret>".to_string()));
        }
        for name in self.desec_tokens.keys() {
            out.push((format!("{DESECTOKEN}{name}"), "<secret>".to_string()));
        }
        for (fp, origin) in &self.dnskey_origin {
            out.push((format!("{DNSKEY_ORIGIN}{fp}"), origin.clone()));
        }
        for (ns, origin) in &self.ns_origin {
            out.push((format!("{NS_ORIGIN}{ns}"), origin.clone()));
        }
        let autostart: Vec<String> = self.autostart.iter().map(ToString::to_string).collect();
        out.push(("automate-autostart".to_string(), autostart.join(" ")));
        for (key, value) in &self.settings {
            out.push((key.clone(), value.clone()));
        }
        Ok(out)
    }

    /// The value of a single entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimestampFormat`] if a wait deadline can't be formatted.
    pub fn entry(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self
            .entries()?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v))
    }

    /// Set a writable entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnlyKey`] for keys that can't be set here,
    /// [`Error::InvalidArgument`] for malformed values, and [`Error::NoSuchGroup`] when setting
    /// the TTL of a group that doesn't exist.
    pub fn set_entry(&mut self, key: &str, value: &str) -> Result<(), Error> {
        if let Some(name) = key.strip_prefix(TSIGKEY).filter(|n| !n.is_empty()) {
            if BASE64.decode(value).is_err() {
                return Err(Error::InvalidArgument {
                    what: "TSIG secret",
                    value: "<secret>".to_string(),
                });
            }
            self.tsig_keys.insert(name.to_string(), value.to_string());
        } else if let Some(name) = key.strip_prefix(DESECTOKEN).filter(|n| !n.is_empty()) {
            if value.is_empty() {
                return Err(Error::InvalidArgument {
                    what: "deSEC token",
                    value: String::new(),
                });
            }
            self.desec_tokens.insert(name.to_string(), value.to_string());
        } else if let Some(zone) = key.strip_prefix(GROUP_TTL) {
            let zone = parse_fqdn(zone)?;
            let ttl = value
                .parse::<u32>()
                .ok()
                .filter(|ttl| *ttl > 0)
                .ok_or_else(|| Error::InvalidArgument {
                    what: "TTL",
                    value: value.to_string(),
                })?;
            self.group_mut(&zone)?.ttl = ttl;
        } else if key == DEBUG_UPDATER {
            if value != "yes" && value != "no" {
                return Err(Error::InvalidArgument {
                    what: DEBUG_UPDATER,
                    value: value.to_string(),
                });
            }
            self.settings.insert(key.to_string(), value.to_string());
        } else {
            return Err(Error::ReadOnlyKey(key.to_string()));
        }
        Ok(())
    }

    /// Remove a writable entry, or a provenance record. A removed group TTL reverts to the
    /// default. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnlyKey`] for keys that can't be removed here.
    pub fn remove_entry(&mut self, key: &str) -> Result<bool, Error> {
        let removed = if let Some(name) = key.strip_prefix(TSIGKEY) {
            self.tsig_keys.remove(name).is_some()
        } else if let Some(name) = key.strip_prefix(DESECTOKEN) {
            self.desec_tokens.remove(name).is_some()
        } else if let Some(zone) = key.strip_prefix(GROUP_TTL) {
            let group = self.group_mut(&parse_fqdn(zone)?)?;
            let changed = group.ttl != DEFAULT_GROUP_TTL;
            group.ttl = DEFAULT_GROUP_TTL;
            changed
        } else if let Some(fp) = key.strip_prefix(DNSKEY_ORIGIN) {
            self.dnskey_origin.remove(fp).is_some()
        } else if let Some(ns) = key.strip_prefix(NS_ORIGIN) {
            self.ns_origin.remove(&parse_fqdn(ns)?).is_some()
        } else if key == DEBUG_UPDATER {
            self.settings.remove(key).is_some()
        } else {
            return Err(Error::ReadOnlyKey(key.to_string()));
        };
        Ok(removed)
    }
}
