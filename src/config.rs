use crate::error::Error;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub type Shared = Arc<Config>;

/// Process configuration, loaded once at startup from a JSON file.
///
/// ```json
/// {
///   "state_path": "/var/lib/signercrab/state.json",
///   "rpc_bind_addr": "127.0.0.1:7353",
///   "automate_interval": 10
/// }
/// ```
#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Path of the persisted state document (groups, signers, credentials, stages).
    pub state_path: String,
    /// Address the daemon's RPC API listens on.
    #[serde(default = "default_rpc_bind_addr")]
    pub rpc_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout: Duration,
    /// When set, commands are forwarded to the daemon listening at this address instead of
    /// running locally.
    #[serde(default)]
    pub remote: Option<SocketAddr>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_automate_interval")]
    pub automate_interval: Duration,
    /// Upper bound for a single DNS query or update exchange.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_dns_timeout")]
    pub dns_timeout: Duration,
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

fn default_rpc_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7353))
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_automate_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_dns_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Config {
    /// Load the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the file can't be read, [`Error::InvalidJSON`] if it isn't a
    /// valid configuration document, and [`Error::InsecureRPCBind`] if the RPC API would be
    /// exposed on a public address.
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.bind_addr_is_secure()?;
        Ok(conf)
    }

    /// A configuration for the given state path with every other setting at its default.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<String>) -> Self {
        Config {
            state_path: state_path.into(),
            rpc_bind_addr: default_rpc_bind_addr(),
            rpc_timeout: default_rpc_timeout(),
            remote: None,
            automate_interval: default_automate_interval(),
            dns_timeout: default_dns_timeout(),
        }
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.rpc_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureRPCBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureRPCBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}
