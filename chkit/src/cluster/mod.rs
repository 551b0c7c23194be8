//! Cluster membership and failure recovery.
//!
//! - [`Topology`] describes the hosts and their priority tiers at startup
//! - [`HostManager`] picks the next host to try and tracks cooldowns
//! - [`BackoffPolicy`] decides how long a failing host stays out of rotation

pub mod backoff;
pub mod host_manager;
pub mod topology;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use backoff::{BackoffPolicy, ExponentialBackoff};
pub use host_manager::{HostManager, HostManagerBuilder};
pub use topology::{Tier, Topology};

/// One HTTP endpoint of the cluster, e.g. `http://ch-1:8123`.
///
/// Addresses without a scheme get `http://` prepended so that `ch-1:8123`
/// and `http://ch-1:8123` name the same host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Host(String);

impl Host {
    pub fn new(address: impl AsRef<str>) -> Self {
        let address = address.as_ref().trim();
        if address.starts_with("http://") || address.starts_with("https://") {
            Host(address.to_string())
        } else {
            Host(format!("http://{}", address))
        }
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Host {
    fn from(s: String) -> Self {
        Host::new(s)
    }
}

impl From<&str> for Host {
    fn from(s: &str) -> Self {
        Host::new(s)
    }
}

impl From<Host> for String {
    fn from(host: Host) -> Self {
        host.0
    }
}
