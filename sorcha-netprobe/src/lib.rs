// This file is part of Sorcha.
//
// Sorcha is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Sorcha is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Sorcha.  If not, see <http://www.gnu.org/licenses/>.

//! The Network Probe (§4.2): discovers the node's externally reachable
//! address via STUN, falling back to HTTP lookup endpoints, falling back
//! to an operator-configured address, falling back to the primary
//! non-loopback local interface. Results are cached for a short TTL so a
//! busy discovery/heartbeat loop doesn't re-probe on every call.

pub mod config;
pub mod http;
pub mod stun;

pub use config::{AddressFamily, NetProbeConfig};

use parking_lot::Mutex;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "netprobe";

struct CachedResult {
    address: IpAddr,
    at: Instant,
}

pub struct NetworkProbe {
    config: NetProbeConfig,
    cache: Mutex<Option<CachedResult>>,
}

impl NetworkProbe {
    pub fn new(config: NetProbeConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(None),
        }
    }

    /// Returns the node's externally reachable address, using the cache
    /// when still fresh.
    pub async fn discover(&self) -> IpAddr {
        if let Some(cached) = self.cache.lock().as_ref() {
            if cached.at.elapsed() < self.config.cache_ttl {
                return cached.address;
            }
        }
        let address = self.probe().await;
        *self.cache.lock() = Some(CachedResult {
            address,
            at: Instant::now(),
        });
        address
    }

    async fn probe(&self) -> IpAddr {
        for server in &self.config.stun_servers {
            let Ok(addr) = server.parse() else {
                warn!(target: LOG_TARGET, server, "skipping malformed stun server address");
                continue;
            };
            match stun::query(addr, self.config.probe_timeout).await {
                Ok(reflexive) => {
                    info!(target: LOG_TARGET, server, address = %reflexive.ip(), "stun probe succeeded");
                    return reflexive.ip();
                }
                Err(e) => debug!(target: LOG_TARGET, server, error = %e, "stun probe failed"),
            }
        }

        for url in &self.config.http_lookup_urls {
            match http::query(url, self.config.probe_timeout).await {
                Ok(address) => {
                    info!(target: LOG_TARGET, url, %address, "http lookup probe succeeded");
                    return address;
                }
                Err(e) => debug!(target: LOG_TARGET, url, error = %e, "http lookup probe failed"),
            }
        }

        if let Some(configured) = self.config.configured_external_address {
            warn!(target: LOG_TARGET, address = %configured, "all probes failed, falling back to configured external address");
            return configured;
        }

        let fallback = primary_local_address(self.config.preferred_family);
        warn!(target: LOG_TARGET, address = %fallback, "all probes failed, falling back to primary local interface");
        fallback
    }
}

fn primary_local_address(preferred: AddressFamily) -> IpAddr {
    let interfaces = if_addrs::get_if_addrs().unwrap_or_default();
    let wants_v4 = matches!(preferred, AddressFamily::Ipv4);
    interfaces
        .iter()
        .filter(|i| !i.is_loopback())
        .find(|i| i.ip().is_ipv4() == wants_v4)
        .or_else(|| interfaces.iter().find(|i| !i.is_loopback()))
        .map(|i| i.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn falls_back_to_configured_address_when_all_probes_fail() {
        let config = NetProbeConfig {
            stun_servers: vec!["127.0.0.1:1".to_string()],
            http_lookup_urls: vec!["http://127.0.0.1:1/".to_string()],
            configured_external_address: Some("198.51.100.7".parse().unwrap()),
            probe_timeout: StdDuration::from_millis(50),
            ..Default::default()
        };
        let probe = NetworkProbe::new(config);
        let addr = probe.discover().await;
        assert_eq!(addr, "198.51.100.7".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn caches_result_within_ttl() {
        let config = NetProbeConfig {
            configured_external_address: Some("203.0.113.9".parse().unwrap()),
            cache_ttl: StdDuration::from_secs(60),
            probe_timeout: StdDuration::from_millis(20),
            ..Default::default()
        };
        let probe = NetworkProbe::new(config);
        let first = probe.discover().await;
        let second = probe.discover().await;
        assert_eq!(first, second);
    }
}
