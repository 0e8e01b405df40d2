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

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetProbeConfig {
    /// Ordered STUN servers, tried in order until one answers.
    pub stun_servers: Vec<String>,
    /// Ordered HTTP "what's my IP" lookup endpoints.
    pub http_lookup_urls: Vec<String>,
    pub preferred_family: AddressFamily,
    /// Operator-configured fallback, used only if every probe fails.
    pub configured_external_address: Option<IpAddr>,
    #[serde(with = "duration_secs")]
    pub probe_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
}

impl Default for NetProbeConfig {
    fn default() -> Self {
        Self {
            stun_servers: Vec::new(),
            http_lookup_urls: Vec::new(),
            preferred_family: AddressFamily::Ipv4,
            configured_external_address: None,
            probe_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
