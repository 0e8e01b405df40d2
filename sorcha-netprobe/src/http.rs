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

//! The HTTP-lookup half of the probe chain: plain "what is my IP" style
//! endpoints, queried in configured order.

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpProbeError {
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response body was not a parseable ip address")]
    Unparseable,
}

pub async fn query(url: &str, probe_timeout: Duration) -> Result<IpAddr, HttpProbeError> {
    let client = reqwest::Client::builder().timeout(probe_timeout).build()?;
    let body = client.get(url).send().await?.text().await?;
    body.trim().parse().map_err(|_| HttpProbeError::Unparseable)
}
