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

//! A minimal RFC 5389 STUN client: just enough to send a Binding Request
//! and parse an `XOR-MAPPED-ADDRESS` out of the response. The wire format
//! here is as small and self-contained as the peer protocol's own
//! length-prefixed framing (§4.3), so it is hand-parsed rather than
//! pulled in as a dependency.

use rand::RngCore;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const BINDING_REQUEST: u16 = 0x0001;
const BINDING_SUCCESS_RESPONSE: u16 = 0x0101;
const MAGIC_COOKIE: u32 = 0x2112A442;
const XOR_MAPPED_ADDRESS: u16 = 0x0020;

#[derive(Debug, Error)]
pub enum StunError {
    #[error("stun io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stun request timed out")]
    Timeout,
    #[error("malformed stun response")]
    Malformed,
    #[error("response carried no XOR-MAPPED-ADDRESS attribute")]
    NoMappedAddress,
}

fn build_binding_request(transaction_id: &[u8; 12]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&BINDING_REQUEST.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes()); // message length, no attributes
    buf.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
    buf.extend_from_slice(transaction_id);
    buf
}

fn parse_binding_response(buf: &[u8], transaction_id: &[u8; 12]) -> Result<SocketAddr, StunError> {
    if buf.len() < 20 {
        return Err(StunError::Malformed);
    }
    let msg_type = u16::from_be_bytes([buf[0], buf[1]]);
    let msg_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if msg_type != BINDING_SUCCESS_RESPONSE || cookie != MAGIC_COOKIE {
        return Err(StunError::Malformed);
    }
    if &buf[8..20] != transaction_id {
        return Err(StunError::Malformed);
    }
    let attrs_end = (20 + msg_len).min(buf.len());
    let mut pos = 20;
    while pos + 4 <= attrs_end {
        let attr_type = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
        let attr_len = u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]) as usize;
        let value_start = pos + 4;
        let value_end = value_start + attr_len;
        if value_end > buf.len() {
            break;
        }
        if attr_type == XOR_MAPPED_ADDRESS {
            return parse_xor_mapped_address(&buf[value_start..value_end], transaction_id);
        }
        // Attributes are padded to a 4-byte boundary.
        pos = value_start + attr_len.div_ceil(4) * 4;
    }
    Err(StunError::NoMappedAddress)
}

fn parse_xor_mapped_address(value: &[u8], transaction_id: &[u8; 12]) -> Result<SocketAddr, StunError> {
    if value.len() < 4 {
        return Err(StunError::Malformed);
    }
    let family = value[1];
    let xport = u16::from_be_bytes([value[2], value[3]]);
    let port = xport ^ ((MAGIC_COOKIE >> 16) as u16);
    match family {
        0x01 => {
            if value.len() < 8 {
                return Err(StunError::Malformed);
            }
            let xaddr = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
            let addr = xaddr ^ MAGIC_COOKIE;
            Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(addr)), port))
        }
        0x02 => {
            if value.len() < 20 {
                return Err(StunError::Malformed);
            }
            let mut key = [0u8; 16];
            key[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
            key[4..16].copy_from_slice(transaction_id);
            let mut octets = [0u8; 16];
            for i in 0..16 {
                octets[i] = value[4 + i] ^ key[i];
            }
            Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => Err(StunError::Malformed),
    }
}

/// Sends a single Binding Request to `server` and returns the reflexive
/// address it reports, or an error if the server doesn't answer within
/// `probe_timeout`.
pub async fn query(server: SocketAddr, probe_timeout: Duration) -> Result<SocketAddr, StunError> {
    let bind_addr: SocketAddr = if server.is_ipv4() {
        "0.0.0.0:0".parse().unwrap()
    } else {
        "[::]:0".parse().unwrap()
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(server).await?;

    let mut transaction_id = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut transaction_id);
    let request = build_binding_request(&transaction_id);

    socket.send(&request).await?;
    let mut buf = [0u8; 512];
    let n = timeout(probe_timeout, socket.recv(&mut buf))
        .await
        .map_err(|_| StunError::Timeout)??;

    parse_binding_response(&buf[..n], &transaction_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_ipv4_xor_mapped_address() {
        let transaction_id = [7u8; 12];
        let reported: SocketAddr = "203.0.113.4:54321".parse().unwrap();

        let xaddr = match reported.ip() {
            IpAddr::V4(v4) => u32::from(v4) ^ MAGIC_COOKIE,
            _ => unreachable!(),
        };
        let xport = reported.port() ^ ((MAGIC_COOKIE >> 16) as u16);

        let mut response = Vec::new();
        response.extend_from_slice(&BINDING_SUCCESS_RESPONSE.to_be_bytes());
        response.extend_from_slice(&12u16.to_be_bytes());
        response.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        response.extend_from_slice(&transaction_id);
        response.extend_from_slice(&XOR_MAPPED_ADDRESS.to_be_bytes());
        response.extend_from_slice(&8u16.to_be_bytes());
        response.extend_from_slice(&[0x00, 0x01]);
        response.extend_from_slice(&xport.to_be_bytes());
        response.extend_from_slice(&xaddr.to_be_bytes());

        let parsed = parse_binding_response(&response, &transaction_id).unwrap();
        assert_eq!(parsed, reported);
    }

    #[test]
    fn rejects_response_with_mismatched_transaction_id() {
        let response = build_binding_request(&[1u8; 12]);
        let err = parse_binding_response(&response, &[2u8; 12]).unwrap_err();
        assert!(matches!(err, StunError::Malformed));
    }
}
