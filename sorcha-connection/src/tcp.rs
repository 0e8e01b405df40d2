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

//! The production `Transport` adapter the module docs of `transport.rs`
//! describe as living outside this crate's test surface: one `TcpStream`
//! per peer, length-prefixed (4-byte big-endian) canonical `rmp-serde`
//! framing (§6 "All fields length-prefixed, little-endian, binary
//! canonical encoding" — frame *length* is big-endian network order, the
//! `MessageEnvelope` payload within is the little-endian canonical
//! encoding the wire format names), and a one-frame `Hello` handshake
//! exchanging each side's `PeerId` before any application frame is
//! accepted.
//!
//! Unlike `fake::FakeTransport`, a real socket has no way to hand inbound
//! frames back to `ConnectionPool::dispatch_incoming` by itself — the
//! pool only calls out through `Transport`, never the reverse. Every
//! accepted or dialled session therefore hands its reader half's frames
//! to a shared `mpsc::Sender<(PeerId, MessageEnvelope)>` supplied at
//! construction; draining that channel into `dispatch_incoming` is the
//! caller's job (`sorcha-node`'s subsystem wiring).

use crate::envelope::MessageEnvelope;
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sorcha_primitives::{Peer, PeerId};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "tcp_transport";

/// Frames larger than this are refused rather than trusted blindly off
/// the wire — a defence against a length prefix corrupting the reader
/// into an unbounded allocation.
const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

#[derive(Serialize, Deserialize)]
struct HelloFrame {
    peer_id: String,
}

async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Returns `Ok(None)` on a clean peer-initiated close.
async fn read_frame<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame exceeds maximum size"));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// One logical session's writer-side handle: a channel the public
/// `send`/disconnect API feeds, drained by a dedicated task so a slow or
/// stalled socket write never blocks the caller.
struct Session {
    outbound: mpsc::UnboundedSender<MessageEnvelope>,
}

/// A `Transport` implementation over real TCP sockets. Construct one per
/// node process; `accept_loop` and `connect` both register sessions into
/// the same table, so an inbound connection from a peer this node is
/// also dialling converges on whichever handshake completes first.
pub struct TcpTransport {
    local_peer_id: PeerId,
    sessions: Mutex<HashMap<PeerId, Session>>,
    inbound: mpsc::Sender<(PeerId, MessageEnvelope)>,
}

impl TcpTransport {
    /// `inbound` is the channel every accepted or dialled session's
    /// reader task forwards decoded frames into; the caller drains it
    /// into `ConnectionPool::dispatch_incoming`.
    pub fn new(local_peer_id: PeerId, inbound: mpsc::Sender<(PeerId, MessageEnvelope)>) -> Self {
        Self {
            local_peer_id,
            sessions: Mutex::new(HashMap::new()),
            inbound,
        }
    }

    pub async fn listen(bind_addr: &str) -> io::Result<TcpListener> {
        TcpListener::bind(bind_addr).await
    }

    /// Accepts connections off `listener` until the socket errors or the
    /// process shuts it down; each accepted stream is handed to
    /// `adopt_incoming` as its own task. Intended to be spawned as a
    /// standalone subsystem task for the node's lifetime.
    pub async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.adopt_incoming(stream).await {
                            debug!(target: LOG_TARGET, %addr, error = %e, "inbound handshake failed");
                        }
                    });
                }
                Err(e) => {
                    warn!(target: LOG_TARGET, error = %e, "accept failed, transport no longer listening");
                    return;
                }
            }
        }
    }

    async fn adopt_incoming(&self, mut stream: TcpStream) -> io::Result<()> {
        let remote_peer_id = self.exchange_hello(&mut stream).await?;
        info!(target: LOG_TARGET, peer_id = %remote_peer_id, "inbound session established");
        self.spawn_session(remote_peer_id, stream);
        Ok(())
    }

    async fn exchange_hello(&self, stream: &mut TcpStream) -> io::Result<PeerId> {
        let local_hello = rmp_serde::to_vec(&HelloFrame {
            peer_id: self.local_peer_id.as_str().to_string(),
        })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_frame(stream, &local_hello).await?;

        let remote_bytes = read_frame(stream)
            .await?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed before sending Hello"))?;
        let remote_hello: HelloFrame =
            rmp_serde::from_slice(&remote_bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(PeerId::from(remote_hello.peer_id))
    }

    /// Splits `stream` into a writer task (drains `outbound`, one frame
    /// per `MessageEnvelope`) and a reader task (forwards decoded frames
    /// into `self.inbound`), and registers the writer half so `send`
    /// can reach this peer.
    fn spawn_session(&self, peer_id: PeerId, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.lock().insert(peer_id.clone(), Session { outbound: tx });

        tokio::spawn(writer_task(write_half, rx, peer_id.clone()));
        tokio::spawn(reader_task(read_half, peer_id, self.inbound.clone()));
    }
}

async fn writer_task(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<MessageEnvelope>,
    peer_id: PeerId,
) {
    while let Some(envelope) = rx.recv().await {
        let bytes = match rmp_serde::to_vec(&envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!(target: LOG_TARGET, %peer_id, error = %e, "failed to encode outbound envelope");
                continue;
            }
        };
        if let Err(e) = write_frame(&mut write_half, &bytes).await {
            warn!(target: LOG_TARGET, %peer_id, error = %e, "write failed, closing session");
            return;
        }
    }
    debug!(target: LOG_TARGET, %peer_id, "outbound channel closed, writer task exiting");
}

async fn reader_task(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    peer_id: PeerId,
    inbound: mpsc::Sender<(PeerId, MessageEnvelope)>,
) {
    loop {
        match read_frame(&mut read_half).await {
            Ok(Some(bytes)) => match rmp_serde::from_slice::<MessageEnvelope>(&bytes) {
                Ok(envelope) => {
                    if inbound.send((peer_id.clone(), envelope)).await.is_err() {
                        debug!(target: LOG_TARGET, %peer_id, "inbound dispatch channel closed, reader task exiting");
                        return;
                    }
                }
                Err(e) => warn!(target: LOG_TARGET, %peer_id, error = %e, "failed to decode inbound frame"),
            },
            Ok(None) => {
                debug!(target: LOG_TARGET, %peer_id, "peer closed connection");
                return;
            }
            Err(e) => {
                warn!(target: LOG_TARGET, %peer_id, error = %e, "read failed, closing session");
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, peer: &Peer) -> Result<(), TransportError> {
        if self.sessions.lock().contains_key(&peer.peer_id) {
            return Ok(());
        }
        let addr = format!("{}:{}", peer.address, peer.port);
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TransportError::ConnectFailed(peer.peer_id.clone(), e.to_string()))?;

        let remote_peer_id = self
            .exchange_hello(&mut stream)
            .await
            .map_err(|e| TransportError::ConnectFailed(peer.peer_id.clone(), e.to_string()))?;
        if remote_peer_id != peer.peer_id {
            return Err(TransportError::ConnectFailed(
                peer.peer_id.clone(),
                format!("handshake returned unexpected peer id {remote_peer_id}"),
            ));
        }

        self.spawn_session(peer.peer_id.clone(), stream);
        Ok(())
    }

    async fn send(&self, peer_id: &PeerId, envelope: MessageEnvelope) -> Result<(), TransportError> {
        let outbound = {
            let sessions = self.sessions.lock();
            sessions
                .get(peer_id)
                .map(|s| s.outbound.clone())
                .ok_or_else(|| TransportError::NotConnected(peer_id.clone()))?
        };
        outbound
            .send(envelope)
            .map_err(|_| TransportError::SendFailed(peer_id.clone(), "writer task no longer running".into()))
    }

    async fn disconnect(&self, peer_id: &PeerId) {
        self.sessions.lock().remove(peer_id);
    }
}
