//! Concrete `Transport`/`Channel` (SPEC_FULL §6) over plain TCP with
//! length-prefixed CBOR framing, grounded in the teacher's
//! `ochra-transport::cbor` encode/decode idiom (wire encoding itself is a
//! Non-goal of the core — §1 — but a runnable node needs to pick one).

use std::net::SocketAddr;

use async_trait::async_trait;
use dht_core::collab::{Channel, Transport};
use dht_core::message::WireMessage;
use dht_core::{DhtError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const MAX_FRAME_LEN: u32 = 1 << 20;

pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, addr: SocketAddr) -> Result<Box<dyn Channel>> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| DhtError::Transport(e.to_string()))?;
        Ok(Box::new(TcpChannel { stream: Some(stream) }))
    }
}

pub struct TcpChannel {
    stream: Option<TcpStream>,
}

#[async_trait]
impl Channel for TcpChannel {
    async fn send(&mut self, msg: WireMessage) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| DhtError::Transport("channel aborted".into()))?;
        let mut buf = Vec::new();
        ciborium::into_writer(&msg, &mut buf).map_err(|e| DhtError::Transport(e.to_string()))?;
        if buf.len() as u32 > MAX_FRAME_LEN {
            return Err(DhtError::Transport("frame too large".into()));
        }
        stream
            .write_all(&(buf.len() as u32).to_be_bytes())
            .await
            .map_err(|e| DhtError::Transport(e.to_string()))?;
        stream
            .write_all(&buf)
            .await
            .map_err(|e| DhtError::Transport(e.to_string()))
    }

    fn abort(&mut self) {
        // Dropping the TcpStream closes the underlying fd abruptly (no
        // graceful shutdown handshake), matching §4.5's "abort, not
        // graceful close".
        self.stream = None;
    }
}

/// Read one length-prefixed CBOR frame from an accepted inbound stream.
pub async fn read_message(stream: &mut TcpStream) -> Result<WireMessage> {
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| DhtError::Transport(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(DhtError::Transport("frame too large".into()));
    }
    let mut body = vec![0u8; len as usize];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| DhtError::Transport(e.to_string()))?;
    ciborium::from_reader(&body[..]).map_err(|e| DhtError::Transport(e.to_string()))
}
