/* src/transport.rs */

use crate::error::Error;
use fancy_log::{LogLevel, log};
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// Largest message sent over plain UDP (RFC 1035 without EDNS).
pub const MAX_UDP_PAYLOAD: usize = 512;

const TC_FLAG: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Datagram, switching to TCP for oversized or truncated exchanges.
    #[default]
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("udp"),
            Protocol::Tcp => f.write_str("tcp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Protocol::Udp),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(Error::Configuration(format!("unknown protocol '{}'", other))),
        }
    }
}

/// One request/response exchange with a nameserver. Implementations make a
/// single attempt and never retry on their own.
pub trait Transport: Send + Sync {
    fn exchange(
        &self,
        request: &[u8],
        server: SocketAddr,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DnsTransport {
    protocol: Protocol,
}

impl DnsTransport {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    async fn round_trip(&self, request: &[u8], server: SocketAddr) -> io::Result<Vec<u8>> {
        if self.protocol == Protocol::Tcp || request.len() > MAX_UDP_PAYLOAD {
            return tcp_exchange(request, server).await;
        }

        let reply = udp_exchange(request, server).await?;
        if reply.get(2).is_some_and(|flags| flags & TC_FLAG != 0) {
            log(
                LogLevel::Debug,
                &format!("Truncated reply from {}, repeating over TCP", server),
            );
            return tcp_exchange(request, server).await;
        }
        Ok(reply)
    }
}

impl Transport for DnsTransport {
    async fn exchange(
        &self,
        request: &[u8],
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        match tokio::time::timeout(timeout, self.round_trip(request, server)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(source)) => Err(Error::Network { server, source }),
            Err(_) => Err(Error::Timeout { server, timeout }),
        }
    }
}

async fn udp_exchange(request: &[u8], server: SocketAddr) -> io::Result<Vec<u8>> {
    let bind_addr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(server).await?;
    socket.send(request).await?;

    let mut buf = [0u8; 4096];
    loop {
        let len = socket.recv(&mut buf).await?;
        // Stray datagrams with another id are not ours.
        if len >= 2 && request.get(..2) == Some(&buf[..2]) {
            return Ok(buf[..len].to_vec());
        }
        log(
            LogLevel::Debug,
            &format!("Ignoring unrelated datagram ({} bytes) from {}", len, server),
        );
    }
}

/// DNS over TCP messages are prefixed with a 2-byte length field.
async fn tcp_exchange(request: &[u8], server: SocketAddr) -> io::Result<Vec<u8>> {
    let len = u16::try_from(request.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "message exceeds 65535 bytes"))?;

    let mut stream = TcpStream::connect(server).await?;
    let mut framed = Vec::with_capacity(request.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(request);
    stream.write_all(&framed).await?;

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut res_buf = vec![0u8; len];
    stream.read_exact(&mut res_buf).await?;
    Ok(res_buf)
}
