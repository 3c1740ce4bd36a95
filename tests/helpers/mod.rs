#![allow(dead_code)]

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use simple_nsupdate::tsig::TsigStatus;
use simple_nsupdate::{Error, Transport, TsigAlgorithm, TsigKey, ZoneContext};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

pub const ZONE: &str = "my-zone.example.com";
pub const KEY_NAME: &str = "update-key";
pub const SECRET: &str = "c2VjcmV0LXNoYXJlZC1ieS1jbGllbnQtYW5kLXNlcnZlcg==";

pub fn key() -> TsigKey {
    TsigKey::new(KEY_NAME, SECRET, TsigAlgorithm::HmacSha512).unwrap()
}

pub fn context_for(server: SocketAddr) -> ZoneContext {
    ZoneContext::new(ZONE, server, 600, key()).unwrap()
}

pub fn context() -> ZoneContext {
    context_for("127.0.0.1:53".parse().unwrap())
}

fn now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

/// An authoritative server for one zone, kept in memory, speaking RFC 2136 and TSIG.
pub struct InMemoryZone {
    key: TsigKey,
    origin: Name,
    rrsets: Mutex<HashMap<(Name, RecordType), Vec<Record>>>,
    calls: AtomicUsize,
    /// Answer NXRRSET when a delete finds nothing, as some servers do.
    strict_delete: bool,
}

impl InMemoryZone {
    pub fn new() -> Self {
        Self::with_key(key())
    }

    pub fn with_key(key: TsigKey) -> Self {
        let mut origin = Name::from_ascii(ZONE).unwrap();
        origin.set_fqdn(true);
        Self {
            key,
            origin,
            rrsets: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            strict_delete: false,
        }
    }

    pub fn strict_delete(mut self) -> Self {
        self.strict_delete = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn handle(&self, request: &[u8]) -> Vec<u8> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let checked = match self.key.verify(request, None, now()) {
            Ok(c) => c,
            Err(_) => return refused(request),
        };
        let TsigStatus::Verified { mac: request_mac } = checked.status else {
            return refused(request);
        };
        let query = checked.message;

        let mut reply = Message::new();
        reply
            .set_id(query.id())
            .set_message_type(MessageType::Response)
            .set_op_code(query.op_code())
            .set_authoritative(true);
        for q in query.queries() {
            reply.add_query(q.clone());
        }

        let rcode = match query.op_code() {
            OpCode::Update => self.apply(&query),
            _ => self.answer(&query, &mut reply),
        };
        reply.set_response_code(rcode);
        self.key
            .sign_at(&reply, Some(&request_mac), now())
            .unwrap()
            .wire()
            .to_vec()
    }

    fn answer(&self, query: &Message, reply: &mut Message) -> ResponseCode {
        let q = &query.queries()[0];
        let rrsets = self.rrsets.lock().unwrap();
        let name = q.name().to_lowercase();
        if !rrsets.keys().any(|(n, _)| *n == name) {
            return ResponseCode::NXDomain;
        }
        if let Some(records) = rrsets.get(&(name, q.query_type())) {
            for record in records {
                reply.add_answer(record.clone());
            }
        }
        ResponseCode::NoError
    }

    fn apply(&self, update: &Message) -> ResponseCode {
        if update.queries()[0].name().to_lowercase() != self.origin {
            return ResponseCode::NotZone;
        }
        let mut rrsets = self.rrsets.lock().unwrap();

        for prereq in update.answers() {
            let key = (prereq.name().to_lowercase(), prereq.record_type());
            let existing = rrsets.get(&key);
            match prereq.dns_class() {
                DNSClass::NONE => {
                    if existing.is_some_and(|rrs| !rrs.is_empty()) {
                        return ResponseCode::YXRRSet;
                    }
                }
                _ => {
                    let found = existing
                        .is_some_and(|rrs| rrs.iter().any(|rr| rr.data() == prereq.data()));
                    if !found {
                        return ResponseCode::NXRRSet;
                    }
                }
            }
        }

        for change in update.name_servers() {
            let key = (change.name().to_lowercase(), change.record_type());
            match change.dns_class() {
                DNSClass::NONE => {
                    let rrs = rrsets.entry(key.clone()).or_default();
                    let before = rrs.len();
                    rrs.retain(|rr| rr.data() != change.data());
                    let removed = before != rrs.len();
                    if rrs.is_empty() {
                        rrsets.remove(&key);
                    }
                    if !removed && self.strict_delete {
                        return ResponseCode::NXRRSet;
                    }
                }
                DNSClass::ANY => {
                    rrsets.remove(&key);
                }
                _ => {
                    let rrs = rrsets.entry(key).or_default();
                    if !rrs.iter().any(|rr| rr.data() == change.data()) {
                        let mut rr = Record::from_rdata(
                            change.name().to_lowercase(),
                            change.ttl(),
                            change.data().clone(),
                        );
                        rr.set_dns_class(DNSClass::IN);
                        rrs.push(rr);
                    }
                }
            }
        }
        ResponseCode::NoError
    }

    pub fn rdata_at(&self, name: &str, rtype: RecordType) -> Vec<RData> {
        let name = Name::from_ascii(format!("{}.{}.", name, ZONE)).unwrap();
        self.rrsets
            .lock()
            .unwrap()
            .get(&(name, rtype))
            .map(|rrs| rrs.iter().map(|rr| rr.data().clone()).collect())
            .unwrap_or_default()
    }
}

/// Unsigned REFUSED built from the raw header, as servers answer unknown keys.
fn refused(request: &[u8]) -> Vec<u8> {
    let mut reply = Message::new();
    reply
        .set_id(u16::from_be_bytes([request[0], request[1]]))
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Update)
        .set_response_code(ResponseCode::Refused);
    reply.to_bytes().unwrap()
}

impl Transport for InMemoryZone {
    async fn exchange(
        &self,
        request: &[u8],
        _server: SocketAddr,
        _timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        Ok(self.handle(request))
    }
}

/// Counts calls and never answers; for proving that nothing was sent.
#[derive(Default)]
pub struct CountingTransport {
    calls: AtomicUsize,
}

impl CountingTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for CountingTransport {
    async fn exchange(
        &self,
        _request: &[u8],
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Timeout { server, timeout })
    }
}

/// Serves `zone` on loopback UDP and TCP (same port) and returns the address.
pub async fn serve(zone: std::sync::Arc<InMemoryZone>) -> SocketAddr {
    let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = udp.local_addr().unwrap();
    let tcp = TcpListener::bind(addr).await.unwrap();

    let udp_zone = zone.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok((len, peer)) = udp.recv_from(&mut buf).await {
            let reply = udp_zone.handle(&buf[..len]);
            let _ = udp.send_to(&reply, peer).await;
        }
    });

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = tcp.accept().await {
            let zone = zone.clone();
            tokio::spawn(async move {
                let mut len_buf = [0u8; 2];
                stream.read_exact(&mut len_buf).await.unwrap();
                let mut body = vec![0u8; u16::from_be_bytes(len_buf) as usize];
                stream.read_exact(&mut body).await.unwrap();
                let reply = zone.handle(&body);
                stream
                    .write_all(&(reply.len() as u16).to_be_bytes())
                    .await
                    .unwrap();
                stream.write_all(&reply).await.unwrap();
            });
        }
    });

    addr
}
