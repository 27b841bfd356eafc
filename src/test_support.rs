//! Loopback resolver stand-ins shared by the probe and scheduler tests.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{FailurePolicy, ProbeConfig};
use crate::dns_header::{DnsFlags, DnsHeader, HEADER_LEN};
use crate::dns_query::QueryIdSource;

/// A one-shot UDP "resolver" on 127.0.0.1 that answers the first datagram
/// it receives with whatever the closure builds, or stays silent on `None`.
pub struct Responder {
    addr: SocketAddr,
    handle: JoinHandle<Vec<u8>>,
}

impl Responder {
    pub fn spawn<F>(reply: F) -> Self
    where
        F: FnOnce(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let addr = socket.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let Ok((len, peer)) = socket.recv_from(&mut buf) else {
                return Vec::new();
            };
            let query = buf[..len].to_vec();
            if let Some(bytes) = reply(&query) {
                socket.send_to(&bytes, peer).unwrap();
            }
            query
        });

        Responder { addr, handle }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The datagram the responder received.
    pub fn query(self) -> Vec<u8> {
        self.handle.join().unwrap()
    }
}

/// Turn a query into a reply with `answers` A records for 192.0.2.1.
pub fn reply_with_answers(query: &[u8], answers: u16) -> Vec<u8> {
    let mut header = DnsHeader::from_bytes(query).unwrap();
    header.flags = DnsFlags {
        qr: true,
        ra: true,
        ..header.flags()
    }
    .to_u16();
    header.answer_count = answers;

    let mut reply = query.to_vec();
    reply[..HEADER_LEN].copy_from_slice(&header.to_bytes());
    for _ in 0..answers {
        // name pointer to offset 12, A, IN, TTL 60, RDLENGTH 4, address
        reply.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4, 192, 0, 2, 1]);
    }
    reply
}

pub fn probe_config(port: u16) -> ProbeConfig {
    ProbeConfig {
        interface: "lo".to_string(),
        server: Ipv4Addr::LOCALHOST,
        port,
        hostname: "www.example.com".to_string(),
        timeout: Duration::from_secs(2),
        query_id: QueryIdSource::Process,
        on_bind_error: FailurePolicy::Continue,
        on_send_error: FailurePolicy::Abort,
    }
}
