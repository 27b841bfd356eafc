use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace, warn};

use crate::config::{FailurePolicy, ProbeConfig};
use crate::dns_header::DnsHeader;
use crate::dns_query::{build_query, Question, MAX_MESSAGE_LEN};
use crate::error::ProbeError;

/// Progress of a single probe. Every invocation starts at `Idle` and ends at `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Sent,
    AwaitingReply,
    Done,
}

/// A reply that carried at least one answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTrip {
    pub elapsed: Duration,
    pub answer_count: u16,
    pub reply_len: usize,
}

impl RoundTrip {
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

pub type ProbeResult = Result<RoundTrip, ProbeError>;

/// UDP socket owned by one probe invocation. Dropping it closes the descriptor,
/// so every return path out of `DnsProbe::run` releases it.
struct ProbeSocket {
    inner: UdpSocket,
}

impl ProbeSocket {
    fn open() -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        trace!("opened probe socket");
        #[cfg(test)]
        leak_check::opened();
        Ok(ProbeSocket {
            inner: socket.into(),
        })
    }

    #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
    fn bind_device(&self, interface: &str) -> io::Result<()> {
        socket2::SockRef::from(&self.inner).bind_device(Some(interface.as_bytes()))
    }

    #[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
    fn bind_device(&self, _interface: &str) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "binding to a device is not supported on this platform",
        ))
    }
}

impl Drop for ProbeSocket {
    fn drop(&mut self) {
        trace!("closing probe socket");
        #[cfg(test)]
        leak_check::closed();
    }
}

/// Measures how long the configured resolver takes to answer an A query.
pub struct DnsProbe {
    config: ProbeConfig,
}

impl DnsProbe {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Run one probe: open a socket, send a single query, wait for a single
    /// reply and judge it by its answer count.
    pub fn run(&self) -> ProbeResult {
        let mut state = ProbeState::Idle;
        let result = self.round_trip(&mut state);
        if let Err(e) = &result {
            debug!(state = ?state, reason = e.reason(), "probe ended without a sample");
        }
        advance(&mut state, ProbeState::Done);
        result
    }

    fn round_trip(&self, state: &mut ProbeState) -> ProbeResult {
        let config = &self.config;
        let server = config.resolver_addr();

        let socket = ProbeSocket::open().map_err(ProbeError::Socket)?;

        if let Err(source) = socket.bind_device(&config.interface) {
            let error = ProbeError::InterfaceBind {
                interface: config.interface.clone(),
                source,
            };
            match config.on_bind_error {
                FailurePolicy::Abort => return Err(error),
                FailurePolicy::Continue => {
                    warn!(error = %error, "sending without interface binding")
                }
            }
        }

        socket
            .inner
            .set_read_timeout(Some(config.timeout))
            .map_err(ProbeError::Socket)?;

        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let id = config.query_id.next_id();
        let query_len = build_query(&mut buf, id, &config.hostname, Question::a_record())?;

        // Sent marks the transmit attempt; under the continue policy a failed
        // send still passes through it on the way to AwaitingReply.
        let start = Instant::now();
        advance(state, ProbeState::Sent);
        match socket.inner.send_to(&buf[..query_len], server) {
            Ok(sent) => trace!(bytes = sent, %server, id, "query sent"),
            Err(source) => {
                let error = ProbeError::Transmit { server, source };
                match config.on_send_error {
                    FailurePolicy::Abort => return Err(error),
                    FailurePolicy::Continue => warn!(error = %error, "waiting for a reply anyway"),
                }
            }
        }

        advance(state, ProbeState::AwaitingReply);
        let (received, peer) = socket.inner.recv_from(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ProbeError::Timeout {
                server,
                timeout: config.timeout,
            },
            _ => ProbeError::Receive(e),
        })?;
        let elapsed = start.elapsed();

        if peer != server {
            warn!(%peer, %server, "reply came from an unexpected address");
        }

        let header = DnsHeader::from_bytes(&buf[..received])?;
        let flags = header.flags();
        if header.id != id {
            warn!(expected = id, got = header.id, "reply id does not match the query");
        }
        if flags.rcode != 0 {
            debug!(rcode = flags.rcode, "resolver returned an error code");
        }

        if header.answer_count == 0 {
            return Err(ProbeError::EmptyAnswer { rcode: flags.rcode });
        }

        Ok(RoundTrip {
            elapsed,
            answer_count: header.answer_count,
            reply_len: received,
        })
    }
}

fn advance(state: &mut ProbeState, next: ProbeState) {
    trace!(from = ?*state, to = ?next, "probe state");
    #[cfg(test)]
    leak_check::entered(next);
    *state = next;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_query::QueryIdSource;
    use crate::error::EncodeError;
    use crate::test_support::{probe_config, reply_with_answers, Responder};

    #[test]
    fn test_answered_query_yields_sample() {
        leak_check::take();
        let responder = Responder::spawn(|query| Some(reply_with_answers(query, 2)));
        let probe = DnsProbe::new(probe_config(responder.port()));

        leak_check::take_states();
        let round_trip = probe.run().unwrap();
        assert_eq!(
            leak_check::take_states(),
            [ProbeState::Sent, ProbeState::AwaitingReply, ProbeState::Done]
        );
        assert_eq!(round_trip.answer_count, 2);
        assert!(round_trip.seconds() >= 0.0);
        assert!(round_trip.elapsed < Duration::from_secs(2));
        assert_eq!(leak_check::take(), (1, 1));

        let mut expected = [0u8; 512];
        let len = build_query(
            &mut expected,
            QueryIdSource::Process.next_id(),
            "www.example.com",
            Question::a_record(),
        )
        .unwrap();
        assert_eq!(responder.query(), &expected[..len]);
    }

    #[test]
    fn test_zero_answers_is_empty_answer() {
        leak_check::take();
        let responder = Responder::spawn(|query| Some(reply_with_answers(query, 0)));
        let probe = DnsProbe::new(probe_config(responder.port()));

        assert!(matches!(probe.run(), Err(ProbeError::EmptyAnswer { rcode: 0 })));
        assert_eq!(leak_check::take(), (1, 1));
        responder.query();
    }

    #[test]
    fn test_nxdomain_reply_is_empty_answer() {
        let responder = Responder::spawn(|query| {
            let mut reply = reply_with_answers(query, 0);
            reply[3] |= 0x03;
            Some(reply)
        });
        let probe = DnsProbe::new(probe_config(responder.port()));

        assert!(matches!(probe.run(), Err(ProbeError::EmptyAnswer { rcode: 3 })));
        responder.query();
    }

    #[test]
    fn test_silent_resolver_times_out() {
        leak_check::take();
        let responder = Responder::spawn(|_| None);
        let mut config = probe_config(responder.port());
        config.timeout = Duration::from_millis(200);
        let probe = DnsProbe::new(config);

        let started = Instant::now();
        let err = probe.run().unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }), "{err:?}");
        assert_eq!(err.reason(), "timeout");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(leak_check::take(), (1, 1));
        responder.query();
    }

    #[test]
    fn test_short_reply_is_malformed() {
        leak_check::take();
        let responder = Responder::spawn(|_| Some(vec![0x12, 0x34, 0x81]));
        let probe = DnsProbe::new(probe_config(responder.port()));

        assert!(matches!(probe.run(), Err(ProbeError::MalformedReply(_))));
        assert_eq!(leak_check::take(), (1, 1));
        responder.query();
    }

    #[test]
    fn test_reply_with_other_id_still_counts_answers() {
        let responder = Responder::spawn(|query| {
            let mut reply = reply_with_answers(query, 1);
            reply[0] ^= 0xFF;
            Some(reply)
        });
        let probe = DnsProbe::new(probe_config(responder.port()));

        assert_eq!(probe.run().unwrap().answer_count, 1);
        responder.query();
    }

    #[test]
    fn test_overlong_hostname_rejected_and_socket_released() {
        leak_check::take();
        let mut config = probe_config(9);
        config.hostname = format!("{}.example.com", "x".repeat(64));
        let probe = DnsProbe::new(config);

        assert!(matches!(
            probe.run(),
            Err(ProbeError::Encoding(EncodeError::LabelTooLong { len: 64, .. }))
        ));
        assert_eq!(leak_check::take(), (1, 1));
    }

    #[test]
    fn test_bind_failure_continues_by_default() {
        leak_check::take();
        let responder = Responder::spawn(|query| Some(reply_with_answers(query, 1)));
        let mut config = probe_config(responder.port());
        config.interface = "nosuchdev0".to_string();
        let probe = DnsProbe::new(config);

        assert!(probe.run().is_ok());
        assert_eq!(leak_check::take(), (1, 1));
        responder.query();
    }

    #[test]
    fn test_bind_failure_aborts_when_configured() {
        leak_check::take();
        let mut config = probe_config(9);
        config.interface = "nosuchdev0".to_string();
        config.on_bind_error = FailurePolicy::Abort;
        let probe = DnsProbe::new(config);

        let err = probe.run().unwrap_err();
        assert!(
            matches!(err, ProbeError::InterfaceBind { ref interface, .. } if interface == "nosuchdev0"),
            "{err:?}"
        );
        assert_eq!(leak_check::take(), (1, 1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_send_failure_aborts_by_default() {
        leak_check::take();
        // Broadcast without SO_BROADCAST is refused by the kernel.
        let mut config = probe_config(53);
        config.server = std::net::Ipv4Addr::BROADCAST;
        let probe = DnsProbe::new(config);

        leak_check::take_states();
        let err = probe.run().unwrap_err();
        assert!(matches!(err, ProbeError::Transmit { .. }), "{err:?}");
        assert_eq!(
            leak_check::take_states(),
            [ProbeState::Sent, ProbeState::Done]
        );
        assert_eq!(leak_check::take(), (1, 1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_send_failure_can_continue_to_receive() {
        leak_check::take();
        let mut config = probe_config(53);
        config.server = std::net::Ipv4Addr::BROADCAST;
        config.on_send_error = FailurePolicy::Continue;
        config.timeout = Duration::from_millis(100);
        let probe = DnsProbe::new(config);

        leak_check::take_states();
        let err = probe.run().unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }), "{err:?}");
        assert_eq!(
            leak_check::take_states(),
            [ProbeState::Sent, ProbeState::AwaitingReply, ProbeState::Done]
        );
        assert_eq!(leak_check::take(), (1, 1));
    }
}
