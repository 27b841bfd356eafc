use bytes::BufMut;
use serde::Deserialize;

use crate::dns_header::{DnsHeader, HEADER_LEN};
use crate::dns_name::{encode_name, encoded_len};
use crate::error::EncodeError;

/// Fixed-size tail of the question section: QTYPE (2 bytes) + QCLASS (2 bytes)
pub const QUESTION_LEN: usize = 4;

/// Size of the scratch buffer a query is built into and a reply is read into.
pub const MAX_MESSAGE_LEN: usize = 65536;

/// DNS record types known to the prober. Only `A` is ever queried.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A = 1,     // IPv4 address
    NS = 2,    // Name server
    CNAME = 5, // Canonical name
    SOA = 6,   // Start of authority
    PTR = 12,  // Pointer record
    MX = 15,   // Mail exchange
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordClass {
    IN = 1, // Internet
}

impl RecordClass {
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Constant-sized fields of the question that follow the encoded name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Question {
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl Question {
    pub fn a_record() -> Self {
        Question {
            qtype: RecordType::A,
            qclass: RecordClass::IN,
        }
    }

    pub fn to_bytes(&self) -> [u8; QUESTION_LEN] {
        let mut bytes = [0u8; QUESTION_LEN];
        let mut out = &mut bytes[..];
        out.put_u16(self.qtype.to_u16());
        out.put_u16(self.qclass.to_u16());
        bytes
    }
}

/// Where the 16-bit transaction id of each query comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIdSource {
    /// Low 16 bits of the process id. Identical for every probe of a run.
    #[default]
    Process,
    /// A fresh random id per query.
    Random,
}

impl QueryIdSource {
    pub fn next_id(self) -> u16 {
        match self {
            QueryIdSource::Process => std::process::id() as u16,
            QueryIdSource::Random => fastrand::u16(..),
        }
    }
}

/// Write a complete query for `hostname` into `buf` and return its length.
///
/// Layout: 12-byte header, encoded name, QTYPE, QCLASS. The total size is
/// checked against `buf` before anything is written.
pub fn build_query(
    buf: &mut [u8],
    id: u16,
    hostname: &str,
    question: Question,
) -> Result<usize, EncodeError> {
    let name_len = encoded_len(hostname)?;
    let total = HEADER_LEN + name_len + QUESTION_LEN;
    if total > buf.len() {
        return Err(EncodeError::BufferOverflow {
            needed: total,
            capacity: buf.len(),
        });
    }

    buf[..HEADER_LEN].copy_from_slice(&DnsHeader::query(id).to_bytes());
    let written = encode_name(hostname, &mut buf[HEADER_LEN..])?;
    let question_at = HEADER_LEN + written;
    buf[question_at..question_at + QUESTION_LEN].copy_from_slice(&question.to_bytes());

    Ok(total)
}
