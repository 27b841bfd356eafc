use bytes::{Buf, BufMut};

use crate::error::ShortHeader;

/// Size of the fixed DNS header on the wire.
pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsHeader {
    pub id: u16,
    pub flags: u16,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsFlags {
    pub qr: bool,     // Query/Response (false = query, true = response)
    pub opcode: u8,   // Operation code (0 = standard query)
    pub aa: bool,     // Authoritative Answer
    pub tc: bool,     // Truncation
    pub rd: bool,     // Recursion Desired
    pub ra: bool,     // Recursion Available
    pub z: bool,      // Reserved (must be 0)
    pub ad: bool,     // Authenticated Data
    pub cd: bool,     // Checking Disabled
    pub rcode: u8,    // Response code (0 = no error, 1 = format error, etc.)
}

impl DnsFlags {
    /// Flags of a standard query asking the resolver to recurse.
    pub fn recursive_query() -> Self {
        DnsFlags {
            rd: true,
            ..DnsFlags::default()
        }
    }

    pub fn to_u16(&self) -> u16 {
        let mut flags: u16 = 0;

        if self.qr { flags |= 1 << 15; }           // QR at bit 15
        flags |= (self.opcode as u16 & 0xF) << 11; // OPCODE at bits 11-14
        if self.aa { flags |= 1 << 10; }           // AA at bit 10
        if self.tc { flags |= 1 << 9; }            // TC at bit 9
        if self.rd { flags |= 1 << 8; }            // RD at bit 8
        if self.ra { flags |= 1 << 7; }            // RA at bit 7
        if self.z { flags |= 1 << 6; }             // Z at bit 6
        if self.ad { flags |= 1 << 5; }            // AD at bit 5
        if self.cd { flags |= 1 << 4; }            // CD at bit 4
        flags |= self.rcode as u16 & 0xF;          // RCODE at bits 0-3

        flags
    }

    pub fn from_u16(flags: u16) -> Self {
        DnsFlags {
            qr: (flags & (1 << 15)) != 0,
            opcode: ((flags >> 11) & 0xF) as u8,
            aa: (flags & (1 << 10)) != 0,
            tc: (flags & (1 << 9)) != 0,
            rd: (flags & (1 << 8)) != 0,
            ra: (flags & (1 << 7)) != 0,
            z: (flags & (1 << 6)) != 0,
            ad: (flags & (1 << 5)) != 0,
            cd: (flags & (1 << 4)) != 0,
            rcode: (flags & 0xF) as u8,
        }
    }
}

impl DnsHeader {
    /// Header of an outgoing query: one question, every other section empty.
    pub fn query(id: u16) -> Self {
        DnsHeader {
            id,
            flags: DnsFlags::recursive_query().to_u16(),
            question_count: 1,
            answer_count: 0,
            authority_count: 0,
            additional_count: 0,
        }
    }

    /// Reads the header from the first twelve bytes of `bytes`.
    /// Anything past the header is ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ShortHeader> {
        if bytes.len() < HEADER_LEN {
            return Err(ShortHeader(bytes.len()));
        }

        let mut buf = &bytes[..HEADER_LEN];
        Ok(DnsHeader {
            id: buf.get_u16(),
            flags: buf.get_u16(),
            question_count: buf.get_u16(),
            answer_count: buf.get_u16(),
            authority_count: buf.get_u16(),
            additional_count: buf.get_u16(),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];

        let mut out = &mut bytes[..];
        out.put_u16(self.id);
        out.put_u16(self.flags);
        out.put_u16(self.question_count);
        out.put_u16(self.answer_count);
        out.put_u16(self.authority_count);
        out.put_u16(self.additional_count);

        bytes
    }

    pub fn flags(&self) -> DnsFlags {
        DnsFlags::from_u16(self.flags)
    }
}
