//! Hostname to DNS label-sequence encoding.
//!
//! `www.example.com` becomes `[3]www[7]example[3]com[0]`. Label contents are
//! copied byte for byte; empty labels produced by consecutive dots are
//! written as zero-length labels and are not rejected.

use crate::error::EncodeError;

pub const MAX_LABEL_LEN: usize = 63;
pub const MAX_NAME_LEN: usize = 255;

/// Drops a single trailing root dot so `example.com.` and `example.com`
/// encode the same.
fn strip_root(hostname: &str) -> &str {
    hostname.strip_suffix('.').unwrap_or(hostname)
}

/// Number of bytes `encode_name` writes for `hostname`, terminator included.
/// Fails if a label or the whole name exceeds the protocol limits.
pub fn encoded_len(hostname: &str) -> Result<usize, EncodeError> {
    let host = strip_root(hostname);
    if host.is_empty() {
        return Ok(1);
    }

    if let Some(label) = host.split('.').find(|l| l.len() > MAX_LABEL_LEN) {
        return Err(EncodeError::LabelTooLong {
            label: label.to_string(),
            len: label.len(),
        });
    }

    // One length byte per label replaces each dot, plus the leading length
    // byte and the terminator.
    let len = host.len() + 2;
    if len > MAX_NAME_LEN {
        return Err(EncodeError::NameTooLong { len });
    }

    Ok(len)
}

/// Encode `hostname` at the start of `out` and return the number of bytes written.
///
/// The whole name is validated before the first byte is written, so on error
/// `out` is left untouched.
pub fn encode_name(hostname: &str, out: &mut [u8]) -> Result<usize, EncodeError> {
    let needed = encoded_len(hostname)?;
    if needed > out.len() {
        return Err(EncodeError::BufferOverflow {
            needed,
            capacity: out.len(),
        });
    }

    let host = strip_root(hostname).as_bytes();
    let mut pos = 0;

    if !host.is_empty() {
        // Scanning a virtual trailing '.' flushes the last label with the
        // same code path as the others.
        let mut lock = 0;
        for (i, &byte) in host.iter().chain(std::iter::once(&b'.')).enumerate() {
            if byte != b'.' {
                continue;
            }
            let label = &host[lock..i];
            out[pos] = label.len() as u8;
            out[pos + 1..pos + 1 + label.len()].copy_from_slice(label);
            pos += 1 + label.len();
            lock = i + 1;
        }
    }

    out[pos] = 0;
    pos += 1;

    debug_assert_eq!(pos, needed);
    Ok(pos)
}
