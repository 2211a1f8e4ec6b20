//! Binary layout of a lock file.
//!
//! A lock file is made up of two regions:
//!
//! | Region      | Offset | Size   | Contents                                     |
//! |-------------|--------|--------|----------------------------------------------|
//! | State       | 0      | 2      | protocol byte (`1`), clean flag              |
//! | Information | 2      | ≤ 2050 | protocol byte (`3`), port (`i32` BE), owner pid, operation |
//!
//! Strings are written as a big-endian `u16` byte length followed by UTF-8.
//! The information record is only as long as its content; the file is
//! truncated to the end of the record whenever it is rewritten.

use super::types::OwnerInfo;
use std::io::{Cursor, Read};
use thiserror::Error;

pub const STATE_REGION_PROTOCOL: u8 = 1;
pub const STATE_REGION_POS: u64 = 0;
pub const STATE_REGION_SIZE: u64 = 2;

pub const INFORMATION_REGION_PROTOCOL: u8 = 3;
pub const INFORMATION_REGION_POS: u64 = STATE_REGION_POS + STATE_REGION_SIZE;
/// Reserved capacity of the information region, in bytes.
pub const INFORMATION_REGION_SIZE: u64 = 2050;

/// Maximum number of characters kept from the owner pid and the operation.
pub const INFORMATION_REGION_DESCR_CHUNK_LIMIT: usize = 340;

// Three bytes per kept character keeps both strings inside the reserved
// capacity: 1 + 4 + 2 * (2 + 1020) = 2049.
const INFORMATION_REGION_DESCR_BYTE_LIMIT: usize = 3 * INFORMATION_REGION_DESCR_CHUNK_LIMIT;

const NO_PORT: i32 = -1;

/// Failure to decode a region or a length-prefixed string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("expected protocol version {expected}, found {found}")]
    UnexpectedProtocol { expected: u8, found: u8 },

    #[error("record is truncated")]
    Truncated,

    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("string of {0} bytes exceeds the 65535 byte limit")]
    TooLong(usize),
}

/// Decoded state region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateRegion {
    /// Whether the last writer reached the clean marker.
    pub clean: bool,
}

/// Encode the state region with the given clean flag.
pub fn encode_state(clean: bool) -> [u8; STATE_REGION_SIZE as usize] {
    [STATE_REGION_PROTOCOL, u8::from(clean)]
}

/// Decode the leading bytes of a lock file.
///
/// An empty slice means the lock file has never been written and yields
/// `None`. A slice holding only the protocol byte decodes as unclean, since
/// the writer never got as far as the flag.
pub fn decode_state(bytes: &[u8]) -> Result<Option<StateRegion>, CodecError> {
    let Some(&protocol) = bytes.first() else {
        return Ok(None);
    };
    if protocol != STATE_REGION_PROTOCOL {
        return Err(CodecError::UnexpectedProtocol {
            expected: STATE_REGION_PROTOCOL,
            found: protocol,
        });
    }
    let clean = bytes.get(1).is_some_and(|flag| *flag != 0);
    Ok(Some(StateRegion { clean }))
}

/// Encode an information record. Strings must already be trimmed.
pub fn encode_information(info: &OwnerInfo) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(INFORMATION_REGION_SIZE as usize);
    out.push(INFORMATION_REGION_PROTOCOL);
    let port = info.port.map_or(NO_PORT, i32::from);
    out.extend_from_slice(&port.to_be_bytes());
    write_utf(&mut out, &info.pid)?;
    write_utf(&mut out, &info.operation)?;
    Ok(out)
}

/// Decode an information record starting at the first byte of the region.
pub fn decode_information(bytes: &[u8]) -> Result<OwnerInfo, CodecError> {
    let mut cursor = Cursor::new(bytes);

    let protocol = read_array::<1>(&mut cursor)?[0];
    if protocol != INFORMATION_REGION_PROTOCOL {
        return Err(CodecError::UnexpectedProtocol {
            expected: INFORMATION_REGION_PROTOCOL,
            found: protocol,
        });
    }

    let port = i32::from_be_bytes(read_array::<4>(&mut cursor)?);
    let pid = read_utf(&mut cursor)?;
    let operation = read_utf(&mut cursor)?;

    Ok(OwnerInfo {
        // Nothing can listen on port 0, so it means "no port" like -1 does.
        port: u16::try_from(port).ok().filter(|port| *port != 0),
        pid,
        operation,
    })
}

/// Cut a description down to what fits in the information region.
///
/// Keeps at most [`INFORMATION_REGION_DESCR_CHUNK_LIMIT`] characters, and
/// never splits a character.
pub fn trim_if_necessary(input: &str) -> &str {
    let mut end = 0;
    for (count, (idx, ch)) in input.char_indices().enumerate() {
        let next = idx + ch.len_utf8();
        if count == INFORMATION_REGION_DESCR_CHUNK_LIMIT || next > INFORMATION_REGION_DESCR_BYTE_LIMIT
        {
            break;
        }
        end = next;
    }
    &input[..end]
}

/// Append a length-prefixed UTF-8 string.
pub fn write_utf(out: &mut Vec<u8>, value: &str) -> Result<(), CodecError> {
    let len = u16::try_from(value.len()).map_err(|_| CodecError::TooLong(value.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Read a length-prefixed UTF-8 string.
pub fn read_utf(cursor: &mut Cursor<&[u8]>) -> Result<String, CodecError> {
    let len = u16::from_be_bytes(read_array::<2>(cursor)?) as usize;
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf).map_err(|_| CodecError::Truncated)?;
    Ok(std::str::from_utf8(&buf)?.to_string())
}

fn read_array<const N: usize>(cursor: &mut Cursor<&[u8]>) -> Result<[u8; N], CodecError> {
    let mut buf = [0u8; N];
    cursor.read_exact(&mut buf).map_err(|_| CodecError::Truncated)?;
    Ok(buf)
}
