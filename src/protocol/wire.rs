//! Binary peer-to-peer codec. Field order and widths are a wire contract:
//! big-endian throughout, fixed 79-byte header, body of five u32
//! length-prefixed strings followed by a u64 length-prefixed payload.

use std::fmt::{Debug, Formatter};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};

use crate::error::DispatchError;
use crate::protocol::address::Address;
use crate::protocol::parcel::{service_of, MessageId, MessageType, Parcel, ParcelHeader, MESSAGE_ID_LEN};
use crate::util::buf::{put_string, try_get_array, try_get_string, try_get_u16, try_get_u32, try_get_u64, try_get_vec};

/// Identifies the protocol family at the start of every header.
pub const MAGIC: [u8; 9] = [0x89, 0x50, 0x44, 0x48, 0x5a, 0x0d, 0x0a, 0x1a, 0x0a];

pub const PROTOCOL_VERSION: u32 = 1;

pub const CHECKSUM_LEN: usize = 32;

/// Magic + version + checksum + timestamp + type + message id + body size.
pub const HEADER_LEN: usize = MAGIC.len()
    + size_of::<u32>()
    + CHECKSUM_LEN
    + size_of::<u64>()
    + size_of::<u16>()
    + MESSAGE_ID_LEN
    + size_of::<u64>();

/// Double SHA-256 digest covering the serialized parcel body.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Checksum(pub [u8; CHECKSUM_LEN]);

impl Checksum {
    pub fn zero() -> Checksum {
        Checksum([0u8; CHECKSUM_LEN])
    }

    pub fn of(data: &[u8]) -> Checksum {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        Checksum(second.into())
    }
}

impl Debug for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

pub fn serialize_header(header: &ParcelHeader, body_size: u64, buf: &mut BytesMut) {
    buf.put_slice(&MAGIC);
    buf.put_u32(PROTOCOL_VERSION);
    buf.put_slice(&header.checksum.0);
    buf.put_u64(header.timestamp);
    buf.put_u16(header.message_type.into());
    buf.put_slice(&header.message_id.0);
    buf.put_u64(body_size);
}

/// Returns the header and the declared body size. A wrong magic number or an
/// unsupported version is rejected here; the connection it arrived on gets
/// closed without affecting the daemon.
pub fn deserialize_header(buf: &mut impl Buf) -> Result<(ParcelHeader, u64), DispatchError> {
    let magic = try_get_array::<{ MAGIC.len() }>(buf)?;
    if magic != MAGIC {
        return Err(DispatchError::BadMagic);
    }
    let version = try_get_u32(buf)?;
    if version != PROTOCOL_VERSION {
        return Err(DispatchError::UnsupportedVersion(version));
    }

    let checksum = Checksum(try_get_array::<CHECKSUM_LEN>(buf)?);
    let timestamp = try_get_u64(buf)?;
    let raw_type = try_get_u16(buf)?;
    let message_type =
        MessageType::try_from(raw_type).map_err(|_| DispatchError::UnknownMessageType(raw_type))?;
    let message_id = MessageId(try_get_array::<MESSAGE_ID_LEN>(buf)?);
    let body_size = try_get_u64(buf)?;

    Ok((
        ParcelHeader {
            checksum,
            timestamp,
            message_type,
            message_id,
        },
        body_size,
    ))
}

/// Absent address components are written as zero-length strings; the format
/// has no separate encoding for "no value".
pub fn serialize_body(parcel: &Parcel, buf: &mut BytesMut) {
    put_string(buf, &parcel.raw_filename);
    put_string(buf, parcel.recipient.host.as_deref().unwrap_or(""));
    put_string(buf, parcel.recipient.user.as_deref().unwrap_or(""));
    put_string(buf, parcel.sender.host.as_deref().unwrap_or(""));
    put_string(buf, parcel.sender.user.as_deref().unwrap_or(""));
    buf.put_u64(parcel.payload.len() as u64);
    buf.put_slice(&parcel.payload);
}

/// Inverse of [`serialize_body`]. Every embedded length is checked against
/// the remaining buffer before it is read.
pub fn deserialize_body(header: ParcelHeader, buf: &mut impl Buf) -> Result<Parcel, DispatchError> {
    let raw_filename = try_get_string(buf)?;
    let recipient_host = try_get_string(buf)?;
    let recipient_user = try_get_string(buf)?;
    let sender_host = try_get_string(buf)?;
    let sender_user = try_get_string(buf)?;
    let payload_len = try_get_u64(buf)?;
    let payload = Bytes::from(try_get_vec(buf, payload_len)?);

    // The length prefixes are authoritative; leftover bytes mean the body
    // does not match its own declared structure.
    if buf.has_remaining() {
        return Err(DispatchError::TrailingBytes(buf.remaining() as u64));
    }

    let service = service_of(&raw_filename);
    Ok(Parcel {
        header,
        raw_filename,
        sender: Address {
            user: none_if_empty(sender_user),
            host: none_if_empty(sender_host),
        },
        recipient: Address {
            user: none_if_empty(recipient_user),
            host: none_if_empty(recipient_host),
        },
        service,
        payload,
    })
}

/// Serializes a parcel for transmission: body first, then the header with
/// the freshly computed body checksum and body size patched in. Returns
/// `(header bytes, body bytes)` ready for two ordered writes.
pub fn encode(parcel: &Parcel) -> (BytesMut, BytesMut) {
    let mut body = BytesMut::new();
    serialize_body(parcel, &mut body);

    let mut header = parcel.header.clone();
    header.checksum = Checksum::of(&body);

    let mut head = BytesMut::with_capacity(HEADER_LEN);
    serialize_header(&header, body.len() as u64, &mut head);
    (head, body)
}

/// Decodes a received header + body pair into a parcel, enforcing the
/// declared body size and verifying the checksum before any field of the
/// body is interpreted.
pub fn decode(head_data: &[u8], body_data: &[u8]) -> Result<Parcel, DispatchError> {
    let (header, body_size) = deserialize_header(&mut &*head_data)?;
    if body_data.len() as u64 != body_size {
        return Err(DispatchError::TruncatedParcel {
            expected: body_size,
            available: body_data.len() as u64,
        });
    }
    if Checksum::of(body_data) != header.checksum {
        return Err(DispatchError::ChecksumMismatch);
    }
    deserialize_body(header, &mut &*body_data)
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
