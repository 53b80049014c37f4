use std::fmt::{Debug, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::protocol::address::Address;
use crate::protocol::wire::Checksum;

pub const MESSAGE_ID_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum MessageType {
    Undefined = 0,
    Parcel = 1,
}

/// Globally unique message identifier, 16 random bytes.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct MessageId(pub [u8; MESSAGE_ID_LEN]);

impl MessageId {
    pub fn new_random() -> MessageId {
        MessageId(rand::random())
    }
}

impl Debug for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// The fixed-layout part of a parcel that precedes the body on the wire.
/// Magic number, protocol version and body size are wire-level framing and
/// live only in the codec, not here.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParcelHeader {
    /// Double SHA-256 digest of the serialized body. Zero until the parcel
    /// is encoded for transmission.
    pub checksum: Checksum,
    /// Seconds since epoch.
    pub timestamp: u64,
    pub message_type: MessageType,
    pub message_id: MessageId,
}

impl ParcelHeader {
    pub fn new(message_type: MessageType) -> ParcelHeader {
        ParcelHeader {
            checksum: Checksum::zero(),
            timestamp: timestamp_now(),
            message_type,
            message_id: MessageId::new_random(),
        }
    }
}

/// One addressed file transfer unit. Owns its payload; created fresh per
/// request or per received message and dropped after forwarding or delivery.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Parcel {
    pub header: ParcelHeader,
    pub raw_filename: String,
    pub sender: Address,
    pub recipient: Address,
    /// Derived from the filename extension; never sent on the wire.
    pub service: Option<String>,
    pub payload: Bytes,
}

impl Parcel {
    pub fn new(raw_filename: String, sender: Address, recipient: Address, payload: Bytes) -> Parcel {
        let service = service_of(&raw_filename);
        Parcel {
            header: ParcelHeader::new(MessageType::Parcel),
            raw_filename,
            sender,
            recipient,
            service,
            payload,
        }
    }
}

/// The service a parcel is destined for is denoted by the file extension:
/// the text after the final dot, requiring at least one character after the
/// dot. Smallest valid filename is `a.x`.
pub fn service_of(filename: &str) -> Option<String> {
    let bytes = filename.as_bytes();
    if bytes.len() < 3 {
        return None;
    }
    // Start at len-2 so there is at least one character after the dot; a
    // leading dot does not denote an extension.
    for i in (1..=bytes.len() - 2).rev() {
        if bytes[i] == b'.' {
            return Some(filename[i + 1..].to_string());
        }
    }
    None
}

fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::simple("a.txt", Some("txt"))]
    #[case::final_dot_wins("archive.tar.gz", Some("gz"))]
    #[case::no_extension("noext", None)]
    #[case::nothing_after_dot("ab.", None)]
    #[case::too_short("a.", None)]
    #[case::leading_dot(".gitignore", None)]
    #[case::lone_leading_dot(".rc", None)]
    fn test_service_of(#[case] filename: &str, #[case] expected: Option<&str>) {
        assert_eq!(service_of(filename).as_deref(), expected);
    }

    #[test]
    fn test_new_parcel_defaults() {
        let parcel = Parcel::new(
            "notes.txt".to_string(),
            Address::parse("foo@bar.com"),
            Address::parse("baz@qux.org"),
            Bytes::from_static(b"hello"),
        );
        assert_eq!(parcel.header.message_type, MessageType::Parcel);
        assert_eq!(parcel.header.checksum, Checksum::zero());
        assert!(parcel.header.timestamp > 0);
        assert_eq!(parcel.service.as_deref(), Some("txt"));
    }

    #[test]
    fn test_message_ids_are_unique() {
        assert_ne!(MessageId::new_random(), MessageId::new_random());
    }
}
