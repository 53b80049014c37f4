//! Length-checked reads over a byte buffer. The wire format uses fixed-width
//! big-endian length prefixes, and every embedded length is untrusted: a
//! prefix that would read past the end of the buffer is a decode error,
//! never an out-of-bounds access.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::DispatchError;

fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), DispatchError> {
    if buf.remaining() < needed {
        return Err(DispatchError::TruncatedParcel {
            expected: needed as u64,
            available: buf.remaining() as u64,
        });
    }
    Ok(())
}

pub fn try_get_u16(buf: &mut impl Buf) -> Result<u16, DispatchError> {
    ensure_remaining(buf, size_of::<u16>())?;
    Ok(buf.get_u16())
}

pub fn try_get_u32(buf: &mut impl Buf) -> Result<u32, DispatchError> {
    ensure_remaining(buf, size_of::<u32>())?;
    Ok(buf.get_u32())
}

pub fn try_get_u64(buf: &mut impl Buf) -> Result<u64, DispatchError> {
    ensure_remaining(buf, size_of::<u64>())?;
    Ok(buf.get_u64())
}

pub fn try_get_array<const N: usize>(buf: &mut impl Buf) -> Result<[u8; N], DispatchError> {
    ensure_remaining(buf, N)?;
    let mut result = [0u8; N];
    buf.copy_to_slice(&mut result);
    Ok(result)
}

pub fn try_get_vec(buf: &mut impl Buf, len: u64) -> Result<Vec<u8>, DispatchError> {
    let len = usize::try_from(len).map_err(|_| DispatchError::TruncatedParcel {
        expected: len,
        available: buf.remaining() as u64,
    })?;
    ensure_remaining(buf, len)?;
    let mut result = vec![0u8; len];
    buf.copy_to_slice(&mut result);
    Ok(result)
}

/// Strings are written without a trailing terminator; the u32 prefix is
/// authoritative.
pub fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

pub fn try_get_string(buf: &mut impl Buf) -> Result<String, DispatchError> {
    let len = try_get_u32(buf)?;
    let raw = try_get_vec(buf, len as u64)?;
    String::from_utf8(raw)
        .map_err(|e| DispatchError::MalformedRequest(format!("non-utf8 string field: {}", e)))
}
